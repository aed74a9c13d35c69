//! `/api/orders` routes.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::api::{AdminPrincipal, AppState, Principal, ValidatedJson};
use crate::domain::aggregates::{OrderStatus, PaymentMethod, ShippingAddress, TrackingInfo};
use crate::domain::value_objects::{Money, OrderCode, Pincode};
use crate::payment::{PaymentProof, SIGNATURE_HEADER};
use crate::services::orders::{AdminOrderPage, CheckoutPayment, OrderPage, StatusUpdate, ADMIN_PAGE_SIZE, CUSTOMER_PAGE_SIZE};
use crate::store::{OrderFilter, Page};
use crate::{EcommerceError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/check-cod/:pincode", get(check_cod))
        .route("/create-razorpay-order", post(create_payment_intent))
        .route("/verify-payment", post(verify_payment))
        .route("/create", post(create_cod_order))
        .route("/cancel/:order_id", patch(cancel_order))
        .route("/my-orders", get(my_orders))
        .route("/details/:order_id", get(order_details))
        .route("/admin/all", get(admin_orders))
        .route("/admin/update-status/:order_id", patch(update_status))
        .route("/razorpay-webhook", post(webhook))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentIntentRequest {
    pub amount: Money,
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    #[validate]
    pub shipping_address: ShippingAddress,
    pub payment_method: Option<PaymentMethod>,
}

/// Missing gateway fields fail signature verification rather than parsing.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub razorpay_order_id: String,
    #[serde(default)]
    pub razorpay_payment_id: String,
    #[serde(default)]
    pub razorpay_signature: String,
    #[validate]
    pub order_data: OrderData,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate]
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AdminOrdersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// An order status, or `ALL`.
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    pub tracking_info: Option<TrackingInfo>,
}

fn order_code(raw: &str) -> Result<OrderCode> { Ok(OrderCode::new(raw)?) }

async fn check_cod(State(state): State<AppState>, Path(pincode): Path<String>) -> Result<Json<Value>> {
    let zone = match Pincode::new(pincode.trim()) {
        Ok(pincode) => state.zones.check(&pincode).await?,
        Err(_) => None,
    };
    let body = match zone {
        Some(z) => json!({
            "available": z.cod_available,
            "deliveryCharge": z.delivery_charge,
            "estimatedDeliveryDays": z.estimated_delivery_days,
            "area": z.area,
            "city": z.city,
            "state": z.state,
        }),
        None => json!({ "available": false, "message": "Delivery not available to this pincode" }),
    };
    Ok(Json(body))
}

async fn create_payment_intent(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<PaymentIntentRequest>,
) -> Result<Json<Value>> {
    let intent = state.orders.create_payment_intent(principal.id, req.amount, req.currency).await?;
    Ok(Json(json!({ "success": true, "order": intent, "key_id": state.orders.gateway_key_id() })))
}

async fn verify_payment(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<VerifyPaymentRequest>,
) -> Result<Json<Value>> {
    let proof = PaymentProof {
        gateway_order_id: req.razorpay_order_id,
        gateway_payment_id: req.razorpay_payment_id,
        signature: req.razorpay_signature,
    };
    let placed = state.orders.create_order(principal.id, req.order_data.shipping_address, CheckoutPayment::Gateway(proof)).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Payment verified and order created",
        "orderId": placed.order_id,
        "order": placed.order,
        "stockUpdates": placed.stock_updates,
    })))
}

async fn create_cod_order(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedJson(req): ValidatedJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    if req.payment_method != PaymentMethod::Cod {
        return Err(EcommerceError::Validation(
            "This route only supports COD orders. Use Razorpay flow for online payments.".into(),
        ));
    }
    let placed = state.orders.create_order(principal.id, req.shipping_address, CheckoutPayment::CashOnDelivery).await?;
    Ok((StatusCode::CREATED, Json(json!({
        "message": "Order created successfully",
        "orderId": placed.order_id,
        "order": placed.order,
        "stockUpdates": placed.stock_updates,
    }))))
}

async fn cancel_order(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Value>> {
    let reason = body.and_then(|Json(b)| b.reason);
    let cancelled = state.orders.cancel(principal.id, &order_code(&order_id)?, reason).await?;
    Ok(Json(json!({
        "message": "Order cancelled successfully",
        "order": cancelled.order,
        "stockRestorations": cancelled.stock_restorations,
    })))
}

async fn my_orders(State(state): State<AppState>, principal: Principal, Query(q): Query<PageQuery>) -> Result<Json<OrderPage>> {
    Ok(Json(state.orders.my_orders(principal.id, Page::new(q.page, q.limit, CUSTOMER_PAGE_SIZE)).await?))
}

async fn order_details(State(state): State<AppState>, principal: Principal, Path(order_id): Path<String>) -> Result<Json<Value>> {
    let order = state.orders.order_details(principal.id, &order_code(&order_id)?).await?;
    Ok(Json(json!({ "order": order })))
}

async fn admin_orders(State(state): State<AppState>, _admin: AdminPrincipal, Query(q): Query<AdminOrdersQuery>) -> Result<Json<AdminOrderPage>> {
    let status = match q.status.as_deref().map(str::trim) {
        None | Some("") | Some("ALL") => None,
        Some(s) => Some(OrderStatus::parse(s).ok_or_else(|| EcommerceError::Validation(format!("Unknown order status {s}")))?),
    };
    let filter = OrderFilter { status, search: q.search.filter(|s| !s.trim().is_empty()) };
    Ok(Json(state.orders.admin_orders(&filter, Page::new(q.page, q.limit, ADMIN_PAGE_SIZE)).await?))
}

async fn update_status(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(order_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> Result<Json<Value>> {
    let status = match req.status.as_deref() {
        Some(s) => Some(OrderStatus::parse(s).ok_or_else(|| EcommerceError::Validation(format!("Invalid status {s}")))?),
        None => None,
    };
    let update = StatusUpdate { status, notes: req.notes, tracking: req.tracking_info };
    let order = state.orders.transition_status(admin.id, &order_code(&order_id)?, update).await?;
    Ok(Json(json!({ "message": "Order status updated successfully", "order": order })))
}

/// Signature is checked over the exact bytes received. Authentic events that
/// match no order still get a 200 so the gateway stops redelivering them.
async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let event = state.orders.parse_webhook(&body, signature)?;
    state.orders.apply_webhook_event(event).await?;
    Ok(Json(json!({ "status": "ok" })))
}
