//! `/api/pincodes` routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::api::{AdminPrincipal, AppState, ValidatedJson};
use crate::domain::value_objects::{Money, Pincode};
use crate::services::zones::NewZone;
use crate::Result;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/add", post(add_zone))
        .route("/admin/deactivate/:pincode", patch(deactivate_zone))
        .route("/check/:pincode", get(check_zone))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddZoneRequest {
    pub pincode: Pincode,
    #[validate(length(min = 1, max = 120, message = "area is required"))]
    pub area: String,
    #[validate(length(min = 1, max = 120, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 120, message = "state is required"))]
    pub state: String,
    pub cod_available: Option<bool>,
    pub delivery_charge: Option<Money>,
    #[validate(range(min = 1, max = 60, message = "estimatedDeliveryDays must be 1-60"))]
    pub estimated_delivery_days: Option<u32>,
}

async fn add_zone(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    ValidatedJson(req): ValidatedJson<AddZoneRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let zone = state.zones.add(NewZone {
        pincode: req.pincode,
        area: req.area,
        city: req.city,
        state: req.state,
        cod_available: req.cod_available,
        delivery_charge: req.delivery_charge,
        estimated_delivery_days: req.estimated_delivery_days,
    }, admin.id)
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Pincode added successfully", "pincode": zone }))))
}

async fn deactivate_zone(State(state): State<AppState>, _admin: AdminPrincipal, Path(pincode): Path<String>) -> Result<Json<Value>> {
    let zone = state.zones.deactivate(&Pincode::new(pincode.trim())?).await?;
    Ok(Json(json!({ "message": "Pincode deactivated", "pincode": zone })))
}

/// Malformed codes are answered like unknown ones.
async fn check_zone(State(state): State<AppState>, Path(pincode): Path<String>) -> Result<Json<Value>> {
    let zone = match Pincode::new(pincode.trim()) {
        Ok(pincode) => state.zones.check(&pincode).await?,
        Err(_) => None,
    };
    let body = match zone {
        Some(z) => json!({
            "available": true,
            "codAvailable": z.cod_available,
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
