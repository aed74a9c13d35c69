//! Order lifecycle: checkout, cancellation, admin transitions, gateway
//! reconciliation and the order read paths.
//!
//! Every write runs in one unit of work bounded by the transaction timeout.
//! Domain events are published only after commit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Actor, Order, OrderStatus, Outcome, PaymentMethod, ShippingAddress, TrackingInfo};
use crate::domain::aggregates::order::{GatewayDetails, Settlement};
use crate::domain::events::DomainEvent;
use crate::domain::state_machine::Trigger;
use crate::domain::value_objects::{Money, OrderCode};
use crate::payment::{PaymentGateway, PaymentIntent, PaymentProof, WebhookEvent};
use crate::publisher::EventPublisher;
use crate::services::inventory::{self, StockRestoration, StockUpdate};
use crate::services::pricing::PricingPolicy;
use crate::services::{bounded, DEFAULT_TX_TIMEOUT};
use crate::store::{OrderFilter, OrderKey, Page, StatusStats, Store, PAYMENT_ALREADY_USED};
use crate::{EcommerceError, Result};

pub const CUSTOMER_PAGE_SIZE: u32 = 10;
pub const ADMIN_PAGE_SIZE: u32 = 20;

/// How a checkout is paid for.
#[derive(Clone, Debug)]
pub enum CheckoutPayment {
    CashOnDelivery,
    /// Completed gateway checkout; verified before anything is reserved.
    Gateway(PaymentProof),
}

#[derive(Clone, Debug, Default)]
pub struct StatusUpdate {
    pub status: Option<OrderStatus>,
    pub notes: Option<String>,
    pub tracking: Option<TrackingInfo>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: OrderCode,
    pub order: Order,
    pub stock_updates: Vec<StockUpdate>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledOrder {
    pub order: Order,
    pub stock_restorations: Vec<StockRestoration>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub current_page: u32,
    pub total_pages: u64,
    pub total_orders: u64,
}

impl OrderPage {
    fn new((orders, total): (Vec<Order>, u64), page: Page) -> Self {
        Self { orders, current_page: page.page, total_pages: page.total_pages(total), total_orders: total }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderPage {
    #[serde(flatten)]
    pub page: OrderPage,
    pub stats: Vec<StatusStats>,
}

/// Result of reconciling one webhook event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookResult {
    /// No order carries the gateway id (or the event kind is not handled).
    Unmatched,
    Processed { order_id: OrderCode, outcome: Outcome },
}

struct Transitioned {
    order: Order,
    outcome: Outcome,
    restorations: Vec<StockRestoration>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    pricing: PricingPolicy,
    publisher: EventPublisher,
    tx_timeout: Duration,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, pricing: PricingPolicy, publisher: EventPublisher) -> Self {
        Self { store, gateway, pricing, publisher, tx_timeout: DEFAULT_TX_TIMEOUT }
    }

    pub fn with_tx_timeout(mut self, tx_timeout: Duration) -> Self { self.tx_timeout = tx_timeout; self }

    pub fn gateway_key_id(&self) -> &str { self.gateway.key_id() }

    /// Authenticates a raw webhook body before anything reads it.
    pub fn parse_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<WebhookEvent> {
        self.gateway.parse_webhook(raw_body, signature)
    }

    /// Creates the remote payment order the client pays against.
    pub async fn create_payment_intent(&self, principal_id: Uuid, amount: Money, currency: Option<String>) -> Result<PaymentIntent> {
        if amount.is_zero() { return Err(EcommerceError::Validation("amount must be greater than zero".into())); }
        let currency = currency.unwrap_or_else(|| self.pricing.currency.clone());
        let receipt = format!("order_rcptid_{}", Utc::now().timestamp_millis());
        let intent = self.gateway.create_intent(amount, &currency, &receipt).await?;
        tracing::info!(principal = %principal_id, gateway_order_id = %intent.id, amount = %amount, "payment intent created");
        Ok(intent)
    }

    /// Turns the principal's cart into an order. Cart read, stock reservation,
    /// order insert and cart clear commit together or not at all.
    pub async fn create_order(&self, principal_id: Uuid, address: ShippingAddress, payment: CheckoutPayment) -> Result<PlacedOrder> {
        address.validate()?;
        let (method, gateway) = match payment {
            CheckoutPayment::CashOnDelivery => (PaymentMethod::Cod, None),
            CheckoutPayment::Gateway(proof) => {
                if let Err(e) = self.gateway.verify_payment(&proof) {
                    tracing::warn!(principal = %principal_id, gateway_order_id = %proof.gateway_order_id, "payment signature rejected");
                    return Err(e);
                }
                let intent = self.gateway.fetch_intent(&proof.gateway_order_id).await?;
                let details = GatewayDetails {
                    gateway_order_id: proof.gateway_order_id,
                    gateway_payment_id: proof.gateway_payment_id,
                    signature: proof.signature,
                    verified: true,
                    payment_date: Some(Utc::now()),
                    amount_paid: Some(Money::from_minor(intent.amount)),
                    ..Default::default()
                };
                (PaymentMethod::Razorpay, Some(details))
            }
        };

        let (placed, events) = bounded(self.tx_timeout, self.place(principal_id, address, method, gateway)).await?;
        tracing::info!(
            order_id = %placed.order_id, principal = %principal_id, total = %placed.order.summary().total(),
            status = %placed.order.status(), "order placed"
        );
        self.publisher.publish_all(events).await;
        Ok(placed)
    }

    async fn place(
        &self,
        principal_id: Uuid,
        address: ShippingAddress,
        method: PaymentMethod,
        gateway: Option<GatewayDetails>,
    ) -> Result<(PlacedOrder, Vec<DomainEvent>)> {
        let mut uow = self.store.begin().await?;
        if let Some(g) = &gateway {
            let keys = [OrderKey::GatewayPaymentId(g.gateway_payment_id.clone()), OrderKey::GatewayOrderId(g.gateway_order_id.clone())];
            for key in keys {
                if let Some(existing) = uow.order_for_update(&key).await? {
                    tracing::warn!(principal = %principal_id, existing_order = %existing.order_id(), ?key, "gateway payment presented twice");
                    return Err(EcommerceError::Conflict(PAYMENT_ALREADY_USED.into()));
                }
            }
        }
        let mut cart = uow.cart_for_update(principal_id).await?
            .filter(|c| !c.is_empty())
            .ok_or(EcommerceError::EmptyCart)?;

        let reservation = inventory::reserve(uow.as_mut(), cart.items()).await?;
        let surcharge = uow.zone(&address.pincode).await?.and_then(|z| z.surcharge());
        let summary = self.pricing.quote(&reservation.lines, surcharge)?;
        if let Some(paid) = gateway.as_ref().and_then(|g| g.amount_paid) {
            if paid < summary.total() {
                tracing::warn!(principal = %principal_id, paid = %paid, total = %summary.total(), "gateway payment short of order total");
                return Err(EcommerceError::Validation("Payment amount does not cover the order total".into()));
            }
        }

        let mut order = Order::place(principal_id, reservation.lines, summary, address, method, gateway);
        uow.insert_order(&order).await?;
        cart.clear();
        uow.save_cart(&cart).await?;
        uow.commit().await?;

        let mut events = reservation.events;
        events.extend(order.take_events());
        Ok((PlacedOrder { order_id: order.order_id().clone(), order, stock_updates: reservation.updates }, events))
    }

    /// Customer cancellation of their own order.
    pub async fn cancel(&self, principal_id: Uuid, order_id: &OrderCode, reason: Option<String>) -> Result<CancelledOrder> {
        let key = OrderKey::Code(order_id.clone());
        let done = self.transition(key, Some(principal_id), Trigger::Cancel, Actor::Customer(principal_id), reason, None).await?
            .ok_or_else(|| EcommerceError::not_found("Order", order_id))?;
        tracing::info!(order_id = %order_id, principal = %principal_id, payment_status = done.order.payment_status().as_str(), "order cancelled by customer");
        Ok(CancelledOrder { order: done.order, stock_restorations: done.restorations })
    }

    /// Privileged status change. Cancelling through here releases stock and
    /// flags refunds exactly like a customer cancellation.
    pub async fn transition_status(&self, admin_id: Uuid, order_id: &OrderCode, update: StatusUpdate) -> Result<Order> {
        let status = update.status.ok_or_else(|| EcommerceError::Validation("status is required".into()))?;
        let key = OrderKey::Code(order_id.clone());
        let done = self.transition(key, None, Trigger::Advance(status), Actor::Admin(admin_id), update.notes, update.tracking).await?
            .ok_or_else(|| EcommerceError::not_found("Order", order_id))?;
        if let Outcome::Applied { from, to, .. } = done.outcome {
            tracing::info!(order_id = %order_id, admin = %admin_id, from = %from, to = %to, "order status updated");
        }
        Ok(done.order)
    }

    /// Reconciles a verified gateway notification. Replays and stale events
    /// are no-ops.
    pub async fn apply_webhook_event(&self, event: WebhookEvent) -> Result<WebhookResult> {
        let (keys, trigger) = match event {
            WebhookEvent::PaymentCaptured { payment_id, order_id, amount, method } => {
                (payment_keys(&payment_id, order_id), Trigger::PaymentCaptured(Settlement { payment_id, amount, method }))
            }
            WebhookEvent::PaymentFailed { payment_id, order_id, .. } => (payment_keys(&payment_id, order_id), Trigger::PaymentFailed),
            WebhookEvent::OrderPaid { order_id, .. } => (vec![OrderKey::GatewayOrderId(order_id)], Trigger::GatewayOrderPaid),
            WebhookEvent::Unhandled(kind) => {
                tracing::debug!(event = %kind, "webhook event ignored");
                return Ok(WebhookResult::Unmatched);
            }
        };

        for key in keys {
            if let Some(done) = self.transition(key.clone(), None, trigger.clone(), Actor::Gateway, None, None).await? {
                let order_id = done.order.order_id().clone();
                match &done.outcome {
                    Outcome::Applied { from, to, release_stock } => {
                        tracing::info!(order_id = %order_id, from = %from, to = %to, released_stock = release_stock, payment_status = done.order.payment_status().as_str(), "webhook applied");
                    }
                    Outcome::Ignored(reason) => tracing::info!(order_id = %order_id, reason, "webhook replay ignored"),
                }
                return Ok(WebhookResult::Processed { order_id, outcome: done.outcome });
            }
        }
        tracing::warn!(?trigger, "webhook matched no order");
        Ok(WebhookResult::Unmatched)
    }

    /// Runs `trigger` against the matching order and publishes what it raised.
    /// `None` when no order matches (or it belongs to someone other than `owner`).
    async fn transition(
        &self,
        key: OrderKey,
        owner: Option<Uuid>,
        trigger: Trigger,
        actor: Actor,
        notes: Option<String>,
        tracking: Option<TrackingInfo>,
    ) -> Result<Option<Transitioned>> {
        let op = self.transition_in_tx(key, owner, trigger, actor, notes, tracking);
        let Some((done, events)) = bounded(self.tx_timeout, op).await? else { return Ok(None) };
        self.publisher.publish_all(events).await;
        Ok(Some(done))
    }

    /// Loads the order for update, applies the trigger, releases stock when the
    /// transition asks for it, and commits.
    async fn transition_in_tx(
        &self,
        key: OrderKey,
        owner: Option<Uuid>,
        trigger: Trigger,
        actor: Actor,
        notes: Option<String>,
        tracking: Option<TrackingInfo>,
    ) -> Result<Option<(Transitioned, Vec<DomainEvent>)>> {
        let mut uow = self.store.begin().await?;
        let Some(mut order) = uow.order_for_update(&key).await? else { return Ok(None) };
        if owner.is_some_and(|id| id != order.principal_id()) { return Ok(None); }

        let outcome = order.apply(trigger, actor, notes, tracking)?;
        let Outcome::Applied { release_stock, .. } = outcome else {
            return Ok(Some((Transitioned { order, outcome, restorations: vec![] }, vec![])));
        };

        let mut events = vec![];
        let mut restorations = vec![];
        if release_stock {
            let released = inventory::release(uow.as_mut(), order.items()).await?;
            restorations = released.restorations;
            events = released.events;
        }
        uow.update_order(&order).await?;
        uow.commit().await?;
        events.extend(order.take_events());
        Ok(Some((Transitioned { order, outcome, restorations }, events)))
    }

    pub async fn my_orders(&self, principal_id: Uuid, page: Page) -> Result<OrderPage> {
        Ok(OrderPage::new(self.store.orders_for_principal(principal_id, page).await?, page))
    }

    /// Only the owner sees an order; anyone else gets `NotFound`.
    pub async fn order_details(&self, principal_id: Uuid, order_id: &OrderCode) -> Result<Order> {
        self.store.order(order_id).await?
            .filter(|o| o.principal_id() == principal_id)
            .ok_or_else(|| EcommerceError::not_found("Order", order_id))
    }

    pub async fn admin_orders(&self, filter: &OrderFilter, page: Page) -> Result<AdminOrderPage> {
        let rows = self.store.search_orders(filter, page).await?;
        let stats = self.store.order_stats().await?;
        Ok(AdminOrderPage { page: OrderPage::new(rows, page), stats })
    }
}

/// Payment id first, then the gateway order the payment belongs to.
fn payment_keys(payment_id: &str, order_id: Option<String>) -> Vec<OrderKey> {
    let mut keys = vec![OrderKey::GatewayPaymentId(payment_id.to_string())];
    keys.extend(order_id.map(OrderKey::GatewayOrderId));
    keys
}
