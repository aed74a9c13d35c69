//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::product::{Product, ProductImage};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::state_machine::{self, Effect, OrderState, Plan, Trigger};
use crate::domain::value_objects::{AmountOverflow, Money, OrderCode, Pincode, ProductCode};

/// An order. The line items are a snapshot taken at checkout; after creation
/// the order only changes through [`Order::apply`], which appends exactly one
/// history entry per applied transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    order_id: OrderCode,
    principal_id: Uuid,
    items: Vec<OrderLine>,
    order_summary: OrderSummary,
    shipping_address: ShippingAddress,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    order_status: OrderStatus,
    status_history: Vec<HistoryEntry>,
    gateway: Option<GatewayDetails>,
    tracking_info: Option<TrackingInfo>,
    cancellation: Option<Cancellation>,
    order_date: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductCode,
    pub name: String,
    pub category: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
    pub colour: Option<String>,
    pub images: Vec<ProductImage>,
}

impl OrderLine {
    /// Copies what the order needs to remember about `product` at this moment.
    pub fn snapshot(product: &Product, quantity: u32) -> Result<Self, AmountOverflow> {
        Ok(Self {
            product_id: product.product_id.clone(), name: product.name.clone(), category: product.category.clone(),
            unit_price: product.price, quantity, subtotal: product.price.times(quantity)?,
            colour: product.default_colour().map(str::to_string), images: product.images.clone(),
        })
    }
}

/// Priced totals. Only [`OrderSummary::compose`] builds one, so `total` is
/// always `subtotal + tax + shipping`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    subtotal: Money,
    tax: Money,
    shipping: Money,
    total: Money,
    currency: String,
}

impl OrderSummary {
    pub fn compose(subtotal: Money, tax: Money, shipping: Money, currency: &str) -> Result<Self, AmountOverflow> {
        let total = subtotal.checked_add(tax)?.checked_add(shipping)?;
        Ok(Self { subtotal, tax, shipping, total, currency: currency.to_string() })
    }
    pub fn subtotal(&self) -> Money { self.subtotal }
    pub fn tax(&self) -> Money { self.tax }
    pub fn shipping(&self) -> Money { self.shipping }
    pub fn total(&self) -> Money { self.total }
    pub fn currency(&self) -> &str { &self.currency }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 120, message = "fullName is required"))]
    pub full_name: String,
    #[validate(length(min = 7, max = 20, message = "phone must be 7-20 characters"))]
    pub phone: String,
    #[validate(length(min = 1, max = 200, message = "addressLine1 is required"))]
    pub address_line1: String,
    pub address_line2: Option<String>,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    pub pincode: Pincode,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String { "India".to_string() }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { Pending, Confirmed, Processing, Shipped, OutForDelivery, Delivered, Cancelled }

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        Self::Pending, Self::Confirmed, Self::Processing, Self::Shipped, Self::OutForDelivery, Self::Delivered, Self::Cancelled,
    ];

    /// Position on the fulfilment path; `None` for `Cancelled`.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::OutForDelivery => Some(4),
            Self::Delivered => Some(5),
            Self::Cancelled => None,
        }
    }

    pub fn is_cancellable(&self) -> bool { matches!(self, Self::Pending | Self::Confirmed) }
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> { Self::ALL.into_iter().find(|st| st.as_str() == s) }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus { Pending, Paid, Failed, Refunded }

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "PENDING", Self::Paid => "PAID", Self::Failed => "FAILED", Self::Refunded => "REFUNDED" }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod { Cod, Razorpay }

/// Who caused a history entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor { Customer(Uuid), Admin(Uuid), Gateway, System }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub timestamp: DateTime<Utc>,
    pub updated_by: Actor,
    pub notes: Option<String>,
}

/// Gateway reconciliation fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayDetails {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
    pub verified: bool,
    pub amount_paid: Option<Money>,
    pub payment_method: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Funds captured by the gateway for one payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement { pub payment_id: String, pub amount: Money, pub method: Option<String> }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingInfo {
    pub tracking_number: Option<String>,
    pub courier_service: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

impl TrackingInfo {
    /// Fields present in `update` replace the current ones.
    pub fn merge(&mut self, update: TrackingInfo) {
        if update.tracking_number.is_some() { self.tracking_number = update.tracking_number; }
        if update.courier_service.is_some() { self.courier_service = update.courier_service; }
        if update.estimated_delivery.is_some() { self.estimated_delivery = update.estimated_delivery; }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation { pub reason: String, pub cancelled_by: Actor }

/// Result of [`Order::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Transition applied; `release_stock` tells the caller to return the line items to stock.
    Applied { from: OrderStatus, to: OrderStatus, release_stock: bool },
    /// Nothing changed (replayed or stale notification).
    Ignored(&'static str),
}

impl Order {
    /// Builds a new order. A verified gateway payment makes it CONFIRMED/PAID,
    /// otherwise it starts PENDING/PENDING.
    pub fn place(
        principal_id: Uuid,
        items: Vec<OrderLine>,
        order_summary: OrderSummary,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
        gateway: Option<GatewayDetails>,
    ) -> Self {
        let now = Utc::now();
        let paid = payment_method == PaymentMethod::Razorpay && gateway.as_ref().is_some_and(|g| g.verified);
        let (order_status, payment_status) = if paid { (OrderStatus::Confirmed, PaymentStatus::Paid) } else { (OrderStatus::Pending, PaymentStatus::Pending) };
        let mut order = Self {
            order_id: OrderCode::generate(), principal_id, items, order_summary, shipping_address, payment_method,
            payment_status, order_status,
            status_history: vec![HistoryEntry { status: order_status, payment_status, timestamp: now, updated_by: Actor::Customer(principal_id), notes: Some("Order placed".into()) }],
            gateway, tracking_info: None, cancellation: None, order_date: now,
            confirmed_at: paid.then_some(now), shipped_at: None, delivered_at: None, cancelled_at: None, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: order.order_id.clone(), principal_id, total: order.order_summary.total() }));
        order
    }

    pub fn order_id(&self) -> &OrderCode { &self.order_id }
    pub fn principal_id(&self) -> Uuid { self.principal_id }
    pub fn items(&self) -> &[OrderLine] { &self.items }
    pub fn summary(&self) -> &OrderSummary { &self.order_summary }
    pub fn shipping_address(&self) -> &ShippingAddress { &self.shipping_address }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn status(&self) -> OrderStatus { self.order_status }
    pub fn history(&self) -> &[HistoryEntry] { &self.status_history }
    pub fn gateway(&self) -> Option<&GatewayDetails> { self.gateway.as_ref() }
    pub fn tracking(&self) -> Option<&TrackingInfo> { self.tracking_info.as_ref() }
    pub fn cancellation(&self) -> Option<&Cancellation> { self.cancellation.as_ref() }
    pub fn order_date(&self) -> DateTime<Utc> { self.order_date }
    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> { self.confirmed_at }
    pub fn shipped_at(&self) -> Option<DateTime<Utc>> { self.shipped_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> { self.cancelled_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn state(&self) -> OrderState {
        OrderState {
            status: self.order_status,
            payment: self.payment_status,
            method: self.payment_method,
            settled: self.gateway.as_ref().is_some_and(|g| g.settled_at.is_some()),
        }
    }

    /// Runs `trigger` through the state machine and applies its effects except
    /// stock release, which the caller performs in the same transaction when
    /// the outcome asks for it. `tracking` is merged only when the transition
    /// is applied.
    pub fn apply(&mut self, trigger: Trigger, actor: Actor, notes: Option<String>, tracking: Option<TrackingInfo>) -> Result<Outcome, OrderError> {
        let (to, effects) = match state_machine::plan(self.state(), &trigger)? {
            Plan::Apply { to, effects } => (to, effects),
            Plan::Ignore(reason) => return Ok(Outcome::Ignored(reason)),
        };
        let from = self.order_status;
        let now = self.next_timestamp();
        let notes = notes.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| default_note(&trigger, to, &actor));

        for effect in &effects {
            match effect {
                Effect::ReleaseStock => {}
                Effect::FlagRefund => self.payment_status = PaymentStatus::Refunded,
                Effect::MarkPaid => self.payment_status = PaymentStatus::Paid,
                Effect::MarkPaymentFailed => self.payment_status = PaymentStatus::Failed,
                Effect::RecordSettlement => {
                    if let Trigger::PaymentCaptured(settlement) = &trigger { self.record_settlement(settlement, now); }
                }
                Effect::StampConfirmed => self.confirmed_at = Some(now),
                Effect::StampShipped => self.shipped_at = Some(now),
                Effect::StampDelivered => self.delivered_at = Some(now),
                Effect::StampCancelled => {
                    self.cancelled_at = Some(now);
                    self.cancellation = Some(Cancellation { reason: notes.clone(), cancelled_by: actor.clone() });
                }
            }
        }
        if let Some(update) = tracking { self.tracking_info.get_or_insert_with(TrackingInfo::default).merge(update); }

        self.order_status = to;
        self.status_history.push(HistoryEntry { status: to, payment_status: self.payment_status, timestamp: now, updated_by: actor, notes: Some(notes) });
        self.updated_at = now;
        self.raise_transition_events(&trigger, from, to, &effects);

        Ok(Outcome::Applied { from, to, release_stock: effects.contains(&Effect::ReleaseStock) })
    }

    fn record_settlement(&mut self, settlement: &Settlement, now: DateTime<Utc>) {
        let gateway = self.gateway.get_or_insert_with(GatewayDetails::default);
        if gateway.gateway_payment_id.is_empty() { gateway.gateway_payment_id = settlement.payment_id.clone(); }
        gateway.amount_paid = Some(settlement.amount);
        gateway.payment_method = settlement.method.clone();
        gateway.settled_at = Some(now);
    }

    fn raise_transition_events(&mut self, trigger: &Trigger, from: OrderStatus, to: OrderStatus, effects: &[Effect]) {
        let order_id = self.order_id.clone();
        if from != to {
            self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: order_id.clone(), from, to }));
        }
        match trigger {
            Trigger::PaymentCaptured(s) => self.raise_event(DomainEvent::Order(OrderEvent::PaymentCaptured { order_id, amount: s.amount })),
            Trigger::PaymentFailed => self.raise_event(DomainEvent::Order(OrderEvent::PaymentFailed { order_id, released_stock: effects.contains(&Effect::ReleaseStock) })),
            _ if to == OrderStatus::Cancelled && from != to => {
                self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id, refund_requested: effects.contains(&Effect::FlagRefund) }))
            }
            _ => {}
        }
    }

    /// Never earlier than the last history entry, so the timeline stays ordered
    /// even if the wall clock steps backwards.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        self.status_history.last().map_or(now, |last| last.timestamp.max(now))
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

fn default_note(trigger: &Trigger, to: OrderStatus, actor: &Actor) -> String {
    match (trigger, actor) {
        (Trigger::Cancel, Actor::Customer(_)) => "Cancelled by customer".into(),
        (Trigger::Cancel, _) => "Order cancelled".into(),
        (Trigger::Advance(_), Actor::Admin(_)) => format!("Status updated to {to} by admin"),
        (Trigger::Advance(_), _) => format!("Status updated to {to}"),
        (Trigger::PaymentCaptured(_), _) => "Payment captured via webhook".into(),
        (Trigger::PaymentFailed, _) => "Payment failed via webhook".into(),
        (Trigger::GatewayOrderPaid, _) => "Order confirmed via webhook".into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { InvalidTransition { from: OrderStatus, to: OrderStatus } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::InvalidTransition { from, to } => write!(f, "Order cannot move from {from} to {to}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Quantity;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Asha Rao".into(), phone: "9876543210".into(), address_line1: "12 MG Road".into(), address_line2: None,
            city: "Bengaluru".into(), state: "KA".into(), pincode: Pincode::new("560001").unwrap(), country: default_country(),
        }
    }

    fn order(method: PaymentMethod, gateway: Option<GatewayDetails>) -> Order {
        let product = Product::create(ProductCode::new("P1").unwrap(), "Desk Lamp", "Lighting", Money::from_major(500), Quantity::new(5));
        let line = OrderLine::snapshot(&product, 2).unwrap();
        let summary = OrderSummary::compose(line.subtotal, Money::from_major(80), Money::ZERO, "INR").unwrap();
        Order::place(Uuid::new_v4(), vec![line], summary, address(), method, gateway)
    }

    fn verified() -> GatewayDetails {
        GatewayDetails { gateway_order_id: "order_1".into(), gateway_payment_id: "pay_1".into(), signature: "sig".into(), verified: true, ..Default::default() }
    }

    #[test]
    fn test_cod_order_starts_pending_with_one_history_entry() {
        let o = order(PaymentMethod::Cod, None);
        assert_eq!(o.status(), OrderStatus::Pending);
        assert_eq!(o.payment_status(), PaymentStatus::Pending);
        assert_eq!(o.history().len(), 1);
        assert_eq!(o.history()[0].notes.as_deref(), Some("Order placed"));
        assert_eq!(o.summary().total(), Money::from_major(1080));
        assert!(o.confirmed_at().is_none());
    }

    #[test]
    fn test_verified_gateway_order_starts_confirmed_and_paid() {
        let o = order(PaymentMethod::Razorpay, Some(verified()));
        assert_eq!(o.status(), OrderStatus::Confirmed);
        assert_eq!(o.payment_status(), PaymentStatus::Paid);
        assert!(o.confirmed_at().is_some());
    }

    #[test]
    fn test_customer_cancel_records_reason_and_refund_intent() {
        let mut o = order(PaymentMethod::Razorpay, Some(verified()));
        let customer = Actor::Customer(o.principal_id());
        let outcome = o.apply(Trigger::Cancel, customer.clone(), None, None).unwrap();
        assert_eq!(outcome, Outcome::Applied { from: OrderStatus::Confirmed, to: OrderStatus::Cancelled, release_stock: true });
        assert_eq!(o.payment_status(), PaymentStatus::Refunded);
        assert_eq!(o.history().len(), 2);
        assert_eq!(o.cancellation().unwrap().reason, "Cancelled by customer");
        assert_eq!(o.cancellation().unwrap().cancelled_by, customer);
        assert!(o.cancelled_at().is_some());
    }

    #[test]
    fn test_admin_advance_stamps_and_merges_tracking() {
        let mut o = order(PaymentMethod::Cod, None);
        let admin = Actor::Admin(Uuid::new_v4());
        let tracking = TrackingInfo { tracking_number: Some("AWB123".into()), ..Default::default() };
        o.apply(Trigger::Advance(OrderStatus::Shipped), admin.clone(), None, Some(tracking)).unwrap();
        let courier = TrackingInfo { courier_service: Some("BlueDart".into()), ..Default::default() };
        o.apply(Trigger::Advance(OrderStatus::OutForDelivery), admin, Some("left hub".into()), Some(courier)).unwrap();

        assert!(o.shipped_at().is_some());
        let t = o.tracking().unwrap();
        assert_eq!(t.tracking_number.as_deref(), Some("AWB123"));
        assert_eq!(t.courier_service.as_deref(), Some("BlueDart"));
        assert_eq!(o.history().len(), 3);
        assert_eq!(o.history()[1].notes.as_deref(), Some("Status updated to SHIPPED by admin"));
        assert_eq!(o.history()[2].notes.as_deref(), Some("left hub"));
    }

    #[test]
    fn test_rejected_transition_changes_nothing() {
        let mut o = order(PaymentMethod::Cod, None);
        let admin = Actor::Admin(Uuid::new_v4());
        o.apply(Trigger::Advance(OrderStatus::Delivered), admin.clone(), None, None).unwrap();
        let before = o.history().len();
        let tracking = TrackingInfo { tracking_number: Some("X".into()), ..Default::default() };
        let err = o.apply(Trigger::Cancel, admin, None, Some(tracking)).unwrap_err();
        assert_eq!(err, OrderError::InvalidTransition { from: OrderStatus::Delivered, to: OrderStatus::Cancelled });
        assert_eq!(o.history().len(), before);
        assert!(o.tracking().is_none());
    }

    #[test]
    fn test_settlement_recorded_once() {
        let mut o = order(PaymentMethod::Razorpay, Some(verified()));
        let settlement = Settlement { payment_id: "pay_1".into(), amount: Money::from_major(1080), method: Some("upi".into()) };
        let first = o.apply(Trigger::PaymentCaptured(settlement.clone()), Actor::Gateway, None, None).unwrap();
        assert!(matches!(first, Outcome::Applied { release_stock: false, .. }));
        let snapshot = serde_json::to_value(&o).unwrap();
        let second = o.apply(Trigger::PaymentCaptured(settlement), Actor::Gateway, None, None).unwrap();
        assert!(matches!(second, Outcome::Ignored(_)));
        assert_eq!(serde_json::to_value(&o).unwrap(), snapshot);
        assert_eq!(o.gateway().unwrap().amount_paid, Some(Money::from_major(1080)));
    }

    #[test]
    fn test_history_timestamps_never_decrease() {
        let mut o = order(PaymentMethod::Cod, None);
        let admin = Actor::Admin(Uuid::new_v4());
        for status in [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            o.apply(Trigger::Advance(status), admin.clone(), None, None).unwrap();
        }
        assert!(o.history().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_storage_roundtrip_keeps_summary_consistent() {
        let o = order(PaymentMethod::Cod, None);
        let restored: Order = serde_json::from_value(serde_json::to_value(&o).unwrap()).unwrap();
        let s = restored.summary();
        assert_eq!(s.total(), s.subtotal() + s.tax() + s.shipping());
        assert_eq!(restored.order_id(), o.order_id());
    }
}
