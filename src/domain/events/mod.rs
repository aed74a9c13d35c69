//! Domain events
use crate::domain::aggregates::order::OrderStatus;
use crate::domain::value_objects::{Money, OrderCode, ProductCode};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
}

impl DomainEvent {
    /// Subject suffix used when the event is published (`order.placed`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::StockReserved { .. }) => "product.stock_reserved",
            Self::Product(ProductEvent::StockReleased { .. }) => "product.stock_released",
            Self::Product(ProductEvent::StockAdjusted { .. }) => "product.stock_adjusted",
            Self::Product(ProductEvent::LowStock { .. }) => "product.low_stock",
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "order.status_changed",
            Self::Order(OrderEvent::Cancelled { .. }) => "order.cancelled",
            Self::Order(OrderEvent::PaymentCaptured { .. }) => "order.payment_captured",
            Self::Order(OrderEvent::PaymentFailed { .. }) => "order.payment_failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    StockReserved { product_id: ProductCode, quantity: u32, remaining: u32 },
    StockReleased { product_id: ProductCode, quantity: u32, remaining: u32 },
    StockAdjusted { product_id: ProductCode, previous: u32, current: u32 },
    LowStock { product_id: ProductCode, remaining: u32, threshold: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderCode, principal_id: Uuid, total: Money },
    StatusChanged { order_id: OrderCode, from: OrderStatus, to: OrderStatus },
    Cancelled { order_id: OrderCode, refund_requested: bool },
    PaymentCaptured { order_id: OrderCode, amount: Money },
    PaymentFailed { order_id: OrderCode, released_stock: bool },
}
