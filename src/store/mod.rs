//! Persistence seam.
//!
//! [`Store`] serves plain reads and opens transactions. A [`UnitOfWork`] is one
//! transaction: rows read through its `*_for_update` methods stay locked
//! until it commits or is dropped, and dropping it without [`UnitOfWork::commit`]
//! rolls every write back. Services never write outside a unit of work.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, DeliveryZone, Order, OrderStatus, Product};
use crate::domain::value_objects::{Money, OrderCode, Pincode, ProductCode};
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    async fn product(&self, product_id: &ProductCode) -> Result<Option<Product>>;
    async fn products(&self, filter: &ProductFilter) -> Result<Vec<Product>>;
    /// Products at or below their low-stock threshold, lowest stock first.
    async fn low_stock_products(&self) -> Result<Vec<Product>>;
    async fn cart(&self, principal_id: Uuid) -> Result<Option<Cart>>;
    async fn active_zone(&self, pincode: &Pincode) -> Result<Option<DeliveryZone>>;
    async fn order(&self, order_id: &OrderCode) -> Result<Option<Order>>;
    /// Newest first.
    async fn orders_for_principal(&self, principal_id: Uuid, page: Page) -> Result<(Vec<Order>, u64)>;
    /// Newest first.
    async fn search_orders(&self, filter: &OrderFilter, page: Page) -> Result<(Vec<Order>, u64)>;
    async fn order_stats(&self) -> Result<Vec<StatusStats>>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    async fn product_for_update(&mut self, product_id: &ProductCode) -> Result<Option<Product>>;
    async fn insert_product(&mut self, product: &Product) -> Result<()>;
    async fn update_product(&mut self, product: &Product) -> Result<()>;

    async fn cart_for_update(&mut self, principal_id: Uuid) -> Result<Option<Cart>>;
    async fn save_cart(&mut self, cart: &Cart) -> Result<()>;

    /// Any zone with this code, active or not.
    async fn zone(&mut self, pincode: &Pincode) -> Result<Option<DeliveryZone>>;
    async fn insert_zone(&mut self, zone: &DeliveryZone) -> Result<()>;
    async fn update_zone(&mut self, zone: &DeliveryZone) -> Result<()>;

    async fn order_for_update(&mut self, key: &OrderKey) -> Result<Option<Order>>;
    async fn insert_order(&mut self, order: &Order) -> Result<()>;
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Conflict message when a gateway payment is presented for a second order.
pub const PAYMENT_ALREADY_USED: &str = "Payment has already been used for an order";

/// Ways to locate an order. Gateway ids are unique across orders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderKey {
    Code(OrderCode),
    GatewayPaymentId(String),
    GatewayOrderId(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page { pub page: u32, pub limit: u32 }

impl Page {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self { page: page.unwrap_or(1).max(1), limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT) }
    }
    pub fn offset(&self) -> u64 { u64::from(self.page - 1) * u64::from(self.limit) }
    pub fn total_pages(&self, total: u64) -> u64 { total.div_ceil(u64::from(self.limit)) }
}

#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub in_stock: Option<bool>,
    pub category: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
}

impl ProductFilter {
    pub fn matches(&self, p: &Product) -> bool {
        self.in_stock.map_or(true, |want| p.in_stock() == want)
            && self.category.as_ref().map_or(true, |c| p.category.to_lowercase().contains(&c.to_lowercase()))
            && self.min_price.map_or(true, |min| p.price >= min)
            && self.max_price.map_or(true, |max| p.price <= max)
    }
}

#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Case-insensitive substring of order code, recipient name or phone.
    pub search: Option<String>,
}

impl OrderFilter {
    pub fn matches(&self, o: &Order) -> bool {
        let status_ok = self.status.map_or(true, |s| o.status() == s);
        let search_ok = self.search.as_ref().map_or(true, |needle| {
            let needle = needle.to_lowercase();
            let address = o.shipping_address();
            [o.order_id().as_str(), address.full_name.as_str(), address.phone.as_str()]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        });
        status_ok && search_ok
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusStats { pub status: OrderStatus, pub count: u64, pub total_value: Money }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        let p = Page::new(Some(0), Some(500), 10);
        assert_eq!(p, Page { page: 1, limit: 100 });
        let p = Page::new(Some(3), None, 10);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.total_pages(21), 3);
        assert_eq!(p.total_pages(0), 0);
    }
}
