//! In-process store.
//!
//! A transaction takes the single table lock for its whole lifetime and works
//! on a private copy; commit swaps the copy in, drop throws it away. That makes
//! transactions fully serialized, which is stronger than the row locks the
//! Postgres store takes and good enough for tests and embedding.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, DeliveryZone, Order, OrderStatus, Product};
use crate::domain::value_objects::{Money, OrderCode, Pincode, ProductCode};
use crate::store::{OrderFilter, OrderKey, Page, ProductFilter, StatusStats, Store, UnitOfWork, PAYMENT_ALREADY_USED};
use crate::{EcommerceError, Result};

#[derive(Clone, Default)]
struct Tables {
    products: BTreeMap<ProductCode, Product>,
    carts: HashMap<Uuid, Cart>,
    zones: BTreeMap<String, DeliveryZone>,
    orders: HashMap<OrderCode, Order>,
}

impl Tables {
    fn find_order(&self, key: &OrderKey) -> Option<&Order> {
        match key {
            OrderKey::Code(code) => self.orders.get(code),
            OrderKey::GatewayPaymentId(id) => self.orders.values().find(|o| o.gateway().is_some_and(|g| &g.gateway_payment_id == id)),
            OrderKey::GatewayOrderId(id) => self.orders.values().find(|o| o.gateway().is_some_and(|g| &g.gateway_order_id == id)),
        }
    }

    fn newest_first<'a>(&'a self, keep: impl Fn(&Order) -> bool) -> Vec<&'a Order> {
        let mut orders: Vec<_> = self.orders.values().filter(|o| keep(o)).collect();
        orders.sort_by(|a, b| b.order_date().cmp(&a.order_date()));
        orders
    }
}

fn paginate(orders: Vec<&Order>, page: Page) -> (Vec<Order>, u64) {
    let total = orders.len() as u64;
    let rows = orders.into_iter().skip(page.offset() as usize).take(page.limit as usize).cloned().collect();
    (rows, total)
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_order_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Makes every order insert/update fail with a persistence error, to
    /// exercise rollback paths.
    pub fn fail_order_writes(&self, fail: bool) { self.fail_order_writes.store(fail, Ordering::SeqCst); }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working, fail_order_writes: self.fail_order_writes.load(Ordering::SeqCst) }))
    }

    async fn product(&self, product_id: &ProductCode) -> Result<Option<Product>> {
        Ok(self.tables.lock().await.products.get(product_id).cloned())
    }

    async fn products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let tables = self.tables.lock().await;
        let mut products: Vec<_> = tables.products.values().filter(|p| filter.matches(p)).cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn low_stock_products(&self) -> Result<Vec<Product>> {
        let tables = self.tables.lock().await;
        let mut products: Vec<_> = tables.products.values().filter(|p| p.is_low_stock()).cloned().collect();
        products.sort_by_key(|p| p.stock());
        Ok(products)
    }

    async fn cart(&self, principal_id: Uuid) -> Result<Option<Cart>> {
        Ok(self.tables.lock().await.carts.get(&principal_id).cloned())
    }

    async fn active_zone(&self, pincode: &Pincode) -> Result<Option<DeliveryZone>> {
        Ok(self.tables.lock().await.zones.get(pincode.as_str()).filter(|z| z.active).cloned())
    }

    async fn order(&self, order_id: &OrderCode) -> Result<Option<Order>> {
        Ok(self.tables.lock().await.orders.get(order_id).cloned())
    }

    async fn orders_for_principal(&self, principal_id: Uuid, page: Page) -> Result<(Vec<Order>, u64)> {
        let tables = self.tables.lock().await;
        Ok(paginate(tables.newest_first(|o| o.principal_id() == principal_id), page))
    }

    async fn search_orders(&self, filter: &OrderFilter, page: Page) -> Result<(Vec<Order>, u64)> {
        let tables = self.tables.lock().await;
        Ok(paginate(tables.newest_first(|o| filter.matches(o)), page))
    }

    async fn order_stats(&self) -> Result<Vec<StatusStats>> {
        let tables = self.tables.lock().await;
        let mut stats: BTreeMap<&'static str, StatusStats> = BTreeMap::new();
        for order in tables.orders.values() {
            let status: OrderStatus = order.status();
            let entry = stats.entry(status.as_str()).or_insert(StatusStats { status, count: 0, total_value: Money::ZERO });
            entry.count += 1;
            entry.total_value = entry.total_value + order.summary().total();
        }
        Ok(stats.into_values().collect())
    }
}

/// Stored copies never carry pending events, same as a row read back from Postgres.
fn detached(product: &Product) -> Product {
    let mut copy = product.clone();
    copy.take_events();
    copy
}

fn detached_order(order: &Order) -> Order {
    let mut copy = order.clone();
    copy.take_events();
    copy
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_order_writes: bool,
}

impl MemoryUnitOfWork {
    fn check_order_writes(&self) -> Result<()> {
        if self.fail_order_writes { return Err(EcommerceError::Persistence("order write rejected".into())); }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn product_for_update(&mut self, product_id: &ProductCode) -> Result<Option<Product>> {
        Ok(self.working.products.get(product_id).cloned())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        if self.working.products.contains_key(&product.product_id) {
            return Err(EcommerceError::Conflict(format!("Product {} already exists", product.product_id)));
        }
        self.working.products.insert(product.product_id.clone(), detached(product));
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<()> {
        let slot = self.working.products.get_mut(&product.product_id)
            .ok_or_else(|| EcommerceError::ProductNotFound(product.product_id.clone()))?;
        *slot = detached(product);
        Ok(())
    }

    async fn cart_for_update(&mut self, principal_id: Uuid) -> Result<Option<Cart>> {
        Ok(self.working.carts.get(&principal_id).cloned())
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        self.working.carts.insert(cart.principal_id(), cart.clone());
        Ok(())
    }

    async fn zone(&mut self, pincode: &Pincode) -> Result<Option<DeliveryZone>> {
        Ok(self.working.zones.get(pincode.as_str()).cloned())
    }

    async fn insert_zone(&mut self, zone: &DeliveryZone) -> Result<()> {
        if self.working.zones.contains_key(zone.pincode.as_str()) {
            return Err(EcommerceError::Conflict("Pincode already exists".into()));
        }
        self.working.zones.insert(zone.pincode.as_str().to_string(), zone.clone());
        Ok(())
    }

    async fn update_zone(&mut self, zone: &DeliveryZone) -> Result<()> {
        self.working.zones.insert(zone.pincode.as_str().to_string(), zone.clone());
        Ok(())
    }

    async fn order_for_update(&mut self, key: &OrderKey) -> Result<Option<Order>> {
        Ok(self.working.find_order(key).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.check_order_writes()?;
        if self.working.orders.contains_key(order.order_id()) {
            return Err(EcommerceError::Conflict(format!("Order {} already exists", order.order_id())));
        }
        if let Some(g) = order.gateway() {
            let taken = |key: OrderKey| self.working.find_order(&key).is_some();
            if (!g.gateway_payment_id.is_empty() && taken(OrderKey::GatewayPaymentId(g.gateway_payment_id.clone())))
                || (!g.gateway_order_id.is_empty() && taken(OrderKey::GatewayOrderId(g.gateway_order_id.clone())))
            {
                return Err(EcommerceError::Conflict(PAYMENT_ALREADY_USED.into()));
            }
        }
        self.working.orders.insert(order.order_id().clone(), detached_order(order));
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        self.check_order_writes()?;
        self.working.orders.insert(order.order_id().clone(), detached_order(order));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Quantity;

    fn lamp(stock: u32) -> Product {
        Product::create(ProductCode::new("P1").unwrap(), "Desk Lamp", "Lighting", Money::from_major(500), Quantity::new(stock))
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_product(&lamp(5)).await.unwrap();
        drop(uow);
        assert!(store.product(&ProductCode::new("P1").unwrap()).await.unwrap().is_none());

        let mut uow = store.begin().await.unwrap();
        uow.insert_product(&lamp(5)).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(store.product(&ProductCode::new("P1").unwrap()).await.unwrap().unwrap().stock().value(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_zone_rejected() {
        let store = MemoryStore::new();
        let zone = DeliveryZone::create(Pincode::new("400001").unwrap(), "Fort", "Mumbai", "MH", Uuid::new_v4());
        let mut uow = store.begin().await.unwrap();
        uow.insert_zone(&zone).await.unwrap();
        assert!(matches!(uow.insert_zone(&zone).await, Err(EcommerceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_gateway_ids_are_unique_across_orders() {
        use crate::domain::aggregates::order::GatewayDetails;
        use crate::domain::aggregates::{OrderSummary, PaymentMethod, ShippingAddress};

        let address = ShippingAddress {
            full_name: "Asha Rao".into(), phone: "9876543210".into(), address_line1: "12 MG Road".into(), address_line2: None,
            city: "Bengaluru".into(), state: "KA".into(), pincode: Pincode::new("560001").unwrap(), country: "India".into(),
        };
        let paid = |order_id: &str, payment_id: &str| {
            let gateway = GatewayDetails { gateway_order_id: order_id.into(), gateway_payment_id: payment_id.into(), verified: true, ..Default::default() };
            let summary = OrderSummary::compose(Money::from_major(500), Money::from_major(40), Money::ZERO, "INR").unwrap();
            Order::place(Uuid::new_v4(), vec![], summary, address.clone(), PaymentMethod::Razorpay, Some(gateway))
        };

        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&paid("order_1", "pay_1")).await.unwrap();
        for duplicate in [paid("order_1", "pay_2"), paid("order_2", "pay_1")] {
            let err = uow.insert_order(&duplicate).await.unwrap_err();
            assert!(matches!(err, EcommerceError::Conflict(ref m) if m == PAYMENT_ALREADY_USED));
        }
        uow.insert_order(&paid("order_2", "pay_2")).await.unwrap();
    }
}
