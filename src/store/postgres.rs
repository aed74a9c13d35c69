//! Postgres store (sqlx). Rows that a transaction intends to change are read
//! with `SELECT ... FOR UPDATE`, so two checkouts racing for the same stock
//! row are serialized by the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem, DeliveryZone, Order, OrderStatus, Product, ProductImage, Review};
use crate::domain::value_objects::{Money, OrderCode, Pincode, ProductCode, Quantity};
use crate::store::{OrderFilter, OrderKey, Page, ProductFilter, StatusStats, Store, UnitOfWork, PAYMENT_ALREADY_USED};
use crate::{EcommerceError, Result};

const PRODUCT_COLUMNS: &str = "id, product_id, name, category, details, price, stock_quantity, low_stock_threshold, \
    images, colour_options, reviews, created_at, updated_at";

const ZONE_COLUMNS: &str = "id, pincode, area, city, state, cod_available, delivery_charge, estimated_delivery_days, \
    active, added_by, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    product_id: String,
    name: String,
    category: String,
    details: Option<String>,
    price: i64,
    stock_quantity: i32,
    low_stock_threshold: i32,
    images: Json<Vec<ProductImage>>,
    colour_options: Vec<String>,
    reviews: Json<Vec<Review>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self) -> Result<Product> {
        let mut product = Product::create(
            ProductCode::new(self.product_id)?, self.name, self.category,
            Money::from_minor(self.price), Quantity::new(unsigned(self.stock_quantity)),
        );
        product.id = self.id;
        product.details = self.details;
        product.low_stock_threshold = unsigned(self.low_stock_threshold);
        product.images = self.images.0;
        product.colour_options = self.colour_options;
        product.reviews = self.reviews.0;
        product.created_at = self.created_at;
        product.updated_at = self.updated_at;
        Ok(product)
    }
}

#[derive(sqlx::FromRow)]
struct ZoneRow {
    id: Uuid,
    pincode: String,
    area: String,
    city: String,
    state: String,
    cod_available: bool,
    delivery_charge: i64,
    estimated_delivery_days: i32,
    active: bool,
    added_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ZoneRow {
    fn into_zone(self) -> Result<DeliveryZone> {
        Ok(DeliveryZone {
            id: self.id, pincode: Pincode::new(&self.pincode)?, area: self.area, city: self.city, state: self.state,
            cod_available: self.cod_available, delivery_charge: Money::from_minor(self.delivery_charge),
            estimated_delivery_days: unsigned(self.estimated_delivery_days), active: self.active,
            added_by: self.added_by, created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

fn unsigned(v: i32) -> u32 { u32::try_from(v).unwrap_or(0) }

fn signed(v: u32, field: &str) -> Result<i32> {
    i32::try_from(v).map_err(|_| EcommerceError::Validation(format!("{field} is too large")))
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

fn unique_violation(e: sqlx::Error, message: &str) -> EcommerceError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() { return EcommerceError::Conflict(message.to_string()); }
    }
    e.into()
}

fn order_violation(e: sqlx::Error) -> EcommerceError {
    let gateway_key = match &e {
        sqlx::Error::Database(db) => db.is_unique_violation() && db.constraint().is_some_and(|c| c.starts_with("idx_orders_gateway")),
        _ => false,
    };
    if gateway_key { return EcommerceError::Conflict(PAYMENT_ALREADY_USED.into()); }
    unique_violation(e, "Order code already exists")
}

fn collect<T, R>(rows: Vec<R>, convert: impl Fn(R) -> Result<T>) -> Result<Vec<T>> {
    rows.into_iter().map(convert).collect()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn product(&self, product_id: &ProductCode) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1"))
            .bind(product_id.as_str())
            .fetch_optional(&self.pool).await?
            .map(ProductRow::into_product)
            .transpose()
    }

    async fn products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"));
        if let Some(in_stock) = filter.in_stock { qb.push(" AND in_stock = ").push_bind(in_stock); }
        if let Some(category) = &filter.category { qb.push(" AND category ILIKE ").push_bind(like_pattern(category)); }
        if let Some(min) = filter.min_price { qb.push(" AND price >= ").push_bind(min.minor()); }
        if let Some(max) = filter.max_price { qb.push(" AND price <= ").push_bind(max.minor()); }
        qb.push(" ORDER BY created_at DESC");
        let rows = qb.build_query_as::<ProductRow>().fetch_all(&self.pool).await?;
        collect(rows, ProductRow::into_product)
    }

    async fn low_stock_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE stock_quantity <= low_stock_threshold ORDER BY stock_quantity ASC"
        ))
        .fetch_all(&self.pool).await?;
        collect(rows, ProductRow::into_product)
    }

    async fn cart(&self, principal_id: Uuid) -> Result<Option<Cart>> {
        let header: Option<(DateTime<Utc>,)> = sqlx::query_as("SELECT updated_at FROM carts WHERE principal_id = $1")
            .bind(principal_id).fetch_optional(&self.pool).await?;
        let Some((updated_at,)) = header else { return Ok(None) };
        let items: Vec<(String, i32)> = sqlx::query_as("SELECT product_id, quantity FROM cart_items WHERE principal_id = $1 ORDER BY position")
            .bind(principal_id).fetch_all(&self.pool).await?;
        Ok(Some(Cart::restore(principal_id, cart_items(items)?, updated_at)))
    }

    async fn active_zone(&self, pincode: &Pincode) -> Result<Option<DeliveryZone>> {
        sqlx::query_as::<_, ZoneRow>(&format!("SELECT {ZONE_COLUMNS} FROM delivery_zones WHERE pincode = $1 AND active"))
            .bind(pincode.as_str())
            .fetch_optional(&self.pool).await?
            .map(ZoneRow::into_zone)
            .transpose()
    }

    async fn order(&self, order_id: &OrderCode) -> Result<Option<Order>> {
        let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT document FROM orders WHERE order_id = $1")
            .bind(order_id.as_str()).fetch_optional(&self.pool).await?;
        Ok(row.map(|(doc,)| doc.0))
    }

    async fn orders_for_principal(&self, principal_id: Uuid, page: Page) -> Result<(Vec<Order>, u64)> {
        let rows: Vec<(Json<Order>,)> = sqlx::query_as(
            "SELECT document FROM orders WHERE principal_id = $1 ORDER BY order_date DESC LIMIT $2 OFFSET $3",
        )
        .bind(principal_id).bind(i64::from(page.limit)).bind(page.offset() as i64)
        .fetch_all(&self.pool).await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE principal_id = $1")
            .bind(principal_id).fetch_one(&self.pool).await?;
        Ok((rows.into_iter().map(|(doc,)| doc.0).collect(), total.0 as u64))
    }

    async fn search_orders(&self, filter: &OrderFilter, page: Page) -> Result<(Vec<Order>, u64)> {
        const WHERE: &str = "WHERE ($1::TEXT IS NULL OR order_status = $1) \
            AND ($2::TEXT IS NULL OR order_id ILIKE $2 OR recipient_name ILIKE $2 OR recipient_phone ILIKE $2)";
        let status = filter.status.map(|s| s.as_str());
        let pattern = filter.search.as_deref().map(like_pattern);
        let rows: Vec<(Json<Order>,)> = sqlx::query_as(&format!("SELECT document FROM orders {WHERE} ORDER BY order_date DESC LIMIT $3 OFFSET $4"))
            .bind(status).bind(&pattern).bind(i64::from(page.limit)).bind(page.offset() as i64)
            .fetch_all(&self.pool).await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM orders {WHERE}"))
            .bind(status).bind(&pattern)
            .fetch_one(&self.pool).await?;
        Ok((rows.into_iter().map(|(doc,)| doc.0).collect(), total.0 as u64))
    }

    async fn order_stats(&self) -> Result<Vec<StatusStats>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT order_status, COUNT(*), COALESCE(SUM(total), 0)::BIGINT FROM orders GROUP BY order_status ORDER BY order_status",
        )
        .fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(status, count, total)| {
                let status = OrderStatus::parse(&status).ok_or_else(|| EcommerceError::Persistence(format!("unknown order status {status}")))?;
                Ok(StatusStats { status, count: count as u64, total_value: Money::from_minor(total) })
            })
            .collect()
    }
}

fn cart_items(rows: Vec<(String, i32)>) -> Result<Vec<CartItem>> {
    rows.into_iter()
        .map(|(product_id, quantity)| Ok(CartItem { product_id: ProductCode::new(product_id)?, quantity: unsigned(quantity) }))
        .collect()
}

/// One `pool.begin()` transaction. Dropping it rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    async fn write_order(&mut self, order: &Order, insert: bool) -> Result<()> {
        let sql = if insert {
            "INSERT INTO orders (order_id, principal_id, order_status, payment_status, gateway_order_id, gateway_payment_id, \
             recipient_name, recipient_phone, total, order_date, updated_at, document) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        } else {
            "UPDATE orders SET principal_id = $2, order_status = $3, payment_status = $4, gateway_order_id = $5, \
             gateway_payment_id = $6, recipient_name = $7, recipient_phone = $8, total = $9, order_date = $10, \
             updated_at = $11, document = $12 WHERE order_id = $1"
        };
        let gateway = order.gateway();
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        let result = sqlx::query(sql)
            .bind(order.order_id().as_str())
            .bind(order.principal_id())
            .bind(order.status().as_str())
            .bind(order.payment_status().as_str())
            .bind(gateway.and_then(|g| non_empty(&g.gateway_order_id)))
            .bind(gateway.and_then(|g| non_empty(&g.gateway_payment_id)))
            .bind(&order.shipping_address().full_name)
            .bind(&order.shipping_address().phone)
            .bind(order.summary().total().minor())
            .bind(order.order_date())
            .bind(order.updated_at())
            .bind(Json(order))
            .execute(&mut *self.tx).await
            .map_err(order_violation)?;
        if result.rows_affected() == 0 {
            return Err(EcommerceError::not_found("Order", order.order_id()));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn product_for_update(&mut self, product_id: &ProductCode) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1 FOR UPDATE"))
            .bind(product_id.as_str())
            .fetch_optional(&mut *self.tx).await?
            .map(ProductRow::into_product)
            .transpose()
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, product_id, name, category, details, price, stock_quantity, in_stock, low_stock_threshold, \
             images, colour_options, reviews, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(product.id)
        .bind(product.product_id.as_str())
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.details)
        .bind(product.price.minor())
        .bind(signed(product.stock().value(), "stockQuantity")?)
        .bind(product.in_stock())
        .bind(signed(product.low_stock_threshold, "lowStockThreshold")?)
        .bind(Json(&product.images))
        .bind(&product.colour_options)
        .bind(Json(&product.reviews))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx).await
        .map_err(|e| unique_violation(e, "Product already exists"))?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET name = $2, category = $3, details = $4, price = $5, stock_quantity = $6, in_stock = $7, \
             low_stock_threshold = $8, images = $9, colour_options = $10, reviews = $11, updated_at = $12 \
             WHERE product_id = $1",
        )
        .bind(product.product_id.as_str())
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.details)
        .bind(product.price.minor())
        .bind(signed(product.stock().value(), "stockQuantity")?)
        .bind(product.in_stock())
        .bind(signed(product.low_stock_threshold, "lowStockThreshold")?)
        .bind(Json(&product.images))
        .bind(&product.colour_options)
        .bind(Json(&product.reviews))
        .bind(product.updated_at)
        .execute(&mut *self.tx).await?;
        if result.rows_affected() == 0 {
            return Err(EcommerceError::ProductNotFound(product.product_id.clone()));
        }
        Ok(())
    }

    async fn cart_for_update(&mut self, principal_id: Uuid) -> Result<Option<Cart>> {
        let header: Option<(DateTime<Utc>,)> = sqlx::query_as("SELECT updated_at FROM carts WHERE principal_id = $1 FOR UPDATE")
            .bind(principal_id).fetch_optional(&mut *self.tx).await?;
        let Some((updated_at,)) = header else { return Ok(None) };
        let items: Vec<(String, i32)> = sqlx::query_as("SELECT product_id, quantity FROM cart_items WHERE principal_id = $1 ORDER BY position")
            .bind(principal_id).fetch_all(&mut *self.tx).await?;
        Ok(Some(Cart::restore(principal_id, cart_items(items)?, updated_at)))
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        sqlx::query("INSERT INTO carts (principal_id, updated_at) VALUES ($1, $2) ON CONFLICT (principal_id) DO UPDATE SET updated_at = EXCLUDED.updated_at")
            .bind(cart.principal_id()).bind(cart.updated_at())
            .execute(&mut *self.tx).await?;
        sqlx::query("DELETE FROM cart_items WHERE principal_id = $1")
            .bind(cart.principal_id())
            .execute(&mut *self.tx).await?;
        for (position, item) in cart.items().iter().enumerate() {
            sqlx::query("INSERT INTO cart_items (principal_id, product_id, quantity, position) VALUES ($1, $2, $3, $4)")
                .bind(cart.principal_id())
                .bind(item.product_id.as_str())
                .bind(signed(item.quantity, "quantity")?)
                .bind(position as i32)
                .execute(&mut *self.tx).await?;
        }
        Ok(())
    }

    async fn zone(&mut self, pincode: &Pincode) -> Result<Option<DeliveryZone>> {
        sqlx::query_as::<_, ZoneRow>(&format!("SELECT {ZONE_COLUMNS} FROM delivery_zones WHERE pincode = $1"))
            .bind(pincode.as_str())
            .fetch_optional(&mut *self.tx).await?
            .map(ZoneRow::into_zone)
            .transpose()
    }

    async fn insert_zone(&mut self, zone: &DeliveryZone) -> Result<()> {
        sqlx::query(
            "INSERT INTO delivery_zones (id, pincode, area, city, state, cod_available, delivery_charge, estimated_delivery_days, \
             active, added_by, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(zone.id)
        .bind(zone.pincode.as_str())
        .bind(&zone.area)
        .bind(&zone.city)
        .bind(&zone.state)
        .bind(zone.cod_available)
        .bind(zone.delivery_charge.minor())
        .bind(signed(zone.estimated_delivery_days, "estimatedDeliveryDays")?)
        .bind(zone.active)
        .bind(zone.added_by)
        .bind(zone.created_at)
        .bind(zone.updated_at)
        .execute(&mut *self.tx).await
        .map_err(|e| unique_violation(e, "Pincode already exists"))?;
        Ok(())
    }

    async fn update_zone(&mut self, zone: &DeliveryZone) -> Result<()> {
        sqlx::query(
            "UPDATE delivery_zones SET area = $2, city = $3, state = $4, cod_available = $5, delivery_charge = $6, \
             estimated_delivery_days = $7, active = $8, updated_at = $9 WHERE pincode = $1",
        )
        .bind(zone.pincode.as_str())
        .bind(&zone.area)
        .bind(&zone.city)
        .bind(&zone.state)
        .bind(zone.cod_available)
        .bind(zone.delivery_charge.minor())
        .bind(signed(zone.estimated_delivery_days, "estimatedDeliveryDays")?)
        .bind(zone.active)
        .bind(zone.updated_at)
        .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn order_for_update(&mut self, key: &OrderKey) -> Result<Option<Order>> {
        let (column, value) = match key {
            OrderKey::Code(code) => ("order_id", code.as_str()),
            OrderKey::GatewayPaymentId(id) => ("gateway_payment_id", id.as_str()),
            OrderKey::GatewayOrderId(id) => ("gateway_order_id", id.as_str()),
        };
        let row: Option<(Json<Order>,)> = sqlx::query_as(&format!("SELECT document FROM orders WHERE {column} = $1 LIMIT 1 FOR UPDATE"))
            .bind(value).fetch_optional(&mut *self.tx).await?;
        Ok(row.map(|(doc,)| doc.0))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> { self.write_order(order, true).await }

    async fn update_order(&mut self, order: &Order) -> Result<()> { self.write_order(order, false).await }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ord"), "%ord%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_unsigned_never_wraps() {
        assert_eq!(unsigned(-3), 0);
        assert_eq!(unsigned(7), 7);
        assert!(signed(u32::MAX, "quantity").is_err());
    }
}
