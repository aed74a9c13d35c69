//! Catalog use cases: product creation and lookup, availability checks,
//! admin stock corrections and reviews.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::domain::aggregates::{Product, ProductError, ProductImage, Review, StockAdjustment};
use crate::domain::aggregates::product::DEFAULT_LOW_STOCK_THRESHOLD;
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Money, ProductCode, Quantity};
use crate::publisher::EventPublisher;
use crate::services::{bounded, DEFAULT_TX_TIMEOUT};
use crate::store::{ProductFilter, Store};
use crate::{EcommerceError, Result};

#[derive(Clone, Debug)]
pub struct NewProduct {
    /// Generated when absent.
    pub product_id: Option<ProductCode>,
    pub name: String,
    pub category: String,
    pub details: Option<String>,
    pub price: Money,
    pub stock_quantity: u32,
    pub low_stock_threshold: Option<u32>,
    pub images: Vec<ProductImage>,
    pub colour_options: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
    pub requested_quantity: u32,
    pub available_stock: u32,
    pub product_name: String,
    pub max_quantity: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
    pub product: Product,
    pub previous_stock: u32,
    pub new_stock: u32,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    publisher: EventPublisher,
    tx_timeout: Duration,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, publisher: EventPublisher) -> Self {
        Self { store, publisher, tx_timeout: DEFAULT_TX_TIMEOUT }
    }

    pub fn with_tx_timeout(mut self, tx_timeout: Duration) -> Self { self.tx_timeout = tx_timeout; self }

    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        if input.name.trim().is_empty() { return Err(EcommerceError::Validation("productName is required".into())); }
        if input.category.trim().is_empty() { return Err(EcommerceError::Validation("productCategory is required".into())); }

        let code = input.product_id.unwrap_or_else(ProductCode::generate);
        let mut product = Product::create(code, input.name.trim(), input.category.trim(), input.price, Quantity::new(input.stock_quantity));
        product.details = input.details;
        product.low_stock_threshold = input.low_stock_threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
        product.images = input.images;
        product.colour_options = input.colour_options;

        bounded(self.tx_timeout, async {
            let mut uow = self.store.begin().await?;
            uow.insert_product(&product).await?;
            uow.commit().await
        })
        .await?;
        tracing::info!(product_id = %product.product_id, stock = input.stock_quantity, "product created");
        Ok(product)
    }

    pub async fn product(&self, product_id: &ProductCode) -> Result<Product> {
        self.store.product(product_id).await?.ok_or_else(|| EcommerceError::not_found("Product", product_id))
    }

    pub async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>> { self.store.products(filter).await }

    pub async fn availability(&self, product_id: &ProductCode, requested: u32) -> Result<Availability> {
        let product = self.product(product_id).await?;
        let stock = product.stock().value();
        Ok(Availability { available: stock >= requested, requested_quantity: requested, available_stock: stock, product_name: product.name, max_quantity: stock })
    }

    pub async fn low_stock(&self) -> Result<Vec<Product>> { self.store.low_stock_products().await }

    /// Admin correction outside of order reservations.
    pub async fn adjust_stock(&self, product_id: &ProductCode, adjustment: StockAdjustment) -> Result<StockChange> {
        let (change, events) = bounded(self.tx_timeout, self.adjust_in_tx(product_id, adjustment)).await?;
        tracing::info!(product_id = %product_id, previous = change.previous_stock, current = change.new_stock, ?adjustment, "stock adjusted");
        self.publisher.publish_all(events).await;
        Ok(change)
    }

    async fn adjust_in_tx(&self, product_id: &ProductCode, adjustment: StockAdjustment) -> Result<(StockChange, Vec<DomainEvent>)> {
        let mut uow = self.store.begin().await?;
        let mut product = uow.product_for_update(product_id).await?.ok_or_else(|| EcommerceError::not_found("Product", product_id))?;
        let (previous_stock, new_stock) = product.adjust_stock(adjustment);
        let events = product.take_events();
        uow.update_product(&product).await?;
        uow.commit().await?;
        Ok((StockChange { product, previous_stock, new_stock }, events))
    }

    pub async fn add_review(&self, product_id: &ProductCode, author: &str, rating: u8, comment: &str) -> Result<Review> {
        bounded(self.tx_timeout, self.review_in_tx(product_id, author, rating, comment)).await
    }

    async fn review_in_tx(&self, product_id: &ProductCode, author: &str, rating: u8, comment: &str) -> Result<Review> {
        let mut uow = self.store.begin().await?;
        let mut product = uow.product_for_update(product_id).await?.ok_or_else(|| EcommerceError::not_found("Product", product_id))?;
        let review = product.add_review(author, rating, comment).map_err(|e| match e {
            ProductError::InvalidRating(_) => EcommerceError::Validation(e.to_string()),
            other => EcommerceError::Conflict(other.to_string()),
        })?;
        uow.update_product(&product).await?;
        uow.commit().await?;
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> CatalogService { CatalogService::new(Arc::new(MemoryStore::new()), EventPublisher::logging_only()) }

    fn lamp(stock: u32) -> NewProduct {
        NewProduct {
            product_id: Some(ProductCode::new("P1").unwrap()), name: " Desk Lamp ".into(), category: "Lighting".into(), details: None,
            price: Money::from_major(500), stock_quantity: stock, low_stock_threshold: None,
            images: vec![ProductImage { url: "https://cdn.example/lamp.jpg".into(), handle: "lamp".into() }], colour_options: vec!["black".into()],
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let svc = service();
        let created = svc.create_product(lamp(3)).await.unwrap();
        assert_eq!(created.name, "Desk Lamp");
        assert_eq!(created.low_stock_threshold, DEFAULT_LOW_STOCK_THRESHOLD);
        let fetched = svc.product(&created.product_id).await.unwrap();
        assert_eq!(fetched.images.len(), 1);
        assert!(matches!(svc.create_product(lamp(1)).await, Err(EcommerceError::Conflict(_))));
        assert!(matches!(svc.product(&ProductCode::new("NOPE").unwrap()).await, Err(EcommerceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_generated_code_and_validation() {
        let svc = service();
        let created = svc.create_product(NewProduct { product_id: None, ..lamp(1) }).await.unwrap();
        assert!(created.product_id.as_str().starts_with("PROD-"));
        let blank = NewProduct { name: "  ".into(), product_id: None, ..lamp(1) };
        assert!(matches!(svc.create_product(blank).await, Err(EcommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_availability_and_filters() {
        let svc = service();
        svc.create_product(lamp(3)).await.unwrap();
        let p1 = ProductCode::new("P1").unwrap();
        let a = svc.availability(&p1, 4).await.unwrap();
        assert!(!a.available);
        assert_eq!(a.max_quantity, 3);

        let cheap = ProductFilter { max_price: Some(Money::from_major(100)), ..Default::default() };
        assert!(svc.list(&cheap).await.unwrap().is_empty());
        let lighting = ProductFilter { category: Some("light".into()), in_stock: Some(true), ..Default::default() };
        assert_eq!(svc.list(&lighting).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_adjust_stock_and_low_stock_report() {
        let svc = service();
        svc.create_product(lamp(20)).await.unwrap();
        let p1 = ProductCode::new("P1").unwrap();
        assert!(svc.low_stock().await.unwrap().is_empty());

        let change = svc.adjust_stock(&p1, StockAdjustment::Subtract(18)).await.unwrap();
        assert_eq!((change.previous_stock, change.new_stock), (20, 2));
        assert_eq!(svc.low_stock().await.unwrap().len(), 1);

        let change = svc.adjust_stock(&p1, StockAdjustment::Subtract(5)).await.unwrap();
        assert_eq!(change.new_stock, 0);
        assert!(!svc.product(&p1).await.unwrap().in_stock());
    }

    #[tokio::test]
    async fn test_review() {
        let svc = service();
        svc.create_product(lamp(1)).await.unwrap();
        let p1 = ProductCode::new("P1").unwrap();
        let review = svc.add_review(&p1, "Asha", 4, "Bright").await.unwrap();
        assert_eq!(review.rating, 4);
        assert_eq!(svc.product(&p1).await.unwrap().reviews.len(), 1);
        assert!(matches!(svc.add_review(&p1, "Asha", 6, "x").await, Err(EcommerceError::Validation(_))));
    }
}
