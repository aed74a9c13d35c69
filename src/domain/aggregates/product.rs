//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, ProductCode, Quantity};
use crate::domain::events::{DomainEvent, ProductEvent};

/// Catalog product. `stock_quantity` is the authoritative available-to-sell
/// count; `in_stock` is derived from it on every mutation and never set on its own.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub product_id: ProductCode,
    pub name: String,
    pub category: String,
    pub details: Option<String>,
    pub price: Money,
    stock_quantity: Quantity,
    in_stock: bool,
    pub low_stock_threshold: u32,
    pub images: Vec<ProductImage>,
    pub colour_options: Vec<String>,
    pub reviews: Vec<Review>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Image already placed in object storage; `handle` is what deletes it later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage { pub url: String, pub handle: String }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review { pub author: String, pub rating: u8, pub comment: String, pub created_at: DateTime<Utc> }

/// Admin stock correction, outside of order reservations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StockAdjustment { Set(u32), Add(u32), Subtract(u32) }

pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 5;

impl Product {
    pub fn create(product_id: ProductCode, name: impl Into<String>, category: impl Into<String>, price: Money, stock: Quantity) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), product_id, name: name.into(), category: category.into(), details: None,
            price, stock_quantity: stock, in_stock: !stock.is_zero(), low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            images: vec![], colour_options: vec![], reviews: vec![], created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn stock(&self) -> Quantity { self.stock_quantity }
    pub fn in_stock(&self) -> bool { self.in_stock }
    pub fn is_low_stock(&self) -> bool { self.stock_quantity.value() <= self.low_stock_threshold }
    pub fn default_colour(&self) -> Option<&str> { self.colour_options.first().map(String::as_str) }

    /// Claims `qty` units for an order. Leaves the product untouched on failure.
    pub fn reserve(&mut self, qty: u32) -> Result<(), ProductError> {
        let available = self.stock_quantity.value();
        let was_low = self.is_low_stock();
        self.stock_quantity = self.stock_quantity.subtract(qty).ok_or(ProductError::InsufficientStock { available, requested: qty })?;
        self.stock_changed();
        self.raise_event(DomainEvent::Product(ProductEvent::StockReserved {
            product_id: self.product_id.clone(), quantity: qty, remaining: self.stock_quantity.value(),
        }));
        if !was_low && self.is_low_stock() {
            self.raise_event(DomainEvent::Product(ProductEvent::LowStock {
                product_id: self.product_id.clone(), remaining: self.stock_quantity.value(), threshold: self.low_stock_threshold,
            }));
        }
        Ok(())
    }

    /// Returns `qty` units to the sellable pool.
    pub fn release(&mut self, qty: u32) {
        self.stock_quantity = self.stock_quantity.add(qty);
        self.stock_changed();
        self.raise_event(DomainEvent::Product(ProductEvent::StockReleased {
            product_id: self.product_id.clone(), quantity: qty, remaining: self.stock_quantity.value(),
        }));
    }

    /// Applies an admin correction and returns `(previous, current)`.
    pub fn adjust_stock(&mut self, adjustment: StockAdjustment) -> (u32, u32) {
        let previous = self.stock_quantity.value();
        self.stock_quantity = match adjustment {
            StockAdjustment::Set(n) => Quantity::new(n),
            StockAdjustment::Add(n) => self.stock_quantity.add(n),
            StockAdjustment::Subtract(n) => Quantity::new(previous.saturating_sub(n)),
        };
        self.stock_changed();
        let current = self.stock_quantity.value();
        self.raise_event(DomainEvent::Product(ProductEvent::StockAdjusted { product_id: self.product_id.clone(), previous, current }));
        (previous, current)
    }

    pub fn add_review(&mut self, author: impl Into<String>, rating: u8, comment: impl Into<String>) -> Result<Review, ProductError> {
        if !(1..=5).contains(&rating) { return Err(ProductError::InvalidRating(rating)); }
        let review = Review { author: author.into(), rating, comment: comment.into().trim().to_string(), created_at: Utc::now() };
        self.reviews.push(review.clone());
        self.touch();
        Ok(review)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn stock_changed(&mut self) { self.in_stock = !self.stock_quantity.is_zero(); self.touch(); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { InsufficientStock { available: u32, requested: u32 }, InvalidRating(u8) }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientStock { available, requested } => write!(f, "Insufficient stock: available {available}, requested {requested}"),
            Self::InvalidRating(r) => write!(f, "Rating {r} outside 1-5"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lamp(stock: u32) -> Product {
        Product::create(ProductCode::new("P1").unwrap(), "Desk Lamp", "Lighting", Money::from_major(500), Quantity::new(stock))
    }

    #[test]
    fn test_reserve_decrements_and_derives_flag() {
        let mut p = lamp(2);
        p.reserve(2).unwrap();
        assert_eq!(p.stock().value(), 0);
        assert!(!p.in_stock());
    }

    #[test]
    fn test_reserve_insufficient_leaves_stock() {
        let mut p = lamp(1);
        assert_eq!(p.reserve(2), Err(ProductError::InsufficientStock { available: 1, requested: 2 }));
        assert_eq!(p.stock().value(), 1);
        assert!(p.take_events().is_empty());
    }

    #[test]
    fn test_release_recomputes_flag_from_quantity() {
        let mut p = lamp(0);
        p.release(0);
        assert!(!p.in_stock());
        p.release(3);
        assert!(p.in_stock());
        assert_eq!(p.stock().value(), 3);
    }

    #[test]
    fn test_low_stock_event_on_crossing_threshold() {
        let mut p = lamp(7);
        p.reserve(1).unwrap();
        p.reserve(1).unwrap();
        let low: Vec<_> = p.take_events().into_iter()
            .filter(|e| matches!(e, DomainEvent::Product(ProductEvent::LowStock { .. })))
            .collect();
        assert_eq!(low.len(), 1);
    }

    #[test]
    fn test_adjust_stock_subtract_clamps() {
        let mut p = lamp(3);
        assert_eq!(p.adjust_stock(StockAdjustment::Subtract(10)), (3, 0));
        assert!(!p.in_stock());
        assert_eq!(p.adjust_stock(StockAdjustment::Set(4)), (0, 4));
        assert_eq!(p.adjust_stock(StockAdjustment::Add(1)), (4, 5));
    }

    #[test]
    fn test_review_rating_bounds() {
        let mut p = lamp(1);
        assert!(p.add_review("asha", 5, " great ").is_ok());
        assert_eq!(p.reviews[0].comment, "great");
        assert_eq!(p.add_review("ravi", 0, "bad").unwrap_err(), ProductError::InvalidRating(0));
    }
}
