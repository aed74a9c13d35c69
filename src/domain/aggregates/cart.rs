//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use crate::domain::value_objects::ProductCode;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 1_000;

/// One cart per principal. Lines are keyed by product; adding a product that
/// is already present increments its quantity.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    principal_id: Uuid,
    items: Vec<CartItem>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductCode,
    pub quantity: u32,
}

impl Cart {
    pub fn for_principal(principal_id: Uuid) -> Self {
        Self { principal_id, items: vec![], updated_at: Utc::now() }
    }

    pub fn restore(principal_id: Uuid, items: Vec<CartItem>, updated_at: DateTime<Utc>) -> Self {
        Self { principal_id, items, updated_at }
    }

    pub fn principal_id(&self) -> Uuid { self.principal_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn add_item(&mut self, product_id: ProductCode, quantity: u32) -> Result<(), CartError> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) { return Err(CartError::InvalidQuantity); }
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            let merged = existing.quantity + quantity;
            if merged > MAX_LINE_QUANTITY { return Err(CartError::InvalidQuantity); }
            existing.quantity = merged;
        } else {
            self.items.push(CartItem { product_id, quantity });
        }
        self.touch();
        Ok(())
    }

    pub fn update_quantity(&mut self, product_id: &ProductCode, quantity: u32) -> Result<(), CartError> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) { return Err(CartError::InvalidQuantity); }
        let item = self.items.iter_mut().find(|i| &i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        item.quantity = quantity;
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &ProductCode) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| &i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, InvalidQuantity }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::ItemNotFound => write!(f, "Cart or item not found"), Self::InvalidQuantity => write!(f, "Quantity must be between 1 and {MAX_LINE_QUANTITY}") }
    }
}
