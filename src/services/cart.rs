//! Cart use cases. Every mutation reads the cart for update and saves it in
//! the same unit of work, so concurrent adds from one principal serialize.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartError, Product};
use crate::domain::value_objects::ProductCode;
use crate::services::{bounded, DEFAULT_TX_TIMEOUT};
use crate::store::Store;
use crate::{EcommerceError, Result};

pub const DEFAULT_ADD_QUANTITY: u32 = 1;

/// Cart line joined with the current product; `None` once the product is gone.
#[derive(Clone, Debug, Serialize)]
pub struct CartLine {
    pub product: Option<Product>,
    pub quantity: u32,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    tx_timeout: Duration,
}

fn cart_error(e: CartError, product_id: &ProductCode) -> EcommerceError {
    match e {
        CartError::ItemNotFound => EcommerceError::not_found("Cart item", product_id),
        CartError::InvalidQuantity => EcommerceError::Validation(e.to_string()),
    }
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store, tx_timeout: DEFAULT_TX_TIMEOUT } }

    pub fn with_tx_timeout(mut self, tx_timeout: Duration) -> Self { self.tx_timeout = tx_timeout; self }

    /// A principal without a stored cart has an empty one.
    pub async fn cart(&self, principal_id: Uuid) -> Result<Cart> {
        Ok(self.store.cart(principal_id).await?.unwrap_or_else(|| Cart::for_principal(principal_id)))
    }

    pub async fn lines(&self, cart: &Cart) -> Result<Vec<CartLine>> {
        let mut lines = Vec::with_capacity(cart.item_count());
        for item in cart.items() {
            lines.push(CartLine { product: self.store.product(&item.product_id).await?, quantity: item.quantity });
        }
        Ok(lines)
    }

    pub async fn add(&self, principal_id: Uuid, product_id: ProductCode, quantity: Option<u32>) -> Result<Cart> {
        if self.store.product(&product_id).await?.is_none() {
            return Err(EcommerceError::ProductNotFound(product_id));
        }
        let quantity = quantity.unwrap_or(DEFAULT_ADD_QUANTITY);
        let cart = self.mutate(principal_id, |cart| {
            cart.add_item(product_id.clone(), quantity).map_err(|e| cart_error(e, &product_id))
        })
        .await?;
        tracing::debug!(principal = %principal_id, product_id = %product_id, quantity, "cart item added");
        Ok(cart)
    }

    pub async fn update_quantity(&self, principal_id: Uuid, product_id: &ProductCode, quantity: u32) -> Result<Cart> {
        self.mutate(principal_id, |cart| cart.update_quantity(product_id, quantity).map_err(|e| cart_error(e, product_id))).await
    }

    pub async fn remove(&self, principal_id: Uuid, product_id: &ProductCode) -> Result<Cart> {
        self.mutate(principal_id, |cart| cart.remove_item(product_id).map_err(|e| cart_error(e, product_id))).await
    }

    pub async fn clear(&self, principal_id: Uuid) -> Result<Cart> {
        self.mutate(principal_id, |cart| {
            cart.clear();
            Ok(())
        })
        .await
    }

    async fn mutate<F>(&self, principal_id: Uuid, change: F) -> Result<Cart>
    where
        F: FnOnce(&mut Cart) -> Result<()> + Send,
    {
        bounded(self.tx_timeout, async move {
            let mut uow = self.store.begin().await?;
            let mut cart = uow.cart_for_update(principal_id).await?.unwrap_or_else(|| Cart::for_principal(principal_id));
            change(&mut cart)?;
            uow.save_cart(&cart).await?;
            uow.commit().await?;
            Ok(cart)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Money, Quantity};
    use crate::store::MemoryStore;

    fn code(s: &str) -> ProductCode { ProductCode::new(s).unwrap() }

    async fn service() -> CartService {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_product(&Product::create(code("P1"), "Lamp", "Lighting", Money::from_major(500), Quantity::new(5))).await.unwrap();
        uow.commit().await.unwrap();
        CartService::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_empty_cart_without_row() {
        let svc = service().await;
        assert!(svc.cart(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_add_increments() {
        let svc = service().await;
        let user = Uuid::new_v4();
        svc.add(user, code("P1"), None).await.unwrap();
        let cart = svc.add(user, code("P1"), Some(2)).await.unwrap();
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.items()[0].quantity, 3);
        let lines = svc.lines(&svc.cart(user).await.unwrap()).await.unwrap();
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].product.as_ref().unwrap().name, "Lamp");
    }

    #[tokio::test]
    async fn test_unknown_product_rejected() {
        let svc = service().await;
        let err = svc.add(Uuid::new_v4(), code("NOPE"), Some(1)).await.unwrap_err();
        assert!(matches!(err, EcommerceError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_remove_clear() {
        let svc = service().await;
        let user = Uuid::new_v4();
        svc.add(user, code("P1"), Some(1)).await.unwrap();

        assert!(matches!(svc.update_quantity(user, &code("P1"), 0).await, Err(EcommerceError::Validation(_))));
        assert_eq!(svc.update_quantity(user, &code("P1"), 4).await.unwrap().items()[0].quantity, 4);
        assert!(matches!(svc.remove(user, &code("P9")).await, Err(EcommerceError::NotFound { entity: "Cart item", .. })));
        assert!(svc.remove(user, &code("P1")).await.unwrap().is_empty());

        svc.add(user, code("P1"), Some(1)).await.unwrap();
        assert!(svc.clear(user).await.unwrap().is_empty());
        assert!(svc.cart(user).await.unwrap().is_empty());
    }
}
