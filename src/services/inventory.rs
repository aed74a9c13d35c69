//! Stock reservation.
//!
//! Both operations run inside the caller's unit of work and read every product
//! row for update before writing it. `reserve` is all-or-nothing only because
//! the caller drops the unit of work on error; it never compensates by hand.

use serde::Serialize;

use crate::domain::aggregates::{CartItem, OrderLine, ProductError};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::ProductCode;
use crate::store::UnitOfWork;
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdate {
    pub product_id: ProductCode,
    pub reserved_quantity: u32,
    pub new_available_stock: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRestoration {
    pub product_id: ProductCode,
    pub product_name: String,
    pub restored_quantity: u32,
    pub new_available_stock: u32,
}

/// Stock claimed for one checkout, with the line snapshots taken at the same moment.
#[derive(Debug, Default)]
pub struct Reservation {
    pub lines: Vec<OrderLine>,
    pub updates: Vec<StockUpdate>,
    pub events: Vec<DomainEvent>,
}

#[derive(Debug, Default)]
pub struct Restoration {
    pub restorations: Vec<StockRestoration>,
    pub events: Vec<DomainEvent>,
}

/// Items are processed in the order given; the first shortfall aborts.
pub async fn reserve(uow: &mut dyn UnitOfWork, items: &[CartItem]) -> Result<Reservation> {
    let mut reservation = Reservation::default();
    for item in items {
        let mut product = uow.product_for_update(&item.product_id).await?
            .ok_or_else(|| EcommerceError::ProductNotFound(item.product_id.clone()))?;
        product.reserve(item.quantity).map_err(|e| match e {
            ProductError::InsufficientStock { available, requested } => {
                EcommerceError::InsufficientStock { product_id: item.product_id.clone(), available, requested }
            }
            other => EcommerceError::Validation(other.to_string()),
        })?;
        let line = OrderLine::snapshot(&product, item.quantity)?;
        reservation.events.extend(product.take_events());
        uow.update_product(&product).await?;

        tracing::debug!(product_id = %product.product_id, reserved = item.quantity, remaining = product.stock().value(), "stock reserved");
        reservation.updates.push(StockUpdate {
            product_id: product.product_id.clone(),
            reserved_quantity: item.quantity,
            new_available_stock: product.stock().value(),
        });
        reservation.lines.push(line);
    }
    Ok(reservation)
}

/// Products that no longer exist are skipped.
pub async fn release(uow: &mut dyn UnitOfWork, lines: &[OrderLine]) -> Result<Restoration> {
    let mut restoration = Restoration::default();
    for line in lines {
        let Some(mut product) = uow.product_for_update(&line.product_id).await? else {
            tracing::warn!(product_id = %line.product_id, quantity = line.quantity, "product gone, stock not restored");
            continue;
        };
        product.release(line.quantity);
        restoration.events.extend(product.take_events());
        uow.update_product(&product).await?;

        restoration.restorations.push(StockRestoration {
            product_id: line.product_id.clone(),
            product_name: line.name.clone(),
            restored_quantity: line.quantity,
            new_available_stock: product.stock().value(),
        });
    }
    Ok(restoration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Product;
    use crate::domain::value_objects::{Money, Quantity};
    use crate::store::{MemoryStore, Store};

    fn code(s: &str) -> ProductCode { ProductCode::new(s).unwrap() }

    async fn seeded(stock: &[(&str, u32)]) -> MemoryStore {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        for (id, qty) in stock {
            let p = Product::create(code(id), *id, "General", Money::from_major(100), Quantity::new(*qty));
            uow.insert_product(&p).await.unwrap();
        }
        uow.commit().await.unwrap();
        store
    }

    async fn stock_of(store: &MemoryStore, id: &str) -> u32 {
        store.product(&code(id)).await.unwrap().unwrap().stock().value()
    }

    #[tokio::test]
    async fn test_reserve_all_items() {
        let store = seeded(&[("A", 5), ("B", 2)]).await;
        let mut uow = store.begin().await.unwrap();
        let items = [CartItem { product_id: code("A"), quantity: 2 }, CartItem { product_id: code("B"), quantity: 2 }];
        let r = reserve(uow.as_mut(), &items).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(r.lines.len(), 2);
        assert_eq!(r.updates[1], StockUpdate { product_id: code("B"), reserved_quantity: 2, new_available_stock: 0 });
        assert_eq!(stock_of(&store, "A").await, 3);
        assert!(!store.product(&code("B")).await.unwrap().unwrap().in_stock());
    }

    #[tokio::test]
    async fn test_shortfall_mid_list_leaves_every_row_unchanged() {
        let store = seeded(&[("A", 5), ("B", 1)]).await;
        let items = [CartItem { product_id: code("A"), quantity: 2 }, CartItem { product_id: code("B"), quantity: 2 }];
        let mut uow = store.begin().await.unwrap();
        let err = reserve(uow.as_mut(), &items).await.unwrap_err();
        drop(uow);

        assert!(matches!(err, EcommerceError::InsufficientStock { ref product_id, available: 1, requested: 2 } if product_id == &code("B")));
        assert_eq!(stock_of(&store, "A").await, 5);
        assert_eq!(stock_of(&store, "B").await, 1);
    }

    #[tokio::test]
    async fn test_missing_product() {
        let store = seeded(&[]).await;
        let mut uow = store.begin().await.unwrap();
        let err = reserve(uow.as_mut(), &[CartItem { product_id: code("X"), quantity: 1 }]).await.unwrap_err();
        assert!(matches!(err, EcommerceError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_release_restores_and_skips_missing() {
        let store = seeded(&[("A", 0)]).await;
        let a = store.product(&code("A")).await.unwrap().unwrap();
        let ghost = Product::create(code("GONE"), "Gone", "General", Money::from_major(1), Quantity::new(0));
        let lines = [OrderLine::snapshot(&a, 3).unwrap(), OrderLine::snapshot(&ghost, 1).unwrap()];

        let mut uow = store.begin().await.unwrap();
        let r = release(uow.as_mut(), &lines).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(r.restorations.len(), 1);
        assert_eq!(r.restorations[0].new_available_stock, 3);
        assert!(store.product(&code("A")).await.unwrap().unwrap().in_stock());
    }
}
