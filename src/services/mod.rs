//! Application services: the use cases behind the HTTP surface.

pub mod cart;
pub mod catalog;
pub mod inventory;
pub mod orders;
pub mod pricing;
pub mod zones;

use std::future::Future;
use std::time::Duration;

use crate::{EcommerceError, Result};

pub use cart::CartService;
pub use catalog::CatalogService;
pub use orders::OrderService;
pub use pricing::PricingPolicy;
pub use zones::ZoneService;

pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounds a transactional operation. On elapse the future is dropped, and with
/// it the open unit of work, which rolls the transaction back.
pub(crate) async fn bounded<T>(limit: Duration, op: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(timeout_ms = limit.as_millis() as u64, "transaction timed out");
            Err(EcommerceError::Persistence("transaction timed out".into()))
        }
    }
}
