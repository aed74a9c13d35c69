//! Delivery-zone directory: admin maintenance plus the public lookup that
//! checkout pricing and the COD check read.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::aggregates::delivery_zone::DEFAULT_DELIVERY_DAYS;
use crate::domain::aggregates::DeliveryZone;
use crate::domain::value_objects::{Money, Pincode};
use crate::services::{bounded, DEFAULT_TX_TIMEOUT};
use crate::store::Store;
use crate::{EcommerceError, Result};

#[derive(Clone, Debug)]
pub struct NewZone {
    pub pincode: Pincode,
    pub area: String,
    pub city: String,
    pub state: String,
    pub cod_available: Option<bool>,
    pub delivery_charge: Option<Money>,
    pub estimated_delivery_days: Option<u32>,
}

#[derive(Clone)]
pub struct ZoneService {
    store: Arc<dyn Store>,
    tx_timeout: Duration,
}

impl ZoneService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store, tx_timeout: DEFAULT_TX_TIMEOUT } }

    pub fn with_tx_timeout(mut self, tx_timeout: Duration) -> Self { self.tx_timeout = tx_timeout; self }

    /// Rejects a code that already exists, including deactivated ones.
    pub async fn add(&self, input: NewZone, added_by: Uuid) -> Result<DeliveryZone> {
        for (field, value) in [("area", &input.area), ("city", &input.city), ("state", &input.state)] {
            if value.trim().is_empty() { return Err(EcommerceError::Validation(format!("{field} is required"))); }
        }
        let mut zone = DeliveryZone::create(input.pincode, &input.area, &input.city, &input.state, added_by);
        zone.cod_available = input.cod_available.unwrap_or(true);
        zone.delivery_charge = input.delivery_charge.unwrap_or(Money::ZERO);
        zone.estimated_delivery_days = input.estimated_delivery_days.unwrap_or(DEFAULT_DELIVERY_DAYS);

        bounded(self.tx_timeout, async {
            let mut uow = self.store.begin().await?;
            if uow.zone(&zone.pincode).await?.is_some() {
                return Err(EcommerceError::Conflict("Pincode already exists".into()));
            }
            uow.insert_zone(&zone).await?;
            uow.commit().await
        })
        .await?;
        tracing::info!(pincode = %zone.pincode, city = %zone.city, admin = %added_by, "delivery zone added");
        Ok(zone)
    }

    pub async fn deactivate(&self, pincode: &Pincode) -> Result<DeliveryZone> {
        let zone = bounded(self.tx_timeout, async {
            let mut uow = self.store.begin().await?;
            let mut zone = uow.zone(pincode).await?.ok_or_else(|| EcommerceError::not_found("Pincode", pincode))?;
            zone.deactivate();
            uow.update_zone(&zone).await?;
            uow.commit().await?;
            Ok(zone)
        })
        .await?;
        tracing::info!(pincode = %pincode, "delivery zone deactivated");
        Ok(zone)
    }

    /// Active zones only.
    pub async fn check(&self, pincode: &Pincode) -> Result<Option<DeliveryZone>> { self.store.active_zone(pincode).await }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn pin(s: &str) -> Pincode { Pincode::new(s).unwrap() }

    fn zone(code: &str) -> NewZone {
        NewZone {
            pincode: pin(code), area: "Koramangala".into(), city: "Bengaluru".into(), state: "Karnataka".into(),
            cod_available: None, delivery_charge: Some(Money::from_major(150)), estimated_delivery_days: None,
        }
    }

    #[tokio::test]
    async fn test_add_and_check() {
        let svc = ZoneService::new(Arc::new(MemoryStore::new()));
        let added = svc.add(zone("560034"), Uuid::new_v4()).await.unwrap();
        assert!(added.cod_available);
        assert_eq!(added.estimated_delivery_days, DEFAULT_DELIVERY_DAYS);

        let found = svc.check(&pin("560034")).await.unwrap().unwrap();
        assert_eq!(found.delivery_charge, Money::from_major(150));
        assert!(svc.check(&pin("110001")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deactivated_code_stays_reserved() {
        let svc = ZoneService::new(Arc::new(MemoryStore::new()));
        svc.add(zone("560034"), Uuid::new_v4()).await.unwrap();
        assert!(!svc.deactivate(&pin("560034")).await.unwrap().active);
        assert!(svc.check(&pin("560034")).await.unwrap().is_none());

        let err = svc.add(zone("560034"), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(m) if m == "Pincode already exists"));
        assert!(matches!(svc.deactivate(&pin("110001")).await, Err(EcommerceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_blank_labels_rejected() {
        let svc = ZoneService::new(Arc::new(MemoryStore::new()));
        let blank = NewZone { city: " ".into(), ..zone("560034") };
        assert!(matches!(svc.add(blank, Uuid::new_v4()).await, Err(EcommerceError::Validation(_))));
    }
}
