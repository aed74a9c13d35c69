//! Delivery zone (pincode) record

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use crate::domain::value_objects::{Money, Pincode};

pub const DEFAULT_DELIVERY_DAYS: u32 = 3;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryZone {
    pub id: Uuid,
    pub pincode: Pincode,
    pub area: String,
    pub city: String,
    pub state: String,
    pub cod_available: bool,
    pub delivery_charge: Money,
    pub estimated_delivery_days: u32,
    pub active: bool,
    pub added_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryZone {
    pub fn create(pincode: Pincode, area: &str, city: &str, state: &str, added_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), pincode, area: area.trim().to_string(), city: city.trim().to_string(), state: state.trim().to_string(),
            cod_available: true, delivery_charge: Money::ZERO, estimated_delivery_days: DEFAULT_DELIVERY_DAYS,
            active: true, added_by, created_at: now, updated_at: now,
        }
    }

    /// Extra delivery charge for this destination, if it currently delivers.
    pub fn surcharge(&self) -> Option<Money> { self.active.then_some(self.delivery_charge) }

    pub fn deactivate(&mut self) { self.active = false; self.updated_at = Utc::now(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_zone_has_no_surcharge() {
        let mut zone = DeliveryZone::create(Pincode::new("400001").unwrap(), " Fort ", "Mumbai", "MH", Uuid::new_v4());
        zone.delivery_charge = Money::from_major(150);
        assert_eq!(zone.area, "Fort");
        assert_eq!(zone.surcharge(), Some(Money::from_major(150)));
        zone.deactivate();
        assert_eq!(zone.surcharge(), None);
    }
}
