//! Order pricing. Pure: the caller looks up the destination surcharge.

use crate::domain::aggregates::{OrderLine, OrderSummary};
use crate::domain::value_objects::{AmountOverflow, Money};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tax_rate_bps: u32,
    /// Shipping is free strictly above this subtotal.
    pub free_shipping_above: Money,
    pub flat_shipping_fee: Money,
    pub currency: String,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 800,
            free_shipping_above: Money::from_major(750),
            flat_shipping_fee: Money::from_major(99),
            currency: "INR".into(),
        }
    }
}

impl PricingPolicy {
    /// A destination surcharge can raise shipping but never lower it.
    pub fn shipping(&self, subtotal: Money, zone_surcharge: Option<Money>) -> Money {
        let base = if subtotal > self.free_shipping_above { Money::ZERO } else { self.flat_shipping_fee };
        zone_surcharge.map_or(base, |surcharge| base.max(surcharge))
    }

    /// Fails instead of wrapping when an amount leaves the representable range.
    pub fn quote(&self, lines: &[OrderLine], zone_surcharge: Option<Money>) -> Result<OrderSummary, AmountOverflow> {
        let subtotal = lines.iter().try_fold(Money::ZERO, |acc, l| acc.checked_add(l.unit_price.times(l.quantity)?))?;
        let tax = subtotal.basis_points(self.tax_rate_bps)?;
        OrderSummary::compose(subtotal, tax, self.shipping(subtotal, zone_surcharge), &self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Product;
    use crate::domain::value_objects::{ProductCode, Quantity};

    fn line(price: Money, qty: u32) -> OrderLine {
        let p = Product::create(ProductCode::new("P1").unwrap(), "Lamp", "Lighting", price, Quantity::new(10));
        OrderLine::snapshot(&p, qty).unwrap()
    }

    #[test]
    fn test_quote_scenario() {
        let s = PricingPolicy::default().quote(&[line(Money::from_major(500), 2)], None).unwrap();
        assert_eq!(s.subtotal(), Money::from_major(1000));
        assert_eq!(s.tax(), Money::from_major(80));
        assert_eq!(s.shipping(), Money::ZERO);
        assert_eq!(s.total(), Money::from_major(1080));
        assert_eq!(s.currency(), "INR");
    }

    #[test]
    fn test_free_shipping_threshold_is_exclusive() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.shipping(Money::from_major(750), None), Money::from_major(99));
        assert_eq!(policy.shipping(Money::from_minor(75_001), None), Money::ZERO);
    }

    #[test]
    fn test_zone_surcharge_only_raises_shipping() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.shipping(Money::from_major(750), Some(Money::from_major(150))), Money::from_major(150));
        assert_eq!(policy.shipping(Money::from_major(750), Some(Money::from_major(40))), Money::from_major(99));
        assert_eq!(policy.shipping(Money::from_major(2000), Some(Money::from_major(150))), Money::from_major(150));
    }

    #[test]
    fn test_total_is_sum_of_parts() {
        let lines = [line(Money::from_minor(33_333), 3), line(Money::from_minor(1_999), 7)];
        let s = PricingPolicy::default().quote(&lines, Some(Money::from_minor(12_345))).unwrap();
        assert_eq!(s.subtotal(), Money::from_minor(33_333 * 3 + 1_999 * 7));
        assert_eq!(s.total(), s.subtotal() + s.tax() + s.shipping());
    }

    #[test]
    fn test_quote_overflow_is_rejected() {
        let lines = [line(Money::from_minor(i64::MAX / 2), 1), line(Money::from_minor(i64::MAX / 2), 1), line(Money::from_minor(2), 1)];
        assert_eq!(PricingPolicy::default().quote(&lines, None), Err(AmountOverflow));
    }
}
