//! Service configuration, read from the environment.

use std::time::Duration;

use anyhow::{bail, Context};
use rust_decimal::Decimal;

use crate::domain::value_objects::Money;
use crate::services::pricing::PricingPolicy;

/// Holds secrets; no `Debug` impl.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL (`USER_DB_URI`, falling back to `DATABASE_URL`)
    pub database_url: String,
    pub port: u16,
    /// development | staging | production
    pub environment: String,
    /// HS256 key for session tokens
    pub secret_key: String,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_webhook_secret: String,
    /// Empty means permissive CORS.
    pub allowed_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    /// Upper bound for any single transactional operation.
    pub tx_timeout: Duration,
    pub nats_url: Option<String>,
    pub pricing: PricingPolicy,
}

impl Config {
    /// Secrets must be set and non-empty outside development.
    fn require_secret(name: &str, environment: &str) -> anyhow::Result<String> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    bail!("{name} must be set in {environment} environment");
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            bail!("{name} must not be empty in {environment} environment");
        }
        Ok(val)
    }

    fn parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
        match std::env::var(name) {
            Ok(v) if !v.trim().is_empty() => v.trim().parse().ok().with_context(|| format!("{name} is not a valid value: {v}")),
            _ => Ok(default),
        }
    }

    fn amount(name: &str, default: Money) -> anyhow::Result<Money> {
        let raw = Self::parsed::<Decimal>(name, default.to_decimal())?;
        Money::from_decimal(raw).with_context(|| format!("{name} must be a non-negative amount"))
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let database_url = std::env::var("USER_DB_URI")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .context("USER_DB_URI or DATABASE_URL must be set")?;
        let defaults = PricingPolicy::default();

        Ok(Self {
            database_url,
            port: Self::parsed("PORT", 8010)?,
            secret_key: Self::require_secret("SECRET_KEY", &environment)?,
            razorpay_key_id: Self::require_secret("RAZORPAY_KEY_ID", &environment)?,
            razorpay_key_secret: Self::require_secret("RAZORPAY_KEY_SECRET", &environment)?,
            razorpay_webhook_secret: Self::require_secret("RAZORPAY_WEBHOOK_SECRET", &environment)?,
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect())
                .unwrap_or_default(),
            db_max_connections: Self::parsed("DB_MAX_CONNECTIONS", 10)?,
            db_acquire_timeout: Duration::from_secs(Self::parsed("DB_ACQUIRE_TIMEOUT_SECS", 5)?),
            tx_timeout: Duration::from_secs(Self::parsed("TX_TIMEOUT_SECS", 10)?),
            nats_url: std::env::var("NATS_URL").ok().filter(|s| !s.is_empty()),
            pricing: PricingPolicy {
                tax_rate_bps: Self::parsed("TAX_RATE_BPS", defaults.tax_rate_bps)?,
                free_shipping_above: Self::amount("FREE_SHIPPING_ABOVE", defaults.free_shipping_above)?,
                flat_shipping_fee: Self::amount("FLAT_SHIPPING_FEE", defaults.flat_shipping_fee)?,
                currency: std::env::var("CURRENCY").unwrap_or(defaults.currency),
            },
            environment,
        })
    }

    pub fn is_production(&self) -> bool { self.environment == "production" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_and_amount() {
        std::env::set_var("STOREFRONT_TEST_PORT", " 9001 ");
        assert_eq!(Config::parsed("STOREFRONT_TEST_PORT", 8010u16).unwrap(), 9001);
        assert_eq!(Config::parsed("STOREFRONT_TEST_UNSET", 8010u16).unwrap(), 8010);
        std::env::set_var("STOREFRONT_TEST_BAD", "eighty");
        assert!(Config::parsed("STOREFRONT_TEST_BAD", 1u32).is_err());

        std::env::set_var("STOREFRONT_TEST_FEE", "49.5");
        assert_eq!(Config::amount("STOREFRONT_TEST_FEE", Money::ZERO).unwrap(), Money::from_minor(4950));
        std::env::set_var("STOREFRONT_TEST_NEG", "-1");
        assert!(Config::amount("STOREFRONT_TEST_NEG", Money::ZERO).is_err());
    }

    #[test]
    fn test_placeholder_secret_only_in_development() {
        assert_eq!(Config::require_secret("STOREFRONT_TEST_SECRET", "development").unwrap(), "dev-STOREFRONT_TEST_SECRET-not-for-production");
        assert!(Config::require_secret("STOREFRONT_TEST_SECRET", "production").is_err());
    }
}
