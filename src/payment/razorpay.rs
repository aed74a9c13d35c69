//! Razorpay REST client (no SDK dependency)

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::value_objects::Money;
use crate::payment::{self, PaymentGateway, PaymentIntent, PaymentProof, WebhookEvent};
use crate::{EcommerceError, Result};

const API_BASE: &str = "https://api.razorpay.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Holds the gateway credentials; intentionally not `Debug`.
pub struct RazorpayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
}

impl RazorpayClient {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: API_BASE.to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

async fn read_intent(response: reqwest::Result<reqwest::Response>, action: &str) -> Result<PaymentIntent> {
    let response = response.map_err(|e| EcommerceError::GatewayUnavailable(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%status, body = %body, action, "gateway rejected request");
        return Err(EcommerceError::GatewayUnavailable(format!("gateway returned {status}")));
    }
    response.json::<PaymentIntent>().await.map_err(|e| EcommerceError::GatewayUnavailable(e.to_string()))
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> &str { &self.key_id }

    async fn create_intent(&self, amount: Money, currency: &str, receipt: &str) -> Result<PaymentIntent> {
        let response = self.http
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "amount": amount.minor(), "currency": currency, "receipt": receipt, "payment_capture": 1 }))
            .send()
            .await;
        read_intent(response, "order creation").await
    }

    async fn fetch_intent(&self, gateway_order_id: &str) -> Result<PaymentIntent> {
        let response = self.http
            .get(format!("{}/orders/{}", self.base_url, gateway_order_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;
        read_intent(response, "order lookup").await
    }

    fn verify_payment(&self, proof: &PaymentProof) -> Result<()> {
        payment::verify_payment_signature(&proof.gateway_order_id, &proof.gateway_payment_id, &proof.signature, &self.key_secret)
    }

    fn parse_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<WebhookEvent> {
        payment::parse_webhook(raw_body, signature, &self.webhook_secret)
    }
}
