//! Payment gateway adapter.
//!
//! Three operations: create a remote payment order, verify the checkout
//! signature the client hands back, and authenticate + classify webhook pushes.
//! Every verification fails closed. The adapter never retries.

pub mod razorpay;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::domain::value_objects::Money;
use crate::{EcommerceError, Result};

pub use razorpay::RazorpayClient;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key the checkout widget needs alongside the remote order.
    fn key_id(&self) -> &str;
    async fn create_intent(&self, amount: Money, currency: &str, receipt: &str) -> Result<PaymentIntent>;
    /// The remote order as the gateway currently reports it.
    async fn fetch_intent(&self, gateway_order_id: &str) -> Result<PaymentIntent>;
    fn verify_payment(&self, proof: &PaymentProof) -> Result<()>;
    fn parse_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<WebhookEvent>;
}

/// Remote payment order. `amount` is in minor units, as the gateway reports it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// What the client returns after completing checkout with the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentProof {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentCaptured { payment_id: String, order_id: Option<String>, amount: Money, method: Option<String> },
    PaymentFailed { payment_id: String, order_id: Option<String>, amount: Money },
    OrderPaid { order_id: String, amount: Money },
    /// Authentic but not something orders react to.
    Unhandled(String),
}

/// Constant-time check of a hex HMAC-SHA256 digest.
fn hmac_matches(secret: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else { return false };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Checks `signature` against HMAC-SHA256(`order_id|payment_id`) under the key secret.
pub fn verify_payment_signature(order_id: &str, payment_id: &str, signature: &str, secret: &str) -> Result<()> {
    if order_id.is_empty() || payment_id.is_empty() || signature.is_empty() || secret.is_empty() {
        return Err(EcommerceError::SignatureInvalid);
    }
    let message = format!("{order_id}|{payment_id}");
    if !hmac_matches(secret, message.as_bytes(), signature) {
        return Err(EcommerceError::SignatureInvalid);
    }
    Ok(())
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Deserialize, Default)]
struct Payload {
    payment: Option<Wrapped<PaymentEntity>>,
    order: Option<Wrapped<OrderEntity>>,
}

#[derive(Deserialize)]
struct Wrapped<T> { entity: T }

#[derive(Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    #[serde(default)]
    amount: i64,
    method: Option<String>,
}

#[derive(Deserialize)]
struct OrderEntity {
    id: String,
    #[serde(default)]
    amount_paid: i64,
}

/// Authenticates the exact raw body against the webhook secret before looking
/// at its contents, then classifies it.
pub fn parse_webhook(raw_body: &[u8], signature: Option<&str>, secret: &str) -> Result<WebhookEvent> {
    let authentic = match signature {
        Some(sig) if !secret.is_empty() => hmac_matches(secret, raw_body, sig),
        _ => false,
    };
    if !authentic { return Err(EcommerceError::WebhookSignatureInvalid); }

    let envelope: Envelope = serde_json::from_slice(raw_body)
        .map_err(|e| EcommerceError::Validation(format!("Malformed webhook payload: {e}")))?;
    let missing = |what: &str| EcommerceError::Validation(format!("{} webhook without {what} entity", envelope.event));

    let event = match envelope.event.as_str() {
        "payment.captured" => {
            let p = envelope.payload.payment.as_ref().ok_or_else(|| missing("payment"))?;
            WebhookEvent::PaymentCaptured {
                payment_id: p.entity.id.clone(), order_id: p.entity.order_id.clone(),
                amount: Money::from_minor(p.entity.amount), method: p.entity.method.clone(),
            }
        }
        "payment.failed" => {
            let p = envelope.payload.payment.as_ref().ok_or_else(|| missing("payment"))?;
            WebhookEvent::PaymentFailed {
                payment_id: p.entity.id.clone(), order_id: p.entity.order_id.clone(), amount: Money::from_minor(p.entity.amount),
            }
        }
        "order.paid" => {
            let o = envelope.payload.order.as_ref().ok_or_else(|| missing("order"))?;
            WebhookEvent::OrderPaid { order_id: o.entity.id.clone(), amount: Money::from_minor(o.entity.amount_paid) }
        }
        other => WebhookEvent::Unhandled(other.to_string()),
    };
    Ok(event)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sign(secret: &str, message: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_payment_signature() {
        let sig = sign("key_secret", b"order_1|pay_1");
        assert!(verify_payment_signature("order_1", "pay_1", &sig, "key_secret").is_ok());
        assert!(matches!(verify_payment_signature("order_1", "pay_2", &sig, "key_secret"), Err(EcommerceError::SignatureInvalid)));
        assert!(matches!(verify_payment_signature("order_1", "pay_1", "zz-not-hex", "key_secret"), Err(EcommerceError::SignatureInvalid)));
        assert!(matches!(verify_payment_signature("order_1", "", &sig, "key_secret"), Err(EcommerceError::SignatureInvalid)));
    }

    #[test]
    fn test_webhook_classification() {
        let body = br#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","order_id":"order_1","amount":108000,"method":"upi"}}}}"#;
        let event = parse_webhook(body, Some(&sign("whsec", body)), "whsec").unwrap();
        assert_eq!(event, WebhookEvent::PaymentCaptured {
            payment_id: "pay_1".into(), order_id: Some("order_1".into()), amount: Money::from_major(1080), method: Some("upi".into()),
        });

        let body = br#"{"event":"order.paid","payload":{"order":{"entity":{"id":"order_1","amount_paid":5000}}}}"#;
        let event = parse_webhook(body, Some(&sign("whsec", body)), "whsec").unwrap();
        assert_eq!(event, WebhookEvent::OrderPaid { order_id: "order_1".into(), amount: Money::from_major(50) });

        let body = br#"{"event":"payment.failed","payload":{"payment":{"entity":{"id":"pay_2","order_id":"order_1","amount":100}}}}"#;
        let event = parse_webhook(body, Some(&sign("whsec", body)), "whsec").unwrap();
        assert_eq!(event, WebhookEvent::PaymentFailed { payment_id: "pay_2".into(), order_id: Some("order_1".into()), amount: Money::from_major(1) });

        let body = br#"{"event":"refund.created","payload":{}}"#;
        assert_eq!(parse_webhook(body, Some(&sign("whsec", body)), "whsec").unwrap(), WebhookEvent::Unhandled("refund.created".into()));
    }

    #[test]
    fn test_webhook_signature_covers_raw_bytes() {
        let body = br#"{"event":"payment.failed","payload":{"payment":{"entity":{"id":"pay_1","amount":100}}}}"#;
        let sig = sign("whsec", body);
        let reformatted = br#"{"event": "payment.failed","payload":{"payment":{"entity":{"id":"pay_1","amount":100}}}}"#;
        assert!(matches!(parse_webhook(reformatted, Some(&sig), "whsec"), Err(EcommerceError::WebhookSignatureInvalid)));
        assert!(matches!(parse_webhook(body, None, "whsec"), Err(EcommerceError::WebhookSignatureInvalid)));
        assert!(matches!(parse_webhook(body, Some(&sig), "other"), Err(EcommerceError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_authentic_but_malformed_webhook() {
        let body = br#"{"event":"payment.captured","payload":{}}"#;
        assert!(matches!(parse_webhook(body, Some(&sign("whsec", body)), "whsec"), Err(EcommerceError::Validation(_))));
    }
}
