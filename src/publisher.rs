//! Domain event publication.

use crate::domain::events::DomainEvent;

/// Publishes committed domain events to NATS under `storefront.<kind>`, or
/// logs them when no NATS client is configured. Never fails the caller.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub const SUBJECT_PREFIX: &'static str = "storefront";

    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn logging_only() -> Self { Self { nats: None } }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events { self.publish(&event).await; }
    }

    pub async fn publish(&self, event: &DomainEvent) {
        let subject = format!("{}.{}", Self::SUBJECT_PREFIX, event.kind());
        let Some(client) = &self.nats else {
            tracing::debug!(subject = %subject, ?event, "domain event");
            return;
        };
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(subject = %subject, error = %e, "failed to encode domain event");
                return;
            }
        };
        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            tracing::warn!(subject = %subject, error = %e, "failed to publish domain event");
        }
    }
}
