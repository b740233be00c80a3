use crate::application::engine::{Outcome, ReconciliationEngine, webhook_target};
use crate::domain::ports::ProcessedEventStoreRef;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// One webhook delivery as it arrived over the wire.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    /// Event id from the delivery headers, when the processor sends one.
    pub event_id: Option<String>,
    /// The request body, byte for byte.
    pub body: Vec<u8>,
    pub signature: String,
}

#[derive(Debug, PartialEq)]
pub enum Dispatch {
    Processed(Outcome),
    /// The event id was handled before; the engine was not invoked.
    Duplicate { event_id: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<String>,
    event: String,
    #[serde(default)]
    payload: EnvelopePayload,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopePayload {
    #[serde(default)]
    payment: Option<Entity>,
    #[serde(default)]
    order: Option<Entity>,
}

#[derive(Debug, Deserialize)]
struct Entity {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
}

impl Envelope {
    fn payment_ref(&self) -> Option<&str> {
        self.payload.payment.as_ref().map(|p| p.id.as_str())
    }

    fn order_ref(&self) -> Option<&str> {
        self.payload
            .order
            .as_ref()
            .map(|o| o.id.as_str())
            .or_else(|| self.payload.payment.as_ref()?.order_id.as_deref())
    }
}

/// Routes processor webhooks into the engine, once per event id.
pub struct WebhookDispatcher {
    engine: Arc<ReconciliationEngine>,
    events: ProcessedEventStoreRef,
}

impl WebhookDispatcher {
    pub fn new(engine: Arc<ReconciliationEngine>, events: ProcessedEventStoreRef) -> Self {
        Self { engine, events }
    }

    pub async fn dispatch(&self, delivery: &WebhookDelivery) -> Result<Dispatch> {
        // Authenticate the raw bytes before the body is parsed at all.
        if !self.engine.verify_webhook(&delivery.body, &delivery.signature) {
            warn!(
                security_event = true,
                event_id = delivery.event_id.as_deref().unwrap_or("-"),
                "Webhook signature mismatch"
            );
            return Err(PaymentError::SignatureInvalid);
        }
        let envelope: Envelope = serde_json::from_slice(&delivery.body)?;

        let event_id = delivery.event_id.clone().or_else(|| envelope.id.clone());
        if let Some(event_id) = &event_id
            && self.events.contains(event_id).await?
        {
            info!(%event_id, event = %envelope.event, "Skipping duplicate webhook delivery");
            return Ok(Dispatch::Duplicate {
                event_id: event_id.clone(),
            });
        }

        let (payment_ref, order_ref) = match (envelope.payment_ref(), envelope.order_ref()) {
            (Some(payment_ref), Some(order_ref)) => (payment_ref, order_ref),
            _ if webhook_target(&envelope.event).is_none() => ("", ""),
            _ => {
                return Err(PaymentError::ValidationError(format!(
                    "{} webhook is missing the payment or order id",
                    envelope.event
                )));
            }
        };

        let outcome = self
            .engine
            .apply_webhook_event(
                &envelope.event,
                payment_ref,
                order_ref,
                &delivery.body,
                &delivery.signature,
            )
            .await?;

        if let Some(event_id) = &event_id {
            self.events.mark_processed(event_id).await?;
        }
        Ok(Dispatch::Processed(outcome))
    }
}
