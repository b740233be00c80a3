//! Inbound message replay from JSON-lines files.
//!
//! Each line is one request as it would reach the service: a client confirmation,
//! a webhook delivery (raw body kept as a string, exactly as signed), or an
//! operator action.

use crate::application::engine::ClientConfirmation;
use crate::application::webhook::WebhookDelivery;
use crate::domain::status::PaymentStatus;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::BufRead;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundMessage {
    Confirm(ClientConfirmation),
    Webhook(WebhookMessage),
    Refund {
        order_id: String,
        #[serde(default)]
        partial: bool,
    },
    Transition {
        order_id: String,
        status: PaymentStatus,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    #[serde(default)]
    pub event_id: Option<String>,
    pub body: String,
    pub signature: String,
}

impl From<WebhookMessage> for WebhookDelivery {
    fn from(message: WebhookMessage) -> Self {
        WebhookDelivery {
            event_id: message.event_id,
            body: message.body.into_bytes(),
            signature: message.signature,
        }
    }
}

/// Streams messages from a JSON-lines source, skipping blank lines.
pub struct MessageReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> MessageReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn messages(self) -> impl Iterator<Item = Result<InboundMessage>> {
        self.source
            .lines()
            .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .map(|line| {
                let line = line.map_err(PaymentError::from)?;
                serde_json::from_str(&line).map_err(PaymentError::from)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_each_kind() {
        let data = r#"{"kind":"confirm","paymentId":"pay_1","orderId":"order_r1","signature":"ab","customerName":"Asha"}

{"kind":"webhook","event_id":"evt_1","body":"{\"event\":\"payment.failed\"}","signature":"cd"}
{"kind":"refund","order_id":"order_r1","partial":true}
{"kind":"transition","order_id":"order_r2","status":"CANCELLED"}
"#;
        let messages: Vec<InboundMessage> = MessageReader::new(data.as_bytes())
            .messages()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(messages.len(), 4);

        let InboundMessage::Confirm(confirm) = &messages[0] else {
            panic!("expected a confirmation");
        };
        assert_eq!(confirm.payment_id, "pay_1");
        assert_eq!(confirm.customer.name.as_deref(), Some("Asha"));

        let InboundMessage::Webhook(webhook) = messages[1].clone() else {
            panic!("expected a webhook");
        };
        let delivery = WebhookDelivery::from(webhook);
        assert_eq!(delivery.body, br#"{"event":"payment.failed"}"#.to_vec());

        assert!(matches!(
            messages[2],
            InboundMessage::Refund { partial: true, .. }
        ));
        assert!(matches!(
            messages[3],
            InboundMessage::Transition {
                status: PaymentStatus::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn test_bad_line_is_reported_and_reading_continues() {
        let data = "{\"kind\":\"teleport\"}\n{\"kind\":\"refund\",\"order_id\":\"o\"}\n";
        let results: Vec<Result<InboundMessage>> =
            MessageReader::new(data.as_bytes()).messages().collect();
        assert!(matches!(results[0], Err(PaymentError::MalformedPayload(_))));
        assert!(results[1].is_ok());
    }
}
