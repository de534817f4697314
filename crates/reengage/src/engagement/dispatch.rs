//! Inbound batch decoding and per-event routing.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, info_span, warn, Instrument};

use super::clock::parse_timestamp;
use super::content::ContentGenerator;
use super::delivery::MailDelivery;
use super::domain::{CustomerId, CustomerSnapshot, OrderPayload};
use super::orchestrator::{EngagementError, EngagementOrchestrator, ProcessOutcome};
use super::store::RecordStore;

/// Transport batch: `{ "Records": [ { "messageId", "body" } ] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<InboundMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "messageId", default)]
    pub message_id: String,
    /// Either a JSON string or an already-parsed document.
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    CustomerCreated(CustomerSnapshot),
    CustomerUpdated(CustomerSnapshot),
    OrderCreated(OrderPayload),
    OrderUpdated(OrderPayload),
}

impl InboundEvent {
    pub fn label(&self) -> &'static str {
        match self {
            InboundEvent::CustomerCreated(_) => "USER_CREATED",
            InboundEvent::CustomerUpdated(_) => "USER_UPDATED",
            InboundEvent::OrderCreated(_) => "ORDER_CREATED",
            InboundEvent::OrderUpdated(_) => "ORDER_UPDATED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub event: InboundEvent,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("unknown event type {0}")]
    UnknownType(String),
    #[error("invalid {event_type} payload: {reason}")]
    InvalidPayload { event_type: String, reason: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Unwrap the transport layers of one message body and type its payload.
pub fn decode_message(body: &Value) -> Result<DecodedEvent, DecodeError> {
    let mut document = match body {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .map_err(|err| DecodeError::MalformedEnvelope(err.to_string()))?,
        other => other.clone(),
    };

    if let Some(message) = document.get("Message") {
        let inner = message.as_str().ok_or_else(|| {
            DecodeError::MalformedEnvelope("notification Message is not a string".to_string())
        })?;
        document = serde_json::from_str(inner)
            .map_err(|err| DecodeError::MalformedEnvelope(err.to_string()))?;
    }

    let raw: RawEvent = serde_json::from_value(document)
        .map_err(|err| DecodeError::MalformedEnvelope(err.to_string()))?;
    let occurred_at = raw.timestamp.as_deref().and_then(parse_timestamp);
    let event_type = raw.event_type;

    let invalid = |err: serde_json::Error| DecodeError::InvalidPayload {
        event_type: event_type.clone(),
        reason: err.to_string(),
    };

    let event = match event_type.as_str() {
        "USER_CREATED" | "CUSTOMER_CREATED" => {
            InboundEvent::CustomerCreated(serde_json::from_value(raw.payload).map_err(invalid)?)
        }
        "USER_UPDATED" | "CUSTOMER_UPDATED" => {
            InboundEvent::CustomerUpdated(serde_json::from_value(raw.payload).map_err(invalid)?)
        }
        "ORDER_CREATED" => {
            InboundEvent::OrderCreated(serde_json::from_value(raw.payload).map_err(invalid)?)
        }
        "ORDER_UPDATED" => {
            InboundEvent::OrderUpdated(serde_json::from_value(raw.payload).map_err(invalid)?)
        }
        _ => return Err(DecodeError::UnknownType(event_type.clone())),
    };

    Ok(DecodedEvent { event, occurred_at })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    UnknownEventType { event_type: String },
    Malformed { detail: String },
    InvalidSnapshot { detail: String },
    CustomerNotFound { customer_id: CustomerId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum EventDisposition {
    Processed { outcome: ProcessOutcome },
    Skipped { reason: SkipReason },
    Failed { error: String },
}

impl EventDisposition {
    fn label(&self) -> &'static str {
        match self {
            EventDisposition::Processed { .. } => "processed",
            EventDisposition::Skipped { .. } => "skipped",
            EventDisposition::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageReport {
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<&'static str>,
    #[serde(flatten)]
    pub disposition: EventDisposition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub messages: Vec<MessageReport>,
}

impl BatchReport {
    fn record(&mut self, report: MessageReport) {
        match report.disposition {
            EventDisposition::Processed { .. } => self.processed += 1,
            EventDisposition::Skipped { .. } => self.skipped += 1,
            EventDisposition::Failed { .. } => self.failed += 1,
        }
        self.messages.push(report);
    }
}

/// Routes decoded events to the orchestrator one at a time.
pub struct EventDispatcher<S: ?Sized, G: ?Sized, D: ?Sized> {
    orchestrator: Arc<EngagementOrchestrator<S, G, D>>,
}

impl<S, G, D> EventDispatcher<S, G, D>
where
    S: RecordStore + ?Sized,
    G: ContentGenerator + ?Sized,
    D: MailDelivery + ?Sized,
{
    pub fn new(orchestrator: Arc<EngagementOrchestrator<S, G, D>>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<EngagementOrchestrator<S, G, D>> {
        &self.orchestrator
    }

    /// Process every message; no single message can fail the batch.
    pub async fn dispatch_batch(&self, batch: &EnvelopeBatch) -> BatchReport {
        let mut report = BatchReport::default();
        for message in &batch.records {
            let span = info_span!("event", message_id = %message.message_id);
            let handled = AssertUnwindSafe(self.dispatch_message(message).instrument(span))
                .catch_unwind()
                .await;

            let message_report = match handled {
                Ok(message_report) => message_report,
                Err(panic) => {
                    let detail = panic_message(panic.as_ref());
                    error!(message_id = %message.message_id, %detail, "event processing panicked");
                    MessageReport {
                        message_id: message.message_id.clone(),
                        event_type: None,
                        disposition: EventDisposition::Failed {
                            error: format!("panicked: {detail}"),
                        },
                    }
                }
            };

            metrics::counter!(
                "reengage_events_total",
                "disposition" => message_report.disposition.label()
            )
            .increment(1);
            report.record(message_report);
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "batch complete"
        );
        report
    }

    async fn dispatch_message(&self, message: &InboundMessage) -> MessageReport {
        let message_id = message.message_id.clone();
        let decoded = match decode_message(&message.body) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, "skipping undecodable message");
                let reason = match err {
                    DecodeError::UnknownType(event_type) => {
                        SkipReason::UnknownEventType { event_type }
                    }
                    other => SkipReason::Malformed {
                        detail: other.to_string(),
                    },
                };
                return MessageReport {
                    message_id,
                    event_type: None,
                    disposition: EventDisposition::Skipped { reason },
                };
            }
        };

        let event_type = decoded.event.label();
        info!(event_type, occurred_at = ?decoded.occurred_at, "processing event");
        let disposition = self.handle_event(decoded.event).await;

        MessageReport {
            message_id,
            event_type: Some(event_type),
            disposition,
        }
    }

    async fn handle_event(&self, event: InboundEvent) -> EventDisposition {
        let snapshot = match event {
            InboundEvent::CustomerCreated(snapshot) | InboundEvent::CustomerUpdated(snapshot) => {
                match self.sync_customer(snapshot).await {
                    Ok(snapshot) => snapshot,
                    Err(disposition) => return disposition,
                }
            }
            InboundEvent::OrderCreated(order) | InboundEvent::OrderUpdated(order) => {
                match self.orchestrator.store().get_customer(&order.customer_id).await {
                    Ok(Some(snapshot)) => snapshot,
                    Ok(None) => {
                        let err = EngagementError::CustomerNotFound(order.customer_id.clone());
                        warn!(error = %err, "skipping order event");
                        return EventDisposition::Skipped {
                            reason: SkipReason::CustomerNotFound {
                                customer_id: order.customer_id,
                            },
                        };
                    }
                    Err(source) => {
                        return EventDisposition::Failed {
                            error: EngagementError::StoreRead(source).to_string(),
                        }
                    }
                }
            }
        };

        match self.orchestrator.process(&snapshot).await {
            Ok(outcome) => EventDisposition::Processed { outcome },
            Err(err) => {
                warn!(customer_id = %snapshot.customer_id, error = %err, "event processing failed");
                EventDisposition::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Mirror a customer event into the store. A score the payload omits keeps its
    /// stored value, and the last-email timestamp never moves backwards.
    async fn sync_customer(
        &self,
        mut snapshot: CustomerSnapshot,
    ) -> Result<CustomerSnapshot, EventDisposition> {
        if let Err(violation) = snapshot.validate() {
            warn!(error = %violation, "skipping invalid customer snapshot");
            return Err(EventDisposition::Skipped {
                reason: SkipReason::InvalidSnapshot {
                    detail: violation.to_string(),
                },
            });
        }

        let store = self.orchestrator.store();
        let existing = store
            .get_customer(&snapshot.customer_id)
            .await
            .map_err(|source| EventDisposition::Failed {
                error: EngagementError::StoreRead(source).to_string(),
            })?;
        if let Some(existing) = existing {
            snapshot.engagement_score = snapshot.engagement_score.or(existing.engagement_score);
            snapshot.last_email_date =
                later_timestamp(snapshot.last_email_date, existing.last_email_date);
        }

        store
            .put_customer(snapshot.clone())
            .await
            .map_err(|source| EventDisposition::Failed {
                error: format!("customer sync failed: {source}"),
            })?;
        Ok(snapshot)
    }
}

/// Keep whichever timestamp is later. An unparsable value loses to a parsable one.
fn later_timestamp(incoming: Option<String>, stored: Option<String>) -> Option<String> {
    match (incoming, stored) {
        (Some(incoming), Some(stored)) => {
            match (parse_timestamp(&incoming), parse_timestamp(&stored)) {
                (Some(new), Some(old)) if old > new => Some(stored),
                (None, Some(_)) => Some(stored),
                _ => Some(incoming),
            }
        }
        (incoming, stored) => incoming.or(stored),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customer_event() -> Value {
        json!({
            "type": "USER_UPDATED",
            "timestamp": "2025-06-01T10:00:00Z",
            "payload": {
                "userId": "cust-1",
                "email": "ada@example.com",
                "name": "Ada",
                "lastOrderDate": "2025-01-01T00:00:00Z",
                "orderCount": 3,
                "averageOrderValue": 42.0,
                "preferredCategories": ["shoes"]
            }
        })
    }

    #[test]
    fn decodes_notification_wrapped_in_string_body() {
        let notification = json!({ "Message": customer_event().to_string() });
        let body = Value::String(notification.to_string());
        let decoded = decode_message(&body).expect("decodes");
        assert!(matches!(decoded.event, InboundEvent::CustomerUpdated(_)));
        assert!(decoded.occurred_at.is_some());
    }

    #[test]
    fn later_timestamp_never_moves_backwards() {
        let older = Some("2025-05-01T00:00:00Z".to_string());
        let newer = Some("2025-06-01T12:00:00.000Z".to_string());
        assert_eq!(later_timestamp(older.clone(), newer.clone()), newer);
        assert_eq!(later_timestamp(newer.clone(), older.clone()), newer);
        assert_eq!(later_timestamp(None, older.clone()), older);
        assert_eq!(later_timestamp(Some("soon".to_string()), older.clone()), older);
        assert_eq!(
            later_timestamp(Some("2025-05-02".to_string()), older),
            Some("2025-05-02".to_string())
        );
    }

    #[test]
    fn decodes_bare_event_documents() {
        let decoded = decode_message(&customer_event()).expect("decodes");
        assert_eq!(decoded.event.label(), "USER_UPDATED");
    }

    #[test]
    fn accepts_customer_discriminator_aliases() {
        let mut event = customer_event();
        event["type"] = json!("CUSTOMER_CREATED");
        let decoded = decode_message(&event).expect("decodes");
        assert!(matches!(decoded.event, InboundEvent::CustomerCreated(_)));
    }

    #[test]
    fn order_payload_only_requires_customer() {
        let body = json!({ "type": "ORDER_CREATED", "payload": { "userId": "cust-9" } });
        match decode_message(&body).expect("decodes").event {
            InboundEvent::OrderCreated(order) => {
                assert_eq!(order.customer_id, CustomerId("cust-9".to_string()));
                assert!(order.items.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn reports_unknown_types_separately() {
        let body = json!({ "type": "CART_ABANDONED", "payload": {} });
        assert_eq!(
            decode_message(&body),
            Err(DecodeError::UnknownType("CART_ABANDONED".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(matches!(
            decode_message(&Value::String("{not json".to_string())),
            Err(DecodeError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            decode_message(&json!({ "Message": 42 })),
            Err(DecodeError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            decode_message(&json!({ "type": "ORDER_CREATED", "payload": { "orderId": "o-1" } })),
            Err(DecodeError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}
