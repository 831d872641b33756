use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BusError;
use crate::traits::EventBus;
use crate::types::Tier;

/// Well-known event type names.
pub mod types {
    pub const COMPLETION_REQUESTED: &str = "llm.completion.requested";
    pub const COMPLETION_FAILED: &str = "llm.completion.failed";
    pub const METRIC: &str = "telemetry.metric";
    pub const STATE_CHANGED: &str = "lifecycle.state_changed";
    pub const ERROR_OCCURRED: &str = "lifecycle.error";
}

/// Where an event originated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    pub tier: Tier,
    pub component: String,
    pub instance_id: String,
}

impl EventSource {
    pub fn new(tier: Tier, component: impl Into<String>) -> Self {
        Self {
            tier,
            component: component.into(),
            instance_id: Uuid::new_v4().to_string(),
        }
    }
}

/// One lifecycle or telemetry event.
///
/// Built once per logical publish and reused unchanged across retry attempts,
/// so `id` is stable for downstream de-duplication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub correlation_id: String,
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ExecutionEvent {
    pub fn new(
        event_type: impl Into<String>,
        source: EventSource,
        data: serde_json::Value,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            correlation_id: id.clone(),
            id,
            event_type: event_type.into(),
            timestamp: Utc::now(),
            source,
            data,
            metadata: HashMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }
}

/// In-process event bus using a tokio broadcast channel.
/// All subscribers receive all events.
pub struct BroadcastBus {
    tx: tokio::sync::broadcast::Sender<ExecutionEvent>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, event: &ExecutionEvent) -> BoxFuture<'_, Result<(), BusError>> {
        // No receivers is not a delivery failure
        let _ = self.tx.send(event.clone());
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_event_correlates_to_itself() {
        let source = EventSource::new(Tier::Execution, "step-runner");
        let event = ExecutionEvent::new("step.started", source, serde_json::json!({}));
        assert_eq!(event.id, event.correlation_id);
        assert_eq!(event.event_type, "step.started");
    }

    #[test]
    fn test_event_wire_format() {
        let source = EventSource::new(Tier::Coordination, "swarm");
        let event = ExecutionEvent::new("swarm.started", source, serde_json::json!({"goal": "x"}))
            .with_correlation_id("corr-1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "swarm.started");
        assert_eq!(json["correlationId"], "corr-1");
        assert_eq!(json["source"]["tier"], "coordination");
    }

    #[tokio::test]
    async fn test_broadcast_bus_delivers_to_subscribers() {
        let bus = BroadcastBus::default();
        let mut rx = bus.subscribe();
        let event = ExecutionEvent::new(
            "run.completed",
            EventSource::new(Tier::Process, "runner"),
            serde_json::json!({"ok": true}),
        );
        bus.publish(&event).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event.id);
    }

    #[tokio::test]
    async fn test_broadcast_bus_without_subscribers_succeeds() {
        let bus = BroadcastBus::new(4);
        let event = ExecutionEvent::new(
            "noop",
            EventSource::new(Tier::CrossCutting, "test"),
            serde_json::Value::Null,
        );
        assert!(bus.publish(&event).await.is_ok());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
