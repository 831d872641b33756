use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::context::RunContext;
use crate::error::{BusError, Result, StrataError};
use crate::event::{self, EventSource, ExecutionEvent};
use crate::retry::RetryPolicy;
use crate::traits::EventBus;
use crate::types::Tier;

/// Publisher configuration; also the `[publisher]` section of `strata.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_tier")]
    pub tier: Tier,
    #[serde(default = "default_component")]
    pub component: String,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Metadata stamped onto every event this publisher emits.
    #[serde(default)]
    pub default_metadata: HashMap<String, serde_json::Value>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            tier: default_tier(),
            component: default_component(),
            retry: RetryPolicy::default(),
            default_metadata: HashMap::new(),
        }
    }
}

fn default_tier() -> Tier { Tier::CrossCutting }
fn default_component() -> String { "strata".to_string() }

impl PublisherConfig {
    pub fn new(tier: Tier, component: impl Into<String>) -> Self {
        Self {
            tier,
            component: component.into(),
            ..Default::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Configuration merged over the parent's by [`EventPublisher::create_child`].
#[derive(Debug, Clone, Default)]
pub struct ChildPublisherConfig {
    pub tier: Option<Tier>,
    pub retry: Option<RetryPolicy>,
    pub default_metadata: HashMap<String, serde_json::Value>,
}

/// Per-call publish options.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub correlation_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Return the bus error once retries are exhausted (default: true).
    pub throw_on_error: bool,
    /// Abort pending retry delays when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            correlation_id: None,
            metadata: HashMap::new(),
            throw_on_error: true,
            cancel: None,
        }
    }
}

impl PublishOptions {
    /// Options that log delivery failure instead of returning it.
    pub fn suppress_errors() -> Self {
        Self {
            throw_on_error: false,
            ..Default::default()
        }
    }

    pub fn correlated(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Default::default()
        }
    }

    /// Correlate with a run, tag with its identity and honour its cancellation.
    pub fn for_context(ctx: &RunContext) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("runId".to_string(), ctx.run_id().as_str().into());
        metadata.insert("routineId".to_string(), ctx.routine_id().into());
        if let Some(step) = ctx.current_step_id() {
            metadata.insert("stepId".to_string(), step.into());
        }
        Self {
            correlation_id: Some(ctx.run_id().to_string()),
            metadata,
            throw_on_error: true,
            cancel: Some(ctx.cancel_token().clone()),
        }
    }

    pub fn with_throw_on_error(mut self, throw_on_error: bool) -> Self {
        self.throw_on_error = throw_on_error;
        self
    }
}

/// What happened to one logical publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub event_id: String,
    pub attempts: u32,
    pub delivered: bool,
}

/// One member of a [`EventPublisher::publish_batch`] call.
#[derive(Debug, Clone)]
pub struct BatchEvent {
    pub event_type: String,
    pub data: serde_json::Value,
    pub options: PublishOptions,
}

impl BatchEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            options: PublishOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub successful: usize,
    pub failed: usize,
}

/// Reliable event emission over an [`EventBus`] with bounded retry.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    source: EventSource,
    config: PublisherConfig,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("source", &self.source)
            .field("retry", &self.config.retry)
            .finish()
    }
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, config: PublisherConfig) -> Self {
        let source = EventSource::new(config.tier, config.component.clone());
        Self {
            bus,
            source,
            config,
        }
    }

    pub fn source(&self) -> &EventSource {
        &self.source
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Derive a publisher for a sub-component: `<component>.<prefix>`, same bus,
    /// same instance id, configuration merged over this one's.
    pub fn create_child(&self, prefix: &str, config: ChildPublisherConfig) -> EventPublisher {
        let mut merged = self.config.clone();
        merged.component = format!("{}.{}", self.config.component, prefix);
        if let Some(tier) = config.tier {
            merged.tier = tier;
        }
        if let Some(retry) = config.retry {
            merged.retry = retry;
        }
        merged.default_metadata.extend(config.default_metadata);

        let source = EventSource {
            tier: merged.tier,
            component: merged.component.clone(),
            instance_id: self.source.instance_id.clone(),
        };
        EventPublisher {
            bus: self.bus.clone(),
            source,
            config: merged,
        }
    }

    /// Build one event and deliver it with retry.
    ///
    /// The same event (same id) is handed to the bus on every attempt. Once
    /// retries are exhausted the failure is logged and, unless
    /// `options.throw_on_error` is false, returned.
    pub async fn publish(
        &self,
        event_type: impl Into<String>,
        data: serde_json::Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt> {
        let throw_on_error = options.throw_on_error;
        let (receipt, failure) = self.deliver(event_type.into(), data, options).await;
        match failure {
            Some(e) if throw_on_error => Err(StrataError::Bus(e)),
            _ => Ok(receipt),
        }
    }

    async fn deliver(
        &self,
        event_type: String,
        data: serde_json::Value,
        options: PublishOptions,
    ) -> (PublishReceipt, Option<BusError>) {
        let mut event = ExecutionEvent::new(event_type, self.source.clone(), data)
            .with_metadata(self.config.default_metadata.clone())
            .with_metadata(options.metadata);
        if let Some(correlation_id) = options.correlation_id {
            event = event.with_correlation_id(correlation_id);
        }
        let event = &event;

        let result = self
            .config
            .retry
            .run(
                |attempt| {
                    trace!(event_id = %event.id, attempt, "Publishing event");
                    self.bus.publish(event)
                },
                BusError::is_transient,
                options.cancel.as_ref(),
            )
            .await;

        match result {
            Ok(outcome) => {
                debug!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    attempts = outcome.attempts,
                    "Event published"
                );
                (
                    PublishReceipt {
                        event_id: event.id.clone(),
                        attempts: outcome.attempts,
                        delivered: true,
                    },
                    None,
                )
            }
            Err(failure) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    correlation_id = %event.correlation_id,
                    component = %self.source.component,
                    tier = %self.source.tier,
                    attempts = failure.attempts,
                    cancelled = failure.cancelled,
                    transient = failure.error.is_transient(),
                    error = %failure.error,
                    "Event publish failed"
                );
                (
                    PublishReceipt {
                        event_id: event.id.clone(),
                        attempts: failure.attempts,
                        delivered: false,
                    },
                    Some(failure.error),
                )
            }
        }
    }

    /// Publish every member concurrently with errors suppressed.
    /// No ordering across members; never fails.
    pub async fn publish_batch(&self, events: Vec<BatchEvent>) -> BatchResult {
        let futs: Vec<_> = events
            .into_iter()
            .map(|e| {
                let options = e.options.with_throw_on_error(false);
                self.deliver(e.event_type, e.data, options)
            })
            .collect();

        let results = futures::future::join_all(futs).await;
        let successful = results.iter().filter(|(r, _)| r.delivered).count();
        BatchResult {
            successful,
            failed: results.len() - successful,
        }
    }

    pub async fn publish_metric(
        &self,
        name: &str,
        value: f64,
        tags: HashMap<String, String>,
    ) -> Result<PublishReceipt> {
        let data = serde_json::json!({
            "name": name,
            "value": value,
            "tags": tags,
        });
        self.publish(event::types::METRIC, data, PublishOptions::default())
            .await
    }

    pub async fn publish_state_change(
        &self,
        entity_id: &str,
        from: &str,
        to: &str,
        reason: Option<&str>,
    ) -> Result<PublishReceipt> {
        let data = serde_json::json!({
            "entityId": entity_id,
            "from": from,
            "to": to,
            "reason": reason,
        });
        self.publish(event::types::STATE_CHANGED, data, PublishOptions::default())
            .await
    }

    /// Report a failure. Delivery problems are logged, never returned, so
    /// reporting an error cannot raise a new one.
    pub async fn publish_error(
        &self,
        error: &(dyn std::error::Error + '_),
        context: serde_json::Value,
    ) -> PublishReceipt {
        let data = serde_json::json!({
            "message": error.to_string(),
            "source": error.source().map(|s| s.to_string()),
            "context": context,
        });
        let (receipt, _) = self
            .deliver(
                event::types::ERROR_OCCURRED.to_string(),
                data,
                PublishOptions::suppress_errors(),
            )
            .await;
        receipt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use futures::future::BoxFuture;

    /// Fails the first `failures` deliveries, then succeeds. Fails every
    /// event whose type is listed in `always_fail`.
    struct ScriptedBus {
        failures: Mutex<u32>,
        always_fail: Vec<String>,
        kind_permanent: bool,
        seen: Mutex<Vec<ExecutionEvent>>,
    }

    impl ScriptedBus {
        fn failing(n: u32) -> Self {
            Self {
                failures: Mutex::new(n),
                always_fail: vec![],
                kind_permanent: false,
                seen: Mutex::new(vec![]),
            }
        }

        fn ids(&self) -> Vec<String> {
            self.seen.lock().unwrap().iter().map(|e| e.id.clone()).collect()
        }
    }

    impl EventBus for ScriptedBus {
        fn publish(&self, event: &ExecutionEvent) -> BoxFuture<'_, std::result::Result<(), BusError>> {
            self.seen.lock().unwrap().push(event.clone());
            let fail = {
                let mut remaining = self.failures.lock().unwrap();
                if self.always_fail.contains(&event.event_type) {
                    true
                } else if *remaining > 0 {
                    *remaining -= 1;
                    true
                } else {
                    false
                }
            };
            let permanent = self.kind_permanent;
            Box::pin(async move {
                match (fail, permanent) {
                    (false, _) => Ok(()),
                    (true, true) => Err(BusError::permanent("rejected")),
                    (true, false) => Err(BusError::transient("connection reset")),
                }
            })
        }
    }

    fn publisher(bus: Arc<ScriptedBus>, max_retries: u32) -> EventPublisher {
        EventPublisher::new(
            bus,
            PublisherConfig::new(Tier::Execution, "runner")
                .with_retry(RetryPolicy::new(max_retries, 100)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_recovers_with_same_event_id() {
        let bus = Arc::new(ScriptedBus::failing(2));
        let publisher = publisher(bus.clone(), 3);

        let receipt = publisher
            .publish("step.completed", serde_json::json!({"step": 1}), PublishOptions::default())
            .await
            .unwrap();

        assert!(receipt.delivered);
        assert_eq!(receipt.attempts, 3);
        let ids = bus.ids();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| *id == receipt.event_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_exhausted_returns_error_by_default() {
        let bus = Arc::new(ScriptedBus::failing(u32::MAX));
        let publisher = publisher(bus.clone(), 2);

        let err = publisher
            .publish("step.failed", serde_json::Value::Null, PublishOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Bus(_)));
        assert_eq!(bus.ids().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_suppressed_resolves_after_all_attempts() {
        let bus = Arc::new(ScriptedBus::failing(u32::MAX));
        let publisher = publisher(bus.clone(), 4);

        let receipt = publisher
            .publish("x", serde_json::Value::Null, PublishOptions::suppress_errors())
            .await
            .unwrap();
        assert!(!receipt.delivered);
        assert_eq!(receipt.attempts, 5);
        assert_eq!(bus.ids().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let bus = Arc::new(ScriptedBus {
            kind_permanent: true,
            ..ScriptedBus::failing(u32::MAX)
        });
        let publisher = publisher(bus.clone(), 3);

        let receipt = publisher
            .publish("x", serde_json::Value::Null, PublishOptions::suppress_errors())
            .await
            .unwrap();
        assert_eq!(receipt.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_counts_partial_failure() {
        let bus = Arc::new(ScriptedBus {
            always_fail: vec!["bad".into()],
            ..ScriptedBus::failing(0)
        });
        let publisher = publisher(bus, 1);

        let events = vec![
            BatchEvent::new("good", serde_json::json!(1)),
            BatchEvent::new("bad", serde_json::json!(2)),
            BatchEvent::new("good", serde_json::json!(3)),
            BatchEvent::new("bad", serde_json::json!(4)),
            BatchEvent::new("good", serde_json::json!(5)),
        ];
        let result = publisher.publish_batch(events).await;
        assert_eq!(result, BatchResult { successful: 3, failed: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_never_fails_when_everything_fails() {
        let bus = Arc::new(ScriptedBus::failing(u32::MAX));
        let publisher = publisher(bus, 0);
        let events = (0..4).map(|i| BatchEvent::new("e", serde_json::json!(i))).collect();
        let result = publisher.publish_batch(events).await;
        assert_eq!(result, BatchResult { successful: 0, failed: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_error_never_fails() {
        let bus = Arc::new(ScriptedBus::failing(u32::MAX));
        let publisher = publisher(bus.clone(), 1);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");

        let receipt = publisher
            .publish_error(&err, serde_json::json!({"step": "write"}))
            .await;
        assert!(!receipt.delivered);
        let seen = bus.seen.lock().unwrap();
        assert_eq!(seen[0].event_type, event::types::ERROR_OCCURRED);
        assert_eq!(seen[0].data["message"], "disk full");
    }

    #[tokio::test]
    async fn test_child_publisher_dotted_source_and_merged_config() {
        let bus = Arc::new(ScriptedBus::failing(0));
        let mut config = PublisherConfig::new(Tier::Process, "orchestrator");
        config
            .default_metadata
            .insert("node".into(), serde_json::json!("a"));
        let parent = EventPublisher::new(bus.clone(), config);

        let mut child_config = ChildPublisherConfig {
            retry: Some(RetryPolicy::fixed(0, 0)),
            ..Default::default()
        };
        child_config
            .default_metadata
            .insert("sub".into(), serde_json::json!("llm"));
        let child = parent.create_child("llm", child_config);

        assert_eq!(child.source().component, "orchestrator.llm");
        assert_eq!(child.source().instance_id, parent.source().instance_id);
        assert_eq!(child.config().retry.max_retries, 0);
        assert_eq!(parent.config().retry.max_retries, 3);

        child
            .publish_state_change("run-1", "running", "completed", None)
            .await
            .unwrap();
        let seen = bus.seen.lock().unwrap();
        assert_eq!(seen[0].source.component, "orchestrator.llm");
        assert_eq!(seen[0].metadata["node"], "a");
        assert_eq!(seen[0].metadata["sub"], "llm");
        assert_eq!(seen[0].data["to"], "completed");
    }

    #[tokio::test]
    async fn test_context_options_correlate_with_run() {
        let bus = Arc::new(ScriptedBus::failing(0));
        let publisher = publisher(bus.clone(), 0);
        let ctx = RunContext::new(crate::context::RunContextConfig {
            routine_id: "r1".into(),
            routine_name: "Routine".into(),
            ..Default::default()
        });

        publisher
            .publish_metric("tokens", 42.0, HashMap::new())
            .await
            .unwrap();
        publisher
            .publish("step.started", serde_json::Value::Null, PublishOptions::for_context(&ctx))
            .await
            .unwrap();

        let seen = bus.seen.lock().unwrap();
        assert_eq!(seen[0].data["value"], 42.0);
        assert_eq!(seen[1].correlation_id, ctx.run_id().as_str());
        assert_eq!(seen[1].metadata["routineId"], "r1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_context_stops_retrying() {
        let bus = Arc::new(ScriptedBus::failing(u32::MAX));
        let publisher = publisher(bus.clone(), 5);
        let ctx = RunContext::new(crate::context::RunContextConfig::default());
        ctx.cancel_token().cancel();

        let result = publisher
            .publish("x", serde_json::Value::Null, PublishOptions::for_context(&ctx))
            .await;
        assert!(result.is_err());
        assert_eq!(bus.ids().len(), 1);
    }
}
