use futures::future::BoxFuture;

use crate::error::BusError;
use crate::event::ExecutionEvent;
use crate::types::{CompletionRequest, CompletionResponse, LogLevel};

/// External transport for execution events.
///
/// Implementations deliver at most once per call and never retry on their own;
/// [`EventPublisher`](crate::publisher::EventPublisher) layers retry on top.
pub trait EventBus: Send + Sync + 'static {
    fn publish(&self, event: &ExecutionEvent) -> BoxFuture<'_, Result<(), BusError>>;
}

/// Capability contract of a concrete model backend.
pub trait LlmProvider: Send + Sync + 'static {
    /// Registry name (e.g., "anthropic", "local").
    fn name(&self) -> &str;

    /// Run one completion.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<'_, crate::error::Result<CompletionResponse>>;

    /// Cheap availability probe. Errors are treated as "unavailable" by callers
    /// that aggregate status.
    fn is_available(&self) -> BoxFuture<'_, crate::error::Result<bool>>;
}

/// Leveled structured logger attached to a [`RunContext`](crate::context::RunContext).
///
/// Observability only: nothing in the core branches on whether logging succeeded.
pub trait ContextLogger: Send + Sync + 'static {
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        fields: &serde_json::Map<String, serde_json::Value>,
    );
}
