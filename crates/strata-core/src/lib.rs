pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod publisher;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use context::{ContextOverrides, RunContext, RunContextConfig, TracingLogger};
pub use error::{BusError, Result, StrataError};
pub use event::{BroadcastBus, EventSource, ExecutionEvent};
pub use publisher::{EventPublisher, PublishOptions, PublisherConfig};
pub use retry::RetryPolicy;
pub use types::*;
