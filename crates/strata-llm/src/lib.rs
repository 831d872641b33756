pub mod prompts;
pub mod registry;
pub mod service;

pub use registry::ProviderRegistry;
pub use service::{CompletionOptions, LlmService, ProviderStatus};
