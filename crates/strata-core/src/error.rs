use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrataError {
    // Configuration errors: detected without I/O, never retried
    #[error("No LLM provider configured")]
    NoProviderConfigured,

    #[error("LLM provider not registered: {0}")]
    UnknownProvider(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Unsupported bot config version: {0}")]
    UnsupportedConfigVersion(String),

    #[error("Invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("Invalid team configuration: {0}")]
    InvalidTeam(String),

    #[error("Invalid resource transition for {resource}: {message}")]
    InvalidTransition { resource: String, message: String },

    #[error("Resource not in catalog: {0}")]
    UnknownResource(String),

    // Transient errors: retried per policy, then surfaced
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("LLM request failed: {provider}: {message}")]
    LlmRequest { provider: String, message: String },

    // Persistence
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline of {budget_ms}ms exceeded for {scope}")]
    DeadlineExceeded { scope: String, budget_ms: u64 },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StrataError {
    /// Configuration-class errors never involve I/O and are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoProviderConfigured
                | Self::UnknownProvider(_)
                | Self::Config(_)
                | Self::ConfigNotFound(_)
                | Self::UnsupportedConfigVersion(_)
                | Self::InvalidAllocation(_)
                | Self::InvalidTeam(_)
                | Self::InvalidTransition { .. }
                | Self::UnknownResource(_)
        )
    }
}

/// How a bus failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusErrorKind {
    /// Network hiccup, broker restart, backpressure. Worth retrying.
    Transient,
    /// Rejected payload, closed bus. Retrying cannot succeed.
    Permanent,
}

/// Failure reported by an [`EventBus`](crate::traits::EventBus) implementation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BusError {
    pub kind: BusErrorKind,
    pub message: String,
}

impl BusError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: BusErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: BusErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == BusErrorKind::Transient
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
