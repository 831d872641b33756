use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the cooperating execution subsystems.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Tier 1: strategic coordination of swarms.
    Coordination,
    /// Tier 2: routine orchestration and process intelligence.
    Process,
    /// Tier 3: individual step execution.
    Execution,
    /// Shared primitives that belong to no single tier.
    CrossCutting,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Coordination => "tier1",
            Self::Process => "tier2",
            Self::Execution => "tier3",
            Self::CrossCutting => "cross-cutting",
        };
        f.write_str(s)
    }
}

/// The user on whose behalf a run or swarm executes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub has_premium: bool,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub preferences: HashMap<String, serde_json::Value>,
}

impl UserData {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Admin and premium accounts get the richer allocation ceilings.
    pub fn is_elevated(&self) -> bool {
        self.is_admin || self.has_premium
    }
}

/// Declared resource ceiling for a swarm task. Every field is always set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAllocation {
    #[serde(alias = "max_credits")]
    pub max_credits: u64,
    #[serde(alias = "max_duration_ms")]
    pub max_duration_ms: u64,
    #[serde(rename = "maxMemoryMB", alias = "max_memory_mb")]
    pub max_memory_mb: u64,
    #[serde(alias = "max_concurrent_steps")]
    pub max_concurrent_steps: u32,
}

impl ResourceAllocation {
    pub const fn new(
        max_credits: u64,
        max_duration_ms: u64,
        max_memory_mb: u64,
        max_concurrent_steps: u32,
    ) -> Self {
        Self {
            max_credits,
            max_duration_ms,
            max_memory_mb,
            max_concurrent_steps,
        }
    }
}

/// Log level accepted by [`ContextLogger`](crate::traits::ContextLogger).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A completion request handed to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Why a provider stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

/// A completion produced by an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: FinishReason,
}
