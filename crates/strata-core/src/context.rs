use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::traits::ContextLogger;
use crate::types::{LogLevel, RunId, UserData};

/// Environment key that selects development/production behaviour.
pub const ENVIRONMENT_KEY: &str = "ENVIRONMENT";

/// Optional resource hints attached to a step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_credits: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// Transportable form of a [`RunContext`]. This is what crosses a tier
/// boundary; the receiver rebuilds a live context with [`RunContext::from_config`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunContextConfig {
    #[serde(default)]
    pub run_id: Option<RunId>,
    pub routine_id: String,
    pub routine_name: String,
    #[serde(default)]
    pub current_step_id: Option<String>,
    #[serde(default)]
    pub parent_run_id: Option<RunId>,
    #[serde(default)]
    pub swarm_id: Option<String>,
    #[serde(default)]
    pub user_data: UserData,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub step_config: Option<serde_json::Value>,
    #[serde(default)]
    pub usage_hints: Option<UsageHints>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Field overrides applied when deriving a child context.
///
/// `environment` and `metadata` entries are merged over the inherited maps;
/// every other `Some` replaces the inherited value.
#[derive(Debug, Clone, Default)]
pub struct ContextOverrides {
    pub routine_id: Option<String>,
    pub routine_name: Option<String>,
    pub current_step_id: Option<String>,
    pub swarm_id: Option<String>,
    pub user_data: Option<UserData>,
    pub environment: HashMap<String, String>,
    pub step_config: Option<serde_json::Value>,
    pub usage_hints: Option<UsageHints>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub deadline: Option<DateTime<Utc>>,
}

impl ContextOverrides {
    pub fn step(step_id: impl Into<String>) -> Self {
        Self {
            current_step_id: Some(step_id.into()),
            ..Default::default()
        }
    }
}

/// Compact description of a context for logs and cross-tier handoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunContextSummary {
    pub run_id: RunId,
    pub routine_id: String,
    pub routine_name: String,
    pub current_step_id: Option<String>,
    pub parent_run_id: Option<RunId>,
    pub swarm_id: Option<String>,
    pub user_id: String,
    pub environment: String,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Immutable per-step execution frame.
///
/// Created by the owning tier at step dispatch and passed down the call chain.
/// Nothing mutates a context in place; every change yields a new value.
#[derive(Clone)]
pub struct RunContext {
    run_id: RunId,
    routine_id: String,
    routine_name: String,
    current_step_id: Option<String>,
    parent_run_id: Option<RunId>,
    swarm_id: Option<String>,
    user_data: UserData,
    environment: HashMap<String, String>,
    step_config: Option<serde_json::Value>,
    usage_hints: Option<UsageHints>,
    metadata: HashMap<String, serde_json::Value>,
    created_at: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
    started: Instant,
    cancel: CancellationToken,
    logger: Option<Arc<dyn ContextLogger>>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("routine_id", &self.routine_id)
            .field("current_step_id", &self.current_step_id)
            .field("parent_run_id", &self.parent_run_id)
            .field("swarm_id", &self.swarm_id)
            .field("deadline", &self.deadline)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl RunContext {
    /// Build a context from its config, generating a run id if none was given.
    pub fn new(config: RunContextConfig) -> Self {
        Self {
            run_id: config.run_id.unwrap_or_default(),
            routine_id: config.routine_id,
            routine_name: config.routine_name,
            current_step_id: config.current_step_id,
            parent_run_id: config.parent_run_id,
            swarm_id: config.swarm_id,
            user_data: config.user_data,
            environment: config.environment,
            step_config: config.step_config,
            usage_hints: config.usage_hints,
            metadata: config.metadata,
            created_at: config.created_at.unwrap_or_else(Utc::now),
            deadline: config.deadline,
            started: Instant::now(),
            cancel: CancellationToken::new(),
            logger: None,
        }
    }

    /// Rebuild a context received over a tier boundary and reattach a live logger.
    pub fn from_config(config: RunContextConfig, logger: Arc<dyn ContextLogger>) -> Self {
        Self::new(config).with_logger(logger)
    }

    pub fn with_logger(mut self, logger: Arc<dyn ContextLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Derive a child frame: fresh run id, parent link to this run, every other
    /// field inherited and then overridden.
    pub fn create_child_context(&self, overrides: ContextOverrides) -> RunContext {
        let mut environment = self.environment.clone();
        environment.extend(overrides.environment);
        let mut metadata = self.metadata.clone();
        metadata.extend(overrides.metadata);

        RunContext {
            run_id: RunId::new(),
            routine_id: overrides.routine_id.unwrap_or_else(|| self.routine_id.clone()),
            routine_name: overrides
                .routine_name
                .unwrap_or_else(|| self.routine_name.clone()),
            current_step_id: overrides
                .current_step_id
                .or_else(|| self.current_step_id.clone()),
            parent_run_id: Some(self.run_id.clone()),
            swarm_id: overrides.swarm_id.or_else(|| self.swarm_id.clone()),
            user_data: overrides.user_data.unwrap_or_else(|| self.user_data.clone()),
            environment,
            step_config: overrides.step_config.or_else(|| self.step_config.clone()),
            usage_hints: overrides.usage_hints.or_else(|| self.usage_hints.clone()),
            metadata,
            created_at: Utc::now(),
            deadline: overrides.deadline.or(self.deadline),
            started: Instant::now(),
            cancel: self.cancel.child_token(),
            logger: self.logger.clone(),
        }
    }

    /// New snapshot with one more metadata entry. Same run id.
    pub fn with_metadata(&self, key: impl Into<String>, value: serde_json::Value) -> RunContext {
        let mut next = self.clone();
        next.metadata.insert(key.into(), value);
        next
    }

    /// New snapshot with a deadline. Same run id.
    pub fn with_deadline(&self, deadline: DateTime<Utc>) -> RunContext {
        let mut next = self.clone();
        next.deadline = Some(deadline);
        next
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn routine_id(&self) -> &str {
        &self.routine_id
    }

    pub fn routine_name(&self) -> &str {
        &self.routine_name
    }

    pub fn current_step_id(&self) -> Option<&str> {
        self.current_step_id.as_deref()
    }

    pub fn parent_run_id(&self) -> Option<&RunId> {
        self.parent_run_id.as_ref()
    }

    pub fn swarm_id(&self) -> Option<&str> {
        self.swarm_id.as_deref()
    }

    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }

    pub fn step_config(&self) -> Option<&serde_json::Value> {
        self.step_config.as_ref()
    }

    pub fn usage_hints(&self) -> Option<&UsageHints> {
        self.usage_hints.as_ref()
    }

    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn get_env_var(&self, key: &str, default: &str) -> String {
        self.environment
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Typed user preference; a missing key or a value of the wrong shape
    /// yields `default`.
    pub fn get_user_preference<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.user_data
            .preferences
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default)
    }

    fn environment_name(&self) -> String {
        self.get_env_var(ENVIRONMENT_KEY, "development").to_lowercase()
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment_name().as_str(), "development" | "dev")
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment_name().as_str(), "production" | "prod")
    }

    /// Monotonic time since this context was constructed.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline; `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| (d - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Utc::now() >= d)
    }

    /// Token cancelled when this run (or any ancestor) is cancelled.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Forward a log line with this context's identity merged in.
    /// No-op when no logger is attached.
    pub fn log_context(&self, level: LogLevel, message: &str, extra: serde_json::Value) {
        let Some(logger) = &self.logger else {
            return;
        };

        let mut fields = serde_json::Map::new();
        fields.insert("runId".into(), self.run_id.0.clone().into());
        fields.insert("routineId".into(), self.routine_id.clone().into());
        if let Some(step) = &self.current_step_id {
            fields.insert("stepId".into(), step.clone().into());
        }
        if let Some(parent) = &self.parent_run_id {
            fields.insert("parentRunId".into(), parent.0.clone().into());
        }
        if let Some(swarm) = &self.swarm_id {
            fields.insert("swarmId".into(), swarm.clone().into());
        }
        match extra {
            serde_json::Value::Object(map) => fields.extend(map),
            serde_json::Value::Null => {}
            other => {
                fields.insert("extra".into(), other);
            }
        }

        logger.log(level, message, &fields);
    }

    pub fn to_config(&self) -> RunContextConfig {
        RunContextConfig {
            run_id: Some(self.run_id.clone()),
            routine_id: self.routine_id.clone(),
            routine_name: self.routine_name.clone(),
            current_step_id: self.current_step_id.clone(),
            parent_run_id: self.parent_run_id.clone(),
            swarm_id: self.swarm_id.clone(),
            user_data: self.user_data.clone(),
            environment: self.environment.clone(),
            step_config: self.step_config.clone(),
            usage_hints: self.usage_hints.clone(),
            metadata: self.metadata.clone(),
            created_at: Some(self.created_at),
            deadline: self.deadline,
        }
    }

    pub fn to_summary(&self) -> RunContextSummary {
        RunContextSummary {
            run_id: self.run_id.clone(),
            routine_id: self.routine_id.clone(),
            routine_name: self.routine_name.clone(),
            current_step_id: self.current_step_id.clone(),
            parent_run_id: self.parent_run_id.clone(),
            swarm_id: self.swarm_id.clone(),
            user_id: self.user_data.id.clone(),
            environment: self.environment_name(),
            elapsed_ms: self.elapsed().as_millis() as u64,
            created_at: self.created_at,
        }
    }
}

/// [`ContextLogger`] that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl ContextLogger for TracingLogger {
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) {
        let fields = serde_json::Value::Object(fields.clone());
        match level {
            LogLevel::Debug => tracing::debug!(context = %fields, "{}", message),
            LogLevel::Info => tracing::info!(context = %fields, "{}", message),
            LogLevel::Warn => tracing::warn!(context = %fields, "{}", message),
            LogLevel::Error => tracing::error!(context = %fields, "{}", message),
        }
    }
}
