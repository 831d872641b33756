use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use strata_core::error::{Result, StrataError};

use crate::behavior::Behavior;

/// Version written by [`BotConfig::encode`].
pub const CURRENT_VERSION: &str = "1.0";

/// Agent configuration persisted on an agent record as a structured blob.
///
/// Fields this type does not model are kept in `extra` so that deriving a new
/// config from an old one never drops data written by someone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    pub version: String,
    #[serde(default)]
    pub resources: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_spec: Option<AgentSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Goal, reactive behaviors and topic subscriptions of one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default)]
    pub behaviors: Vec<Behavior>,
    #[serde(default)]
    pub subscriptions: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            resources: Vec::new(),
            model_config: None,
            max_tokens: None,
            agent_spec: None,
            extra: Map::new(),
        }
    }
}

impl BotConfig {
    /// Decode a stored blob.
    ///
    /// A blob without a version predates versioning and is read as the
    /// current version. Any other version is rejected. `null` decodes as an
    /// empty config.
    pub fn decode(value: &Value) -> Result<Self> {
        let mut object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map.clone(),
            other => {
                return Err(StrataError::Config(format!(
                    "bot config must be an object, got {}",
                    json_kind(other)
                )))
            }
        };

        match object.get("version") {
            None | Some(Value::Null) => {
                debug!("Migrating unversioned bot config to {}", CURRENT_VERSION);
                object.insert("version".into(), Value::from(CURRENT_VERSION));
            }
            Some(Value::String(v)) if v == CURRENT_VERSION => {}
            Some(other) => {
                let version = other.as_str().map_or_else(|| other.to_string(), str::to_string);
                return Err(StrataError::UnsupportedConfigVersion(version));
            }
        }

        Ok(serde_json::from_value(Value::Object(object))?)
    }

    pub fn encode(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn spec(&self) -> Option<&AgentSpec> {
        self.agent_spec.as_ref()
    }

    fn derive_spec(&self, update: impl FnOnce(&mut AgentSpec)) -> Self {
        let mut next = self.clone();
        update(next.agent_spec.get_or_insert_with(AgentSpec::default));
        next
    }

    /// New config with the goal replaced; everything else carried over.
    pub fn with_goal(&self, goal: impl Into<String>) -> Self {
        let goal = goal.into();
        self.derive_spec(|spec| spec.goal = Some(goal))
    }

    pub fn with_behaviors(&self, behaviors: Vec<Behavior>) -> Self {
        self.derive_spec(|spec| spec.behaviors = behaviors)
    }

    pub fn with_subscriptions(&self, subscriptions: Vec<String>) -> Self {
        self.derive_spec(|spec| spec.subscriptions = subscriptions)
    }

    /// Behaviors whose trigger matches `topic`, in declaration order.
    pub fn behaviors_for(&self, topic: &str) -> Vec<&Behavior> {
        self.agent_spec
            .iter()
            .flat_map(|spec| spec.behaviors.iter())
            .filter(|b| b.fires_on(topic))
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
