use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use strata_core::error::{Result, StrataError};

use crate::behavior::Behavior;
use crate::bot_config::BotConfig;

/// Stored agent row. Only the bot flag and settings blob are interpreted;
/// every other column rides along in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub bot_settings: Value,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AgentRecord {
    pub fn bot(id: impl Into<String>, config: &BotConfig) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            is_bot: true,
            bot_settings: config.encode()?,
            fields: Map::new(),
        })
    }

    pub fn bot_config(&self) -> Result<BotConfig> {
        BotConfig::decode(&self.bot_settings)
    }

    pub fn set_bot_config(&mut self, config: &BotConfig) -> Result<()> {
        self.bot_settings = config.encode()?;
        Ok(())
    }
}

/// Black-box persistence for agent records.
pub trait AgentStore: Send + Sync + 'static {
    fn load(&self, id: &str) -> BoxFuture<'_, Result<Option<AgentRecord>>>;

    fn save(&self, record: AgentRecord) -> BoxFuture<'_, Result<()>>;
}

/// Process-local [`AgentStore`].
#[derive(Debug, Default)]
pub struct InMemoryAgentStore {
    records: Mutex<HashMap<String, AgentRecord>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = AgentRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: Mutex::new(map),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AgentStore for InMemoryAgentStore {
    fn load(&self, id: &str) -> BoxFuture<'_, Result<Option<AgentRecord>>> {
        let record = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        Box::pin(async move { Ok(record) })
    }

    fn save(&self, record: AgentRecord) -> BoxFuture<'_, Result<()>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record);
        Box::pin(async { Ok(()) })
    }
}

/// Partial update to an agent's spec. `None` leaves a field as stored.
#[derive(Debug, Clone, Default)]
pub struct AgentSpecPatch {
    pub goal: Option<String>,
    pub behaviors: Option<Vec<Behavior>>,
    pub subscriptions: Option<Vec<String>>,
}

impl AgentSpecPatch {
    pub fn is_empty(&self) -> bool {
        self.goal.is_none() && self.behaviors.is_none() && self.subscriptions.is_none()
    }

    pub fn apply(self, config: &BotConfig) -> BotConfig {
        let mut next = config.clone();
        if let Some(goal) = self.goal {
            next = next.with_goal(goal);
        }
        if let Some(behaviors) = self.behaviors {
            next = next.with_behaviors(behaviors);
        }
        if let Some(subscriptions) = self.subscriptions {
            next = next.with_subscriptions(subscriptions);
        }
        next
    }
}

/// Read-modify-write an agent's bot settings.
///
/// The new config is derived from the stored one, so fields the patch does
/// not name (and fields this crate does not model) are preserved. Returns
/// the config that was written.
pub async fn update_agent_spec(
    store: &dyn AgentStore,
    id: &str,
    patch: AgentSpecPatch,
) -> Result<BotConfig> {
    let mut record = store
        .load(id)
        .await?
        .ok_or_else(|| StrataError::AgentNotFound(id.to_string()))?;
    if !record.is_bot {
        return Err(StrataError::Config(format!("agent {} is not a bot", id)));
    }

    let current = record.bot_config()?;
    if patch.is_empty() {
        return Ok(current);
    }
    let updated = patch.apply(&current);
    record.set_bot_config(&updated)?;
    store.save(record).await?;

    info!(agent_id = %id, "Updated agent spec");
    Ok(updated)
}
