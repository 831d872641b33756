use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use strata_core::config::ResourcesConfig;
use strata_core::error::{Result, StrataError};

use crate::catalog::Catalog;
use crate::health::{
    build_health_check, HealthCheckReport, RegisteredResource, ResourceHealth, SystemHealth,
};

/// Lifecycle position of one catalog resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "health")]
pub enum ResourceState {
    #[default]
    Unregistered,
    Registered,
    Enabled(ResourceHealth),
    Disabled,
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unregistered => f.write_str("unregistered"),
            Self::Registered => f.write_str("registered"),
            Self::Enabled(ResourceHealth::Unknown) => f.write_str("enabled"),
            Self::Enabled(ResourceHealth::Healthy) => f.write_str("enabled (healthy)"),
            Self::Enabled(ResourceHealth::Unhealthy) => f.write_str("enabled (unhealthy)"),
            Self::Disabled => f.write_str("disabled"),
        }
    }
}

/// Events that move a resource through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Register,
    Deregister,
    Enable,
    Disable,
    ProbeSucceeded,
    ProbeFailed,
}

impl ResourceState {
    /// Apply a transition. Enabling or disabling twice is a no-op; every
    /// other move not listed in the lifecycle is rejected.
    pub fn apply(self, transition: Transition) -> std::result::Result<Self, &'static str> {
        use ResourceState::*;
        use Transition::*;

        match (self, transition) {
            (Unregistered, Register) => Ok(Registered),
            (_, Register) => Err("already registered"),
            (Unregistered, _) => Err("not registered"),
            (_, Deregister) => Ok(Unregistered),
            (Registered | Disabled, Enable) => Ok(Enabled(ResourceHealth::Unknown)),
            (Enabled(h), Enable) => Ok(Enabled(h)),
            (_, Disable) => Ok(Disabled),
            (Enabled(_), ProbeSucceeded) => Ok(Enabled(ResourceHealth::Healthy)),
            (Enabled(_), ProbeFailed) => Ok(Enabled(ResourceHealth::Unhealthy)),
            (Registered | Disabled, ProbeSucceeded | ProbeFailed) => Err("not enabled"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RuntimeEntry {
    state: ResourceState,
    last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct RuntimeState {
    entries: HashMap<String, RuntimeEntry>,
    /// What the operator asked for, including ids nothing has registered
    /// and ids the catalog does not know.
    enabled: BTreeSet<String>,
}

/// Catalog plus runtime state for every resource.
///
/// Built once and shared; state changes come from deployment (register),
/// the operator (enable/disable) and the external health probe.
#[derive(Debug)]
pub struct ResourceRegistry {
    catalog: Catalog,
    state: RwLock<RuntimeState>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new(Catalog::builtin())
    }
}

impl ResourceRegistry {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            state: RwLock::new(RuntimeState::default()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn read(&self) -> RwLockReadGuard<'_, RuntimeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RuntimeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self, id: &str) -> Result<ResourceState> {
        if !self.catalog.contains(id) {
            return Err(StrataError::UnknownResource(id.to_string()));
        }
        Ok(self.read().entries.get(id).map(|e| e.state).unwrap_or_default())
    }

    fn transition(&self, id: &str, transition: Transition) -> Result<ResourceState> {
        if !self.catalog.contains(id) {
            return Err(StrataError::UnknownResource(id.to_string()));
        }
        let mut state = self.write();
        Self::transition_locked(&mut state, id, transition)
    }

    fn transition_locked(
        state: &mut RuntimeState,
        id: &str,
        transition: Transition,
    ) -> Result<ResourceState> {
        let entry = state.entries.entry(id.to_string()).or_default();
        let from = entry.state;
        let to = from.apply(transition).map_err(|message| StrataError::InvalidTransition {
            resource: id.to_string(),
            message: format!("cannot {:?} from {}: {}", transition, from, message),
        })?;

        entry.state = to;
        if matches!(transition, Transition::ProbeSucceeded | Transition::ProbeFailed) {
            entry.last_checked = Some(Utc::now());
        }
        match transition {
            Transition::Enable => {
                state.enabled.insert(id.to_string());
            }
            Transition::Disable => {
                state.enabled.remove(id);
            }
            _ => {}
        }
        if from != to {
            info!(resource = %id, from = %from, to = %to, "Resource state changed");
        } else {
            debug!(resource = %id, state = %to, "Resource state unchanged");
        }
        Ok(to)
    }

    /// Register a deployed implementation. A resource the operator already
    /// enabled goes straight to `Enabled`.
    pub fn register(&self, id: &str) -> Result<ResourceState> {
        if !self.catalog.contains(id) {
            return Err(StrataError::UnknownResource(id.to_string()));
        }
        let mut state = self.write();
        let registered = Self::transition_locked(&mut state, id, Transition::Register)?;
        if state.enabled.contains(id) {
            return Self::transition_locked(&mut state, id, Transition::Enable);
        }
        Ok(registered)
    }

    pub fn deregister(&self, id: &str) -> Result<ResourceState> {
        self.transition(id, Transition::Deregister)
    }

    pub fn enable(&self, id: &str) -> Result<ResourceState> {
        self.transition(id, Transition::Enable)
    }

    pub fn disable(&self, id: &str) -> Result<ResourceState> {
        self.transition(id, Transition::Disable)
    }

    /// Record the outcome of the external health probe.
    pub fn record_health(&self, id: &str, healthy: bool) -> Result<ResourceState> {
        let transition = if healthy {
            Transition::ProbeSucceeded
        } else {
            Transition::ProbeFailed
        };
        self.transition(id, transition)
    }

    /// Enable every resource listed in `[resources] enabled`.
    ///
    /// Every listed id is remembered as enabled, so health reports show the
    /// ones with no registered implementation as "not found". Returns the ids
    /// that could not be enabled yet.
    pub fn apply_config(&self, config: &ResourcesConfig) -> Vec<String> {
        let mut state = self.write();
        let mut rejected = Vec::new();
        for id in &config.enabled {
            let outcome = if self.catalog.contains(id) {
                Self::transition_locked(&mut state, id, Transition::Enable).map(|_| ())
            } else {
                Err(StrataError::UnknownResource(id.clone()))
            };
            if let Err(e) = outcome {
                warn!(resource = %id, error = %e, "Configured resource not available");
                rejected.push(id.clone());
            }
            state.enabled.insert(id.clone());
        }
        rejected
    }

    /// Ids the operator has enabled, sorted.
    pub fn enabled_ids(&self) -> Vec<String> {
        self.read().enabled.iter().cloned().collect()
    }

    /// Whether a behavior referencing `id` may fire: enabled and last probed healthy.
    pub fn is_usable(&self, id: &str) -> bool {
        matches!(
            self.read().entries.get(id).map(|e| e.state),
            Some(ResourceState::Enabled(ResourceHealth::Healthy))
        )
    }

    /// Registered resources and enabled ids, in the shape the aggregation takes.
    pub fn snapshot(&self) -> (Vec<RegisteredResource>, Vec<String>) {
        let state = self.read();
        let mut registered = Vec::new();

        for definition in self.catalog.entries() {
            let Some(entry) = state.entries.get(&definition.id) else {
                continue;
            };
            let health = match entry.state {
                ResourceState::Unregistered => continue,
                ResourceState::Enabled(health) => health,
                ResourceState::Registered | ResourceState::Disabled => ResourceHealth::Unknown,
            };
            registered.push(RegisteredResource {
                id: definition.id.clone(),
                category: definition.category,
                health,
                disabled: entry.state == ResourceState::Disabled,
                last_checked: entry.last_checked,
            });
        }
        (registered, state.enabled.iter().cloned().collect())
    }

    pub fn health_check(&self) -> HealthCheckReport {
        let (registered, enabled) = self.snapshot();
        build_health_check(&self.catalog, &registered, &enabled)
    }

    pub fn system_health(&self) -> SystemHealth {
        self.health_check().status
    }
}
