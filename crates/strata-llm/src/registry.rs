use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use strata_core::error::{Result, StrataError};
use strata_core::traits::LlmProvider;

/// Named LLM providers plus the default selection.
///
/// Owned by [`LlmService`](crate::LlmService); nothing reaches it through
/// global state.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    order: Vec<String>,
    default: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. The first one registered becomes the default
    /// when none has been chosen. Returns true if it became the default.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) -> bool {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), provider).is_some() {
            warn!(provider = %name, "Replacing registered LLM provider");
        } else {
            self.order.push(name.clone());
        }

        if self.default.is_none() {
            info!(provider = %name, "First registered LLM provider is the default");
            self.default = Some(name);
            true
        } else {
            false
        }
    }

    /// Register a provider and make it the default.
    pub fn register_as_default(&mut self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        self.register(provider);
        self.default = Some(name);
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.providers.contains_key(name) {
            return Err(StrataError::UnknownProvider(name.to_string()));
        }
        info!(provider = %name, "Default LLM provider set");
        self.default = Some(name.to_string());
        Ok(())
    }

    /// Remove a provider. If it was the default, the earliest remaining
    /// registration takes over.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        let removed = self.providers.remove(name)?;
        self.order.retain(|n| n != name);
        if self.default.as_deref() == Some(name) {
            self.default = self.order.first().cloned();
            warn!(removed = %name, default = ?self.default, "Default LLM provider unregistered");
        }
        Some(removed)
    }

    /// Pick the named provider, or the default when `name` is `None`.
    /// Pure lookup; never touches the network.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let name = match name {
            Some(n) => n,
            None => self
                .default
                .as_deref()
                .ok_or(StrataError::NoProviderConfigured)?,
        };
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| StrataError::UnknownProvider(name.to_string()))
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Provider names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Providers in registration order.
    pub fn providers(&self) -> Vec<Arc<dyn LlmProvider>> {
        self.order
            .iter()
            .filter_map(|n| self.providers.get(n).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
