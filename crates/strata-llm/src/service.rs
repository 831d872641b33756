use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use strata_core::config::LlmConfig;
use strata_core::error::{Result, StrataError};
use strata_core::event::types as event_types;
use strata_core::publisher::{EventPublisher, PublishOptions};
use strata_core::traits::LlmProvider;
use strata_core::types::{CompletionRequest, CompletionResponse};

use crate::prompts;
use crate::registry::ProviderRegistry;

/// Per-call overrides for [`LlmService::complete`].
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Provider name. Falls back to the default provider when unset.
    pub provider: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// Correlation id stamped on the telemetry events.
    pub correlation_id: Option<String>,
}

impl CompletionOptions {
    pub fn provider(name: impl Into<String>) -> Self {
        Self {
            provider: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Availability of one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: String,
    pub available: bool,
    pub is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request façade over the provider registry.
///
/// Construct it once at startup, register providers, then share it behind an
/// `Arc`. Completion telemetry goes through the optional publisher and never
/// replaces the outcome of the call it describes.
pub struct LlmService {
    registry: RwLock<ProviderRegistry>,
    defaults: LlmConfig,
    telemetry: Option<EventPublisher>,
}

impl std::fmt::Debug for LlmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.read_registry();
        f.debug_struct("LlmService")
            .field("providers", &registry.names())
            .field("default", &registry.default_name())
            .field("telemetry", &self.telemetry.is_some())
            .finish()
    }
}

impl LlmService {
    pub fn new(defaults: LlmConfig) -> Self {
        Self {
            registry: RwLock::new(ProviderRegistry::new()),
            defaults,
            telemetry: None,
        }
    }

    /// Build a service from configuration and a provider set in one startup
    /// step. `defaults.default_provider`, when set, must name one of the
    /// providers.
    pub fn with_providers(
        defaults: LlmConfig,
        providers: Vec<Arc<dyn LlmProvider>>,
    ) -> Result<Self> {
        let configured_default = defaults.default_provider.clone();
        let service = Self::new(defaults);
        for provider in providers {
            service.register_provider(provider);
        }
        if let Some(name) = configured_default {
            service.set_default_provider(&name)?;
        }
        Ok(service)
    }

    pub fn with_telemetry(mut self, publisher: EventPublisher) -> Self {
        self.telemetry = Some(publisher);
        self
    }

    pub fn defaults(&self) -> &LlmConfig {
        &self.defaults
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, ProviderRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, ProviderRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a provider; it becomes the default if none is set yet.
    pub fn register_provider(&self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        let became_default = self.write_registry().register(provider);
        info!(provider = %name, default = became_default, "Registered LLM provider");
    }

    /// Register a provider and make it the default regardless of order.
    pub fn register_default_provider(&self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        self.write_registry().register_as_default(provider);
        info!(provider = %name, "Registered default LLM provider");
    }

    pub fn set_default_provider(&self, name: &str) -> Result<()> {
        self.write_registry().set_default(name)
    }

    pub fn default_provider(&self) -> Option<String> {
        self.read_registry().default_name().map(str::to_string)
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.read_registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Run one completion.
    ///
    /// Provider resolution happens before any I/O: with no default configured,
    /// or an unknown name, this returns a configuration error without probing
    /// or publishing anything.
    pub async fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
    ) -> Result<CompletionResponse> {
        let provider = self.read_registry().resolve(options.provider.as_deref())?;
        let provider_name = provider.name().to_string();

        let request = CompletionRequest {
            prompt: prompt.to_string(),
            max_tokens: Some(options.max_tokens.unwrap_or(self.defaults.max_tokens)),
            temperature: Some(options.temperature.unwrap_or(self.defaults.temperature)),
            model: options.model,
            system_prompt: options.system_prompt,
        };

        let started = Instant::now();
        let result = Self::call(provider.as_ref(), request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                debug!(
                    provider = %provider_name,
                    model = %response.model,
                    total_tokens = response.usage.total_tokens,
                    duration_ms,
                    "LLM completion finished"
                );
                let data = json!({
                    "provider": provider_name,
                    "model": response.model,
                    "usage": response.usage,
                    "finishReason": response.finish_reason,
                    "durationMs": duration_ms,
                });
                self.emit(event_types::COMPLETION_REQUESTED, data, options.correlation_id)
                    .await;
                Ok(response)
            }
            Err(e) => {
                warn!(provider = %provider_name, error = %e, duration_ms, "LLM completion failed");
                let data = json!({
                    "provider": provider_name,
                    "error": e.to_string(),
                    "durationMs": duration_ms,
                });
                self.emit(event_types::COMPLETION_FAILED, data, options.correlation_id)
                    .await;
                Err(e)
            }
        }
    }

    async fn call(
        provider: &dyn LlmProvider,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        if !provider.is_available().await? {
            return Err(StrataError::ProviderUnavailable(provider.name().to_string()));
        }
        provider.complete(request).await
    }

    async fn emit(&self, event_type: &str, data: serde_json::Value, correlation_id: Option<String>) {
        let Some(publisher) = &self.telemetry else {
            return;
        };
        let options = PublishOptions {
            correlation_id,
            ..PublishOptions::suppress_errors()
        };
        // Delivery failures are logged by the publisher and not returned.
        let _ = publisher.publish(event_type, data, options).await;
    }

    /// Ask for a strategic assessment of `context` at low temperature.
    pub async fn analyze_strategically(
        &self,
        context: &str,
        question: &str,
        options: CompletionOptions,
    ) -> Result<String> {
        let options = options
            .with_system_prompt(prompts::STRATEGIC_SYSTEM_PROMPT)
            .with_temperature(prompts::STRATEGIC_TEMPERATURE);
        let response = self
            .complete(&prompts::strategic_prompt(context, question), options)
            .await?;
        Ok(response.text)
    }

    /// Pick one of `choices` for the given situation.
    pub async fn generate_decision(
        &self,
        situation: &str,
        choices: &[String],
        options: CompletionOptions,
    ) -> Result<String> {
        let options = options
            .with_system_prompt(prompts::DECISION_SYSTEM_PROMPT)
            .with_temperature(prompts::DECISION_TEMPERATURE);
        let response = self
            .complete(&prompts::decision_prompt(situation, choices), options)
            .await?;
        Ok(response.text)
    }

    /// Probe every registered provider. A failing probe marks that provider
    /// unavailable; it never fails the whole call.
    pub async fn get_provider_status(&self) -> Vec<ProviderStatus> {
        let (providers, default) = {
            let registry = self.read_registry();
            (registry.providers(), registry.default_name().map(str::to_string))
        };

        let probes = providers.iter().map(|p| p.is_available());
        let results = join_all(probes).await;

        providers
            .iter()
            .zip(results)
            .map(|(provider, result)| {
                let name = provider.name().to_string();
                let is_default = default.as_deref() == Some(name.as_str());
                match result {
                    Ok(available) => ProviderStatus {
                        name,
                        available,
                        is_default,
                        error: None,
                    },
                    Err(e) => {
                        warn!(provider = %name, error = %e, "Provider availability probe failed");
                        ProviderStatus {
                            name,
                            available: false,
                            is_default,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::publisher::PublisherConfig;
    use strata_core::retry::RetryPolicy;
    use strata_core::types::{FinishReason, Tier};
    use strata_test_utils::{MockProvider, Probe, ScriptedBus};

    fn telemetry(bus: Arc<ScriptedBus>) -> EventPublisher {
        let config =
            PublisherConfig::new(Tier::CrossCutting, "llm").with_retry(RetryPolicy::fixed(0, 0));
        EventPublisher::new(bus, config)
    }

    fn service_with(bus: Arc<ScriptedBus>) -> LlmService {
        LlmService::new(LlmConfig::default()).with_telemetry(telemetry(bus))
    }

    #[tokio::test]
    async fn test_no_provider_fails_before_io() {
        let bus = Arc::new(ScriptedBus::reliable());
        let service = service_with(bus.clone());

        let err = service.complete("hello", CompletionOptions::default()).await.unwrap_err();
        assert!(matches!(err, StrataError::NoProviderConfigured));
        assert!(err.is_configuration());
        assert_eq!(bus.attempts(), 0);
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_before_io() {
        let bus = Arc::new(ScriptedBus::reliable());
        let service = service_with(bus.clone());
        let alpha = MockProvider::new("alpha").arc();
        service.register_provider(alpha.clone());

        let err = service
            .complete("hello", CompletionOptions::provider("gamma"))
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::UnknownProvider(ref n) if n == "gamma"));
        assert_eq!(alpha.probe_calls(), 0);
        assert_eq!(alpha.complete_calls(), 0);
        assert_eq!(bus.attempts(), 0);
    }

    #[tokio::test]
    async fn test_complete_applies_defaults_and_reports_usage() {
        let bus = Arc::new(ScriptedBus::reliable());
        let service = service_with(bus.clone());
        let alpha = MockProvider::new("alpha").with_reply("go north").arc();
        service.register_provider(alpha.clone());

        let response = service
            .complete("where now", CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(response.text, "go north");
        assert_eq!(response.finish_reason, FinishReason::Stop);

        let request = alpha.last_request().unwrap();
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(request.temperature, Some(0.7));

        let events = bus.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, event_types::COMPLETION_REQUESTED);
        assert_eq!(events[0].data["provider"], "alpha");
        assert_eq!(events[0].data["usage"]["totalTokens"], 4);
        assert_eq!(events[0].data["finishReason"], "stop");
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_not_called() {
        let bus = Arc::new(ScriptedBus::reliable());
        let service = service_with(bus.clone());
        let alpha = MockProvider::new("alpha").with_probe(Probe::Unavailable).arc();
        service.register_provider(alpha.clone());

        let err = service.complete("hi", CompletionOptions::default()).await.unwrap_err();
        assert!(matches!(err, StrataError::ProviderUnavailable(_)));
        assert_eq!(alpha.complete_calls(), 0);
        assert_eq!(bus.event_types(), vec![event_types::COMPLETION_FAILED]);
    }

    #[tokio::test]
    async fn test_provider_error_is_returned_unchanged() {
        let bus = Arc::new(ScriptedBus::reliable());
        let service = service_with(bus.clone());
        service.register_provider(MockProvider::new("alpha").failing("rate limited").arc());

        let err = service.complete("hi", CompletionOptions::default()).await.unwrap_err();
        match err {
            StrataError::LlmRequest { provider, message } => {
                assert_eq!(provider, "alpha");
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let events = bus.events();
        assert_eq!(events[0].event_type, event_types::COMPLETION_FAILED);
        assert!(events[0].data["error"].as_str().unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_probe_error_is_returned_unchanged() {
        let bus = Arc::new(ScriptedBus::reliable());
        let service = service_with(bus.clone());
        service.register_provider(MockProvider::new("alpha").with_probe(Probe::Error).arc());

        let err = service.complete("hi", CompletionOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("probe timed out"));
        assert_eq!(bus.event_types(), vec![event_types::COMPLETION_FAILED]);
    }

    #[tokio::test]
    async fn test_broken_telemetry_does_not_mask_success() {
        let bus = Arc::new(ScriptedBus::always_failing());
        let service = service_with(bus.clone());
        service.register_provider(MockProvider::new("alpha").arc());

        let response = service.complete("hi", CompletionOptions::default()).await;
        assert!(response.is_ok());
        assert_eq!(bus.attempts(), 1);
    }

    #[tokio::test]
    async fn test_explicit_provider_overrides_default() {
        let service = LlmService::new(LlmConfig::default());
        let alpha = MockProvider::new("alpha").arc();
        let beta = MockProvider::new("beta").arc();
        service.register_provider(alpha.clone());
        service.register_provider(beta.clone());

        service.complete("hi", CompletionOptions::provider("beta")).await.unwrap();
        assert_eq!(alpha.complete_calls(), 0);
        assert_eq!(beta.complete_calls(), 1);
    }

    #[tokio::test]
    async fn test_strategic_wrappers_set_temperature() {
        let service = LlmService::new(LlmConfig::default());
        let alpha = MockProvider::new("alpha").arc();
        service.register_provider(alpha.clone());

        service
            .analyze_strategically("swarm stalled", "what next?", CompletionOptions::default())
            .await
            .unwrap();
        let request = alpha.last_request().unwrap();
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(
            request.system_prompt.as_deref(),
            Some(prompts::STRATEGIC_SYSTEM_PROMPT)
        );

        let choices = vec!["retry".to_string(), "abort".to_string()];
        service
            .generate_decision("step failed", &choices, CompletionOptions::default())
            .await
            .unwrap();
        let request = alpha.last_request().unwrap();
        assert_eq!(request.temperature, Some(0.5));
        assert!(request.prompt.contains("2. abort"));
    }

    #[test]
    fn test_with_providers_applies_configured_default() {
        let config = LlmConfig {
            default_provider: Some("beta".into()),
            ..Default::default()
        };
        let providers: Vec<Arc<dyn LlmProvider>> =
            vec![MockProvider::new("alpha").arc(), MockProvider::new("beta").arc()];
        let service = LlmService::with_providers(config, providers).unwrap();
        assert_eq!(service.default_provider().as_deref(), Some("beta"));
    }

    #[test]
    fn test_with_providers_rejects_unknown_default() {
        let config = LlmConfig {
            default_provider: Some("missing".into()),
            ..Default::default()
        };
        let providers: Vec<Arc<dyn LlmProvider>> = vec![MockProvider::new("alpha").arc()];
        let err = LlmService::with_providers(config, providers).unwrap_err();
        assert!(matches!(err, StrataError::UnknownProvider(_)));
    }

    #[tokio::test]
    async fn test_provider_status_tolerates_probe_errors() {
        let service = LlmService::new(LlmConfig::default());
        service.register_provider(MockProvider::new("alpha").arc());
        service.register_provider(MockProvider::new("beta").with_probe(Probe::Error).arc());
        service.register_provider(MockProvider::new("gamma").with_probe(Probe::Unavailable).arc());

        let status = service.get_provider_status().await;
        assert_eq!(status.len(), 3);
        assert!(status[0].available && status[0].is_default);
        assert!(!status[1].available);
        assert!(status[1].error.is_some());
        assert!(!status[2].available);
        assert!(status[2].error.is_none());
    }
}
