//! Test stubs for the capability traits in `strata-core`, plus fixtures.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use strata_core::error::{BusError, Result, StrataError};
use strata_core::event::ExecutionEvent;
use strata_core::traits::{EventBus, LlmProvider};
use strata_core::types::{
    CompletionRequest, CompletionResponse, FinishReason, TokenUsage, UserData,
};
use strata_core::RunContextConfig;

/// Event bus that fails on a script and records every attempt.
#[derive(Default)]
pub struct ScriptedBus {
    remaining_failures: Mutex<u32>,
    fail_types: Vec<String>,
    events: Mutex<Vec<ExecutionEvent>>,
}

impl ScriptedBus {
    pub fn reliable() -> Self {
        Self::default()
    }

    /// Fail the first `n` attempts (across all events), then succeed.
    pub fn failing(n: u32) -> Self {
        Self {
            remaining_failures: Mutex::new(n),
            ..Default::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    /// Always fail events of the given type.
    pub fn fail_types(mut self, types: &[&str]) -> Self {
        self.fail_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Every attempt seen, in arrival order.
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }

    pub fn attempts(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl EventBus for ScriptedBus {
    fn publish(&self, event: &ExecutionEvent) -> BoxFuture<'_, std::result::Result<(), BusError>> {
        self.events.lock().unwrap().push(event.clone());
        let fail = if self.fail_types.contains(&event.event_type) {
            true
        } else {
            let mut remaining = self.remaining_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        };
        Box::pin(async move {
            if fail {
                Err(BusError::transient("scripted bus failure"))
            } else {
                Ok(())
            }
        })
    }
}

/// How a [`MockProvider`] answers its availability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Available,
    Unavailable,
    Error,
}

/// LLM provider with canned answers and call counters.
pub struct MockProvider {
    name: String,
    reply: String,
    probe: Probe,
    fail_with: Option<String>,
    complete_calls: AtomicU32,
    probe_calls: AtomicU32,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reply: format!("reply from {}", name),
            probe: Probe::Available,
            fail_with: None,
            complete_calls: AtomicU32::new(0),
            probe_calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = probe;
        self
    }

    /// Make `complete` fail with an `LlmRequest` error.
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn complete_calls(&self) -> u32 {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<CompletionResponse>> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let prompt_tokens = request.prompt.split_whitespace().count() as u32;
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| format!("{}-default", self.name));
        *self.last_request.lock().unwrap() = Some(request);

        Box::pin(async move {
            if let Some(message) = &self.fail_with {
                return Err(StrataError::LlmRequest {
                    provider: self.name.clone(),
                    message: message.clone(),
                });
            }
            let completion_tokens = self.reply.split_whitespace().count() as u32;
            Ok(CompletionResponse {
                text: self.reply.clone(),
                usage: TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                },
                model,
                finish_reason: FinishReason::Stop,
            })
        })
    }

    fn is_available(&self) -> BoxFuture<'_, Result<bool>> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let probe = self.probe;
        let name = self.name.clone();
        Box::pin(async move {
            match probe {
                Probe::Available => Ok(true),
                Probe::Unavailable => Ok(false),
                Probe::Error => Err(StrataError::ProviderUnavailable(format!(
                    "{}: probe timed out",
                    name
                ))),
            }
        })
    }
}

pub fn user(id: &str) -> UserData {
    UserData::new(id)
}

pub fn admin_user(id: &str) -> UserData {
    UserData {
        is_admin: true,
        ..UserData::new(id)
    }
}

pub fn context_config(routine_id: &str) -> RunContextConfig {
    RunContextConfig {
        routine_id: routine_id.to_string(),
        routine_name: format!("Routine {}", routine_id),
        user_data: user("user-1"),
        ..Default::default()
    }
}
