use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use crate::publisher::PublisherConfig;
use crate::types::ResourceAllocation;

/// Top-level Strata configuration (`strata.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub swarm: SwarmConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

/// Defaults for the LLM service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider made default at startup. When unset, the first registered
    /// provider becomes the default.
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_max_tokens() -> u32 { 1000 }
fn default_temperature() -> f32 { 0.7 }

/// Allocation ceilings per swarm profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default = "default_standard_allocation")]
    pub standard: ResourceAllocation,
    /// Admin and premium accounts.
    #[serde(default = "default_elevated_allocation")]
    pub elevated: ResourceAllocation,
    /// Tests, previews and other tightly bounded runs.
    #[serde(default = "default_constrained_allocation")]
    pub constrained: ResourceAllocation,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            standard: default_standard_allocation(),
            elevated: default_elevated_allocation(),
            constrained: default_constrained_allocation(),
        }
    }
}

fn default_standard_allocation() -> ResourceAllocation {
    ResourceAllocation::new(5_000, 30 * 60 * 1000, 512, 5)
}
fn default_elevated_allocation() -> ResourceAllocation {
    ResourceAllocation::new(50_000, 2 * 60 * 60 * 1000, 2048, 10)
}
fn default_constrained_allocation() -> ResourceAllocation {
    ResourceAllocation::new(1_000, 5 * 60 * 1000, 256, 2)
}

/// Operator choice of enabled integrations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive. Default: "strata=info,warn".
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Include the event target in log lines.
    #[serde(default)]
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            with_target: false,
        }
    }
}

fn default_log_filter() -> String { "strata=info,warn".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StrataError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parse config text, expanding `${ENV_VAR}` references first.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| StrataError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
