mod doctor;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strata_agent::{AllocationProfile, SwarmTaskFactory, SwarmTaskRequest};
use strata_core::config::LogConfig;
use strata_core::types::UserData;
use strata_core::{AppConfig, BroadcastBus, EventPublisher, PublishOptions};
use strata_resources::{RegisteredResource, ResourceHealth, ResourceRegistry};

#[derive(Parser)]
#[command(name = "strata", version, about = "Tiered execution core for agent swarms")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "strata.toml", env = "STRATA_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show effective configuration
    Config,
    /// Check configuration for problems
    Doctor,
    /// Aggregate resource health from a probe snapshot
    Health {
        /// JSON file with registered resources and probe results
        #[arg(long)]
        state: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build a swarm execution task and print its wire form
    Task {
        /// Goal for the swarm
        #[arg(trailing_var_arg = true, required = true)]
        goal: Vec<String>,
        /// Requesting user id
        #[arg(long, default_value = "local")]
        user: String,
        #[arg(long)]
        admin: bool,
        #[arg(long)]
        premium: bool,
        /// Allocation profile: standard, elevated, constrained
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        swarm_id: Option<String>,
        #[arg(long)]
        parent_swarm_id: Option<String>,
        #[arg(long)]
        max_credits: Option<u64>,
        #[arg(long)]
        max_duration_ms: Option<u64>,
        #[arg(long)]
        max_memory_mb: Option<u64>,
        #[arg(long)]
        max_concurrent_steps: Option<u32>,
    },
    /// Publish one event through the configured publisher and print it
    Publish {
        /// Event type, e.g. "lifecycle.state_changed"
        event_type: String,
        /// JSON payload
        #[arg(default_value = "{}")]
        data: String,
        #[arg(long)]
        correlation_id: Option<String>,
    },
}

/// Probe snapshot accepted by `strata health --state`.
#[derive(Debug, Default, Deserialize)]
struct HealthState {
    #[serde(default)]
    registered: Vec<RegisteredResource>,
    /// Overrides `[resources] enabled` when present.
    #[serde(default)]
    enabled: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_tracing(config.log.as_ref());

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Doctor => {
            println!("Strata Doctor");
            println!("=============");
            doctor::run_doctor(&config);
        }
        Commands::Health { state, json } => {
            let state = match state {
                Some(path) => read_health_state(&path)?,
                None => HealthState::default(),
            };
            let registry = build_registry(&config, state);
            let health = registry.health_check();
            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                report::print_health(&health);
            }
        }
        Commands::Task {
            goal,
            user,
            admin,
            premium,
            profile,
            swarm_id,
            parent_swarm_id,
            max_credits,
            max_duration_ms,
            max_memory_mb,
            max_concurrent_steps,
        } => {
            let user_data = UserData {
                is_admin: admin,
                has_premium: premium,
                ..UserData::new(user)
            };
            let mut request = SwarmTaskRequest::new(goal.join(" "), user_data);
            request.swarm_id = swarm_id;
            request.parent_swarm_id = parent_swarm_id;
            request.profile = profile
                .as_deref()
                .map(str::parse::<AllocationProfile>)
                .transpose()?;
            request.allocation.max_credits = max_credits;
            request.allocation.max_duration_ms = max_duration_ms;
            request.allocation.max_memory_mb = max_memory_mb;
            request.allocation.max_concurrent_steps = max_concurrent_steps;

            let task = SwarmTaskFactory::new(config.swarm.clone()).build(request)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Commands::Publish {
            event_type,
            data,
            correlation_id,
        } => {
            let data: serde_json::Value =
                serde_json::from_str(&data).context("event data must be valid JSON")?;
            let bus = Arc::new(BroadcastBus::default());
            let mut events = bus.subscribe();
            let publisher = EventPublisher::new(bus, config.publisher.clone());

            let options = PublishOptions {
                correlation_id,
                ..Default::default()
            };
            let receipt = publisher.publish(event_type, data, options).await?;
            info!(event_id = %receipt.event_id, attempts = receipt.attempts, "Event published");

            let event = events.recv().await?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        // Tracing is not up yet.
        eprintln!("{} not found, using defaults", path.display());
        Ok(AppConfig::default())
    }
}

fn init_tracing(log: Option<&LogConfig>) {
    let defaults = LogConfig::default();
    let log = log.unwrap_or(&defaults);
    let filter = EnvFilter::try_from_env("STRATA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&log.filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(log.with_target)
        .with_writer(std::io::stderr)
        .init();
}

fn read_health_state(path: &Path) -> anyhow::Result<HealthState> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading health state {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Replay a probe snapshot into a fresh registry: register, enable per
/// config (or the snapshot's override), then record probe results.
fn build_registry(config: &AppConfig, state: HealthState) -> ResourceRegistry {
    let registry = ResourceRegistry::default();
    for resource in &state.registered {
        if let Err(e) = registry.register(&resource.id) {
            warn!(resource = %resource.id, error = %e, "Skipping registered resource");
        }
    }

    let mut resources = config.resources.clone();
    if let Some(enabled) = state.enabled {
        resources.enabled = enabled;
    }
    let rejected = registry.apply_config(&resources);
    if !rejected.is_empty() {
        warn!(
            count = rejected.len(),
            resources = %rejected.join(","),
            "Enabled resources without a registered implementation"
        );
    }

    for resource in &state.registered {
        if resource.disabled && !registry.enabled_ids().contains(&resource.id) {
            if let Err(e) = registry.disable(&resource.id) {
                warn!(resource = %resource.id, error = %e, "Could not replay disabled state");
            }
            continue;
        }
        let healthy = match resource.health {
            ResourceHealth::Healthy => true,
            ResourceHealth::Unhealthy => false,
            ResourceHealth::Unknown => continue,
        };
        let enabled = registry
            .state(&resource.id)
            .map(|s| s.is_enabled())
            .unwrap_or(false);
        if enabled {
            if let Err(e) = registry.record_health(&resource.id, healthy) {
                warn!(resource = %resource.id, error = %e, "Could not replay probe result");
            }
        }
    }
    registry
}
