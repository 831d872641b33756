pub mod behavior;
pub mod bot_config;
pub mod record;
pub mod swarm;
pub mod team;

pub use behavior::{Behavior, BehaviorAction, Trigger};
pub use bot_config::{AgentSpec, BotConfig};
pub use record::{update_agent_spec, AgentRecord, AgentSpecPatch, AgentStore, InMemoryAgentStore};
pub use swarm::{
    AllocationOverrides, AllocationProfile, ExecutionScope, SwarmExecutionTask, SwarmTaskFactory,
    SwarmTaskRequest,
};
pub use team::TeamConfiguration;
