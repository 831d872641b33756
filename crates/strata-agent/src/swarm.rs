use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use strata_core::config::SwarmConfig;
use strata_core::error::{Result, StrataError};
use strata_core::types::{ResourceAllocation, UserData};

use crate::team::TeamConfiguration;

/// Which default allocation ceiling a swarm gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationProfile {
    Standard,
    /// Admin and premium accounts.
    Elevated,
    /// Tests, previews and other tightly bounded runs.
    Constrained,
}

impl AllocationProfile {
    pub fn for_user(user: &UserData) -> Self {
        if user.is_elevated() {
            Self::Elevated
        } else {
            Self::Standard
        }
    }
}

impl std::str::FromStr for AllocationProfile {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(Self::Standard),
            "elevated" => Ok(Self::Elevated),
            "constrained" => Ok(Self::Constrained),
            other => Err(StrataError::InvalidAllocation(format!(
                "unknown allocation profile '{}'",
                other
            ))),
        }
    }
}

/// Caller-supplied allocation fields. Unset fields take the profile default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_credits: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
    #[serde(default, rename = "maxMemoryMB", skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_steps: Option<u32>,
}

impl AllocationOverrides {
    pub fn apply(&self, base: ResourceAllocation) -> ResourceAllocation {
        ResourceAllocation {
            max_credits: self.max_credits.unwrap_or(base.max_credits),
            max_duration_ms: self.max_duration_ms.unwrap_or(base.max_duration_ms),
            max_memory_mb: self.max_memory_mb.unwrap_or(base.max_memory_mb),
            max_concurrent_steps: self.max_concurrent_steps.unwrap_or(base.max_concurrent_steps),
        }
    }
}

/// A tool the swarm may use. Extra descriptor keys pass through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AvailableTool {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            extra: Map::new(),
        }
    }
}

/// Everything needed to build a [`SwarmExecutionTask`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmTaskRequest {
    /// Generated when absent.
    #[serde(default)]
    pub swarm_id: Option<String>,
    #[serde(default)]
    pub parent_swarm_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    pub goal: String,
    pub user_data: UserData,
    #[serde(default)]
    pub team_configuration: Option<TeamConfiguration>,
    #[serde(default)]
    pub available_tools: Vec<AvailableTool>,
    #[serde(default)]
    pub execution_config: Map<String, Value>,
    /// Chosen from the user when absent.
    #[serde(default)]
    pub profile: Option<AllocationProfile>,
    #[serde(default)]
    pub allocation: AllocationOverrides,
    #[serde(default)]
    pub options: Option<Value>,
}

impl SwarmTaskRequest {
    pub fn new(goal: impl Into<String>, user_data: UserData) -> Self {
        Self {
            goal: goal.into(),
            user_data,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmContext {
    pub swarm_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_swarm_id: Option<String>,
    pub user_data: UserData,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swarm_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_configuration: Option<TeamConfiguration>,
    #[serde(default)]
    pub available_tools: Vec<AvailableTool>,
    #[serde(default)]
    pub execution_config: Map<String, Value>,
    pub user_data: UserData,
}

/// Unit of work handed to the external scheduler when a swarm runs.
///
/// `allocation` is always fully populated. The ceilings are declared here and
/// enforced by whoever executes the task; [`execution_scope`](Self::execution_scope)
/// turns the duration budget into a cancellation signal for that executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmExecutionTask {
    pub id: String,
    pub context: SwarmContext,
    pub input: SwarmInput,
    pub allocation: ResourceAllocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl SwarmExecutionTask {
    pub fn swarm_id(&self) -> &str {
        &self.context.swarm_id
    }

    /// Wall-clock instant after which the duration budget is spent.
    pub fn deadline(&self) -> DateTime<Utc> {
        let budget = chrono::Duration::milliseconds(
            i64::try_from(self.allocation.max_duration_ms).unwrap_or(i64::MAX),
        );
        self.context
            .timestamp
            .checked_add_signed(budget)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }

    /// Start the duration budget now. The scope's token is a child of
    /// `parent` when given, so cancelling the parent cancels the swarm.
    pub fn execution_scope(&self, parent: Option<&CancellationToken>) -> ExecutionScope {
        let cancel = parent.map_or_else(CancellationToken::new, |p| p.child_token());
        let budget = Duration::from_millis(self.allocation.max_duration_ms);
        ExecutionScope {
            swarm_id: self.context.swarm_id.clone(),
            allocation: self.allocation,
            cancel,
            deadline: tokio::time::Instant::now() + budget,
        }
    }
}

/// Deadline and cancellation signal for one executing swarm task.
#[derive(Debug, Clone)]
pub struct ExecutionScope {
    swarm_id: String,
    allocation: ResourceAllocation,
    cancel: CancellationToken,
    deadline: tokio::time::Instant,
}

impl ExecutionScope {
    pub fn allocation(&self) -> &ResourceAllocation {
        &self.allocation
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline
            .saturating_duration_since(tokio::time::Instant::now())
    }

    /// Drive `work` until it finishes, the scope is cancelled, or the
    /// duration budget runs out. Running out also cancels the token so
    /// sibling work sharing the scope stops too.
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            result = work => result,
            _ = self.cancel.cancelled() => Err(StrataError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => {
                warn!(
                    swarm_id = %self.swarm_id,
                    budget_ms = self.allocation.max_duration_ms,
                    "Swarm duration budget exhausted"
                );
                self.cancel.cancel();
                Err(StrataError::DeadlineExceeded {
                    scope: format!("swarm {}", self.swarm_id),
                    budget_ms: self.allocation.max_duration_ms,
                })
            }
        }
    }
}

/// Builds [`SwarmExecutionTask`]s with profile defaults from `[swarm]`.
#[derive(Debug, Clone, Default)]
pub struct SwarmTaskFactory {
    config: SwarmConfig,
}

impl SwarmTaskFactory {
    pub fn new(config: SwarmConfig) -> Self {
        Self { config }
    }

    pub fn profile_allocation(&self, profile: AllocationProfile) -> ResourceAllocation {
        match profile {
            AllocationProfile::Standard => self.config.standard,
            AllocationProfile::Elevated => self.config.elevated,
            AllocationProfile::Constrained => self.config.constrained,
        }
    }

    pub fn build(&self, request: SwarmTaskRequest) -> Result<SwarmExecutionTask> {
        if request.goal.trim().is_empty() {
            return Err(StrataError::Config("swarm goal must not be empty".into()));
        }
        if let Some(team) = &request.team_configuration {
            team.validate()?;
        }

        let profile = request
            .profile
            .unwrap_or_else(|| AllocationProfile::for_user(&request.user_data));
        let allocation = request.allocation.apply(self.profile_allocation(profile));
        validate_allocation(&allocation)?;

        let swarm_id = request
            .swarm_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let task = SwarmExecutionTask {
            id: Uuid::new_v4().to_string(),
            context: SwarmContext {
                swarm_id: swarm_id.clone(),
                parent_swarm_id: request.parent_swarm_id,
                user_data: request.user_data.clone(),
                timestamp: Utc::now(),
            },
            input: SwarmInput {
                swarm_id: Some(swarm_id),
                chat_id: request.chat_id,
                goal: request.goal,
                team_configuration: request.team_configuration,
                available_tools: request.available_tools,
                execution_config: request.execution_config,
                user_data: request.user_data,
            },
            allocation,
            options: request.options,
        };

        info!(
            task_id = %task.id,
            swarm_id = %task.context.swarm_id,
            profile = ?profile,
            max_credits = allocation.max_credits,
            max_duration_ms = allocation.max_duration_ms,
            "Built swarm execution task"
        );
        Ok(task)
    }
}

fn validate_allocation(allocation: &ResourceAllocation) -> Result<()> {
    let zero = [
        ("maxCredits", allocation.max_credits == 0),
        ("maxDurationMs", allocation.max_duration_ms == 0),
        ("maxMemoryMB", allocation.max_memory_mb == 0),
        ("maxConcurrentSteps", allocation.max_concurrent_steps == 0),
    ];
    match zero.iter().find(|(_, is_zero)| *is_zero) {
        Some((field, _)) => Err(StrataError::InvalidAllocation(format!(
            "{} must be greater than zero",
            field
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::{Organization, Role};
    use strata_test_utils::{admin_user, user};

    fn factory() -> SwarmTaskFactory {
        SwarmTaskFactory::new(SwarmConfig::default())
    }

    #[test]
    fn test_single_override_keeps_siblings() {
        let mut request = SwarmTaskRequest::new("Ship the release", user("u1"));
        request.allocation.max_credits = Some(42);

        let task = factory().build(request).unwrap();
        let standard = SwarmConfig::default().standard;
        assert_eq!(task.allocation.max_credits, 42);
        assert_eq!(task.allocation.max_duration_ms, standard.max_duration_ms);
        assert_eq!(task.allocation.max_memory_mb, standard.max_memory_mb);
        assert_eq!(task.allocation.max_concurrent_steps, standard.max_concurrent_steps);
    }

    #[test]
    fn test_elevated_user_gets_richer_ceiling() {
        let f = factory();
        let standard = f.build(SwarmTaskRequest::new("g", user("u1"))).unwrap();
        let elevated = f.build(SwarmTaskRequest::new("g", admin_user("u2"))).unwrap();
        assert!(elevated.allocation.max_credits > standard.allocation.max_credits);
        assert!(elevated.allocation.max_duration_ms > standard.allocation.max_duration_ms);
    }

    #[test]
    fn test_explicit_constrained_profile() {
        let mut request = SwarmTaskRequest::new("preview", admin_user("u1"));
        request.profile = Some(AllocationProfile::Constrained);
        let task = factory().build(request).unwrap();
        assert_eq!(task.allocation, SwarmConfig::default().constrained);
    }

    #[test]
    fn test_zero_override_rejected() {
        let mut request = SwarmTaskRequest::new("g", user("u1"));
        request.allocation.max_concurrent_steps = Some(0);
        let err = factory().build(request).unwrap_err();
        assert!(matches!(err, StrataError::InvalidAllocation(ref m) if m.contains("maxConcurrentSteps")));
    }

    #[test]
    fn test_invalid_team_rejected() {
        let mut request = SwarmTaskRequest::new("g", user("u1"));
        request.team_configuration = Some(TeamConfiguration::new().with_organization(Organization {
            roles: vec![Role {
                name: "lead".into(),
                capabilities: vec![],
                min_occupancy: 3,
                max_occupancy: 1,
            }],
            ..Default::default()
        }));
        assert!(matches!(
            factory().build(request),
            Err(StrataError::InvalidTeam(_))
        ));
    }

    #[test]
    fn test_ids_and_wire_format() {
        let mut request = SwarmTaskRequest::new("g", user("u1"));
        request.swarm_id = Some("swarm-7".into());
        request.parent_swarm_id = Some("swarm-1".into());
        request.available_tools = vec![AvailableTool::named("search")];
        let task = factory().build(request).unwrap();

        assert_eq!(task.swarm_id(), "swarm-7");
        assert_eq!(task.input.swarm_id.as_deref(), Some("swarm-7"));
        let wire = serde_json::to_value(&task).unwrap();
        assert_eq!(wire["context"]["parentSwarmId"], "swarm-1");
        assert_eq!(wire["allocation"]["maxMemoryMB"], 512);
        assert_eq!(wire["input"]["availableTools"][0]["name"], "search");
        assert!(wire["options"].is_null());

        let back: SwarmExecutionTask = serde_json::from_value(wire).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_generated_swarm_id() {
        let task = factory().build(SwarmTaskRequest::new("g", user("u1"))).unwrap();
        assert!(!task.swarm_id().is_empty());
        assert_ne!(task.id, task.context.swarm_id);
    }

    #[test]
    fn test_empty_goal_rejected() {
        assert!(factory().build(SwarmTaskRequest::new("  ", user("u1"))).is_err());
    }

    #[test]
    fn test_deadline_and_expiry() {
        let mut request = SwarmTaskRequest::new("g", user("u1"));
        request.allocation.max_duration_ms = Some(60_000);
        let task = factory().build(request).unwrap();

        assert_eq!(
            task.deadline() - task.context.timestamp,
            chrono::Duration::milliseconds(60_000)
        );
        assert!(!task.is_expired(task.context.timestamp));
        assert!(task.is_expired(task.context.timestamp + chrono::Duration::minutes(2)));
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("elevated".parse::<AllocationProfile>().unwrap(), AllocationProfile::Elevated);
        assert!("huge".parse::<AllocationProfile>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_times_out() {
        let mut request = SwarmTaskRequest::new("g", user("u1"));
        request.allocation.max_duration_ms = Some(1_000);
        let task = factory().build(request).unwrap();
        let scope = task.execution_scope(None);

        let err = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::DeadlineExceeded { budget_ms: 1_000, .. }));
        assert!(scope.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_completes_within_budget() {
        let task = factory().build(SwarmTaskRequest::new("g", user("u1"))).unwrap();
        let scope = task.execution_scope(None);
        let value = scope
            .run(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(!scope.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_scope() {
        let parent = CancellationToken::new();
        let task = factory().build(SwarmTaskRequest::new("g", user("u1"))).unwrap();
        let scope = task.execution_scope(Some(&parent));
        parent.cancel();

        let err = scope
            .run(std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Cancelled));
    }
}
