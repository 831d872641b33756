use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use strata_core::error::{Result, StrataError};

/// Highest norm priority accepted by [`TeamConfiguration::validate`].
pub const MAX_NORM_PRIORITY: u8 = 10;

/// Team shape handed to the external team-formation process.
///
/// This crate only carries and structurally validates it; no role
/// assignment happens here. Unknown keys survive a decode/encode cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_team_size: Option<u32>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Organization>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Structural roles, functional missions and the norms binding them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub missions: Vec<Mission>,
    #[serde(default)]
    pub norms: Vec<Norm>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub min_occupancy: u32,
    #[serde(default = "default_max_occupancy")]
    pub max_occupancy: u32,
}

fn default_max_occupancy() -> u32 { 1 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    pub goal: String,
    /// Roles expected to take part.
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormKind {
    Obligation,
    Permission,
    Prohibition,
}

/// What the formation process does when a norm is broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    Ignore,
    #[default]
    Warn,
    Escalate,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Norm {
    pub kind: NormKind,
    pub role: String,
    pub mission: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub on_violation: ViolationPolicy,
}

fn default_priority() -> u8 { 5 }

impl TeamConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leader(mut self, agent_id: impl Into<String>) -> Self {
        self.leader_agent_id = Some(agent_id.into());
        self
    }

    pub fn with_preferred_size(mut self, size: u32) -> Self {
        self.preferred_team_size = Some(size);
        self
    }

    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.required_skills = skills;
        self
    }

    pub fn with_organization(mut self, organization: Organization) -> Self {
        self.organization = Some(organization);
        self
    }

    /// Check structure only: team size, role occupancy bounds, and that
    /// every norm names a declared role and mission with an in-range priority.
    pub fn validate(&self) -> Result<()> {
        if self.preferred_team_size == Some(0) {
            return Err(invalid("preferred team size must be at least 1"));
        }
        if let Some(org) = &self.organization {
            org.validate()?;
        }
        Ok(())
    }
}

impl Organization {
    fn validate(&self) -> Result<()> {
        let mut roles = HashSet::new();
        for role in &self.roles {
            if !roles.insert(role.name.as_str()) {
                return Err(invalid(format!("duplicate role '{}'", role.name)));
            }
            if role.max_occupancy == 0 {
                return Err(invalid(format!("role '{}' has zero max occupancy", role.name)));
            }
            if role.min_occupancy > role.max_occupancy {
                return Err(invalid(format!(
                    "role '{}' min occupancy {} exceeds max {}",
                    role.name, role.min_occupancy, role.max_occupancy
                )));
            }
        }

        let mut missions = HashSet::new();
        for mission in &self.missions {
            if !missions.insert(mission.id.as_str()) {
                return Err(invalid(format!("duplicate mission '{}'", mission.id)));
            }
            if let Some(role) = mission.roles.iter().find(|r| !roles.contains(r.as_str())) {
                return Err(invalid(format!(
                    "mission '{}' references undeclared role '{}'",
                    mission.id, role
                )));
            }
        }

        for norm in &self.norms {
            if !roles.contains(norm.role.as_str()) {
                return Err(invalid(format!("norm references undeclared role '{}'", norm.role)));
            }
            if !missions.contains(norm.mission.as_str()) {
                return Err(invalid(format!(
                    "norm references undeclared mission '{}'",
                    norm.mission
                )));
            }
            if norm.priority == 0 || norm.priority > MAX_NORM_PRIORITY {
                return Err(invalid(format!(
                    "norm priority {} outside 1..={}",
                    norm.priority, MAX_NORM_PRIORITY
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> StrataError {
    StrataError::InvalidTeam(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn role(name: &str, min: u32, max: u32) -> Role {
        Role {
            name: name.into(),
            capabilities: vec![],
            min_occupancy: min,
            max_occupancy: max,
        }
    }

    fn organization() -> Organization {
        Organization {
            roles: vec![role("researcher", 1, 3), role("reviewer", 0, 1)],
            missions: vec![Mission {
                id: "m1".into(),
                goal: "Write the report".into(),
                roles: vec!["researcher".into()],
            }],
            norms: vec![Norm {
                kind: NormKind::Obligation,
                role: "researcher".into(),
                mission: "m1".into(),
                priority: 7,
                on_violation: ViolationPolicy::Escalate,
            }],
        }
    }

    #[test]
    fn test_valid_team() {
        let team = TeamConfiguration::new()
            .with_leader("agent-1")
            .with_preferred_size(3)
            .with_organization(organization());
        assert!(team.validate().is_ok());
    }

    #[test]
    fn test_min_above_max_occupancy_rejected() {
        let mut org = organization();
        org.roles[0] = role("researcher", 4, 2);
        let err = TeamConfiguration::new().with_organization(org).validate().unwrap_err();
        assert!(matches!(err, StrataError::InvalidTeam(ref m) if m.contains("exceeds max")));
    }

    #[test]
    fn test_zero_team_size_rejected() {
        let err = TeamConfiguration::new().with_preferred_size(0).validate().unwrap_err();
        assert!(matches!(err, StrataError::InvalidTeam(_)));
    }

    #[test]
    fn test_norm_must_reference_declared_names() {
        let mut org = organization();
        org.norms[0].role = "ghost".into();
        assert!(TeamConfiguration::new().with_organization(org).validate().is_err());

        let mut org = organization();
        org.norms[0].mission = "m9".into();
        assert!(TeamConfiguration::new().with_organization(org).validate().is_err());
    }

    #[test]
    fn test_norm_priority_range() {
        let mut org = organization();
        org.norms[0].priority = 11;
        assert!(TeamConfiguration::new().with_organization(org).validate().is_err());
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let raw = json!({
            "leaderAgentId": "a1",
            "requiredSkills": ["rust"],
            "formationHint": "fast"
        });
        let team: TeamConfiguration = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(team.leader_agent_id.as_deref(), Some("a1"));
        assert_eq!(serde_json::to_value(&team).unwrap(), raw);
    }
}
