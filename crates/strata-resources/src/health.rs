use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, ResourceCategory};

/// Overall status across every enabled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Operational,
    Degraded,
    Down,
}

impl SystemHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operational => "operational",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

impl std::fmt::Display for SystemHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Last result of the external probe for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceHealth {
    /// Not probed since it was enabled.
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryStatus {
    Unregistered,
    Registered,
    Enabled,
    Disabled,
}

/// A resource that has an implementation deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredResource {
    pub id: String,
    pub category: ResourceCategory,
    #[serde(default)]
    pub health: ResourceHealth,
    /// Switched off by the operator.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnavailableReason {
    #[serde(rename = "health check failed")]
    HealthCheckFailed,
    #[serde(rename = "not found")]
    NotFound,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HealthCheckFailed => "health check failed",
            Self::NotFound => "not found",
        }
    }
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// An enabled resource that cannot serve requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableResource {
    pub id: String,
    pub reason: UnavailableReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub supported: usize,
    pub registered: usize,
    pub enabled: usize,
    pub active: usize,
}

impl CategoryCounts {
    fn add(&mut self, other: &CategoryCounts) {
        self.supported += other.supported;
        self.registered += other.registered;
        self.enabled += other.enabled;
        self.active += other.active;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub id: String,
    pub category: ResourceCategory,
    pub display_name: String,
    pub discovery: DiscoveryStatus,
    pub health: ResourceHealth,
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckReport {
    pub status: SystemHealth,
    pub totals: CategoryCounts,
    pub categories: BTreeMap<ResourceCategory, CategoryCounts>,
    /// Catalog ids with no registered implementation, in catalog order.
    pub missing_implementations: Vec<String>,
    /// Enabled resources that are unhealthy or not registered, by id.
    pub unavailable: Vec<UnavailableResource>,
    /// Every known resource, sorted by (category, id).
    pub resources: Vec<ResourceInfo>,
    pub checked_at: DateTime<Utc>,
}

/// Fold counts into one status.
///
/// With nothing enabled the system is operational. With everything enabled
/// active and nothing unavailable it is operational too. Enabled resources
/// with none active means down. Anything in between is degraded.
pub fn calculate_system_health(
    enabled: usize,
    active: usize,
    unavailable: &[UnavailableResource],
) -> SystemHealth {
    if enabled == 0 || (unavailable.is_empty() && active == enabled) {
        SystemHealth::Operational
    } else if active == 0 {
        SystemHealth::Down
    } else {
        SystemHealth::Degraded
    }
}

/// Aggregate the catalog, what is registered, and what the operator enabled.
///
/// The output does not depend on the order of `registered` or `enabled_ids`.
/// An enabled resource counts as active only once probed healthy.
pub fn build_health_check(
    catalog: &Catalog,
    registered: &[RegisteredResource],
    enabled_ids: &[String],
) -> HealthCheckReport {
    let registered: BTreeMap<&str, &RegisteredResource> =
        registered.iter().map(|r| (r.id.as_str(), r)).collect();
    let enabled: BTreeSet<&str> = enabled_ids.iter().map(String::as_str).collect();

    let mut categories: BTreeMap<ResourceCategory, CategoryCounts> = BTreeMap::new();
    let mut totals = CategoryCounts::default();
    let mut missing_implementations = Vec::new();
    let mut unavailable = Vec::new();
    let mut resources = Vec::new();

    for entry in catalog.entries() {
        categories.entry(entry.category).or_default().supported += 1;
        if !registered.contains_key(entry.id.as_str()) {
            missing_implementations.push(entry.id.clone());
        }
    }

    for (id, resource) in &registered {
        let counts = categories.entry(resource.category).or_default();
        counts.registered += 1;

        let is_enabled = enabled.contains(id);
        if is_enabled {
            counts.enabled += 1;
            match resource.health {
                ResourceHealth::Healthy => counts.active += 1,
                ResourceHealth::Unhealthy => unavailable.push(UnavailableResource {
                    id: id.to_string(),
                    reason: UnavailableReason::HealthCheckFailed,
                }),
                ResourceHealth::Unknown => {}
            }
        }

        let display_name = catalog
            .get(id)
            .map_or_else(|| id.to_string(), |d| d.display_name.clone());
        resources.push(ResourceInfo {
            id: id.to_string(),
            category: resource.category,
            display_name,
            discovery: if is_enabled {
                DiscoveryStatus::Enabled
            } else if resource.disabled {
                DiscoveryStatus::Disabled
            } else {
                DiscoveryStatus::Registered
            },
            health: resource.health,
            last_checked: resource.last_checked,
        });
    }

    for id in &enabled {
        if registered.contains_key(id) {
            continue;
        }
        unavailable.push(UnavailableResource {
            id: id.to_string(),
            reason: UnavailableReason::NotFound,
        });
        match catalog.get(id) {
            Some(entry) => categories.entry(entry.category).or_default().enabled += 1,
            // Not in any category; only the totals see it.
            None => totals.enabled += 1,
        }
    }

    for entry in catalog.entries() {
        if registered.contains_key(entry.id.as_str()) {
            continue;
        }
        resources.push(ResourceInfo {
            id: entry.id.clone(),
            category: entry.category,
            display_name: entry.display_name.clone(),
            discovery: DiscoveryStatus::Unregistered,
            health: ResourceHealth::Unknown,
            last_checked: None,
        });
    }

    for counts in categories.values() {
        totals.add(counts);
    }
    resources.sort_by(|a, b| (a.category, &a.id).cmp(&(b.category, &b.id)));
    unavailable.sort_by(|a, b| a.id.cmp(&b.id));

    HealthCheckReport {
        status: calculate_system_health(totals.enabled, totals.active, &unavailable),
        totals,
        categories,
        missing_implementations,
        unavailable,
        resources,
        checked_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceDefinition;

    fn down(id: &str) -> UnavailableResource {
        UnavailableResource {
            id: id.into(),
            reason: UnavailableReason::HealthCheckFailed,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new([
            ResourceDefinition::new("slack", ResourceCategory::Communication, "Slack"),
            ResourceDefinition::new("email", ResourceCategory::Communication, "Email"),
            ResourceDefinition::new("openai", ResourceCategory::Ai, "OpenAI"),
            ResourceDefinition::new("anthropic", ResourceCategory::Ai, "Anthropic"),
            ResourceDefinition::new("s3", ResourceCategory::Storage, "S3"),
        ])
    }

    fn registered(id: &str, category: ResourceCategory, health: ResourceHealth) -> RegisteredResource {
        RegisteredResource {
            id: id.into(),
            category,
            health,
            disabled: false,
            last_checked: None,
        }
    }

    #[test]
    fn test_system_health_table() {
        assert_eq!(calculate_system_health(0, 0, &[]), SystemHealth::Operational);
        assert_eq!(calculate_system_health(5, 0, &[down("x")]), SystemHealth::Down);
        assert_eq!(
            calculate_system_health(5, 3, &[down("x"), down("y")]),
            SystemHealth::Degraded
        );
        assert_eq!(calculate_system_health(5, 5, &[]), SystemHealth::Operational);
        assert_eq!(calculate_system_health(0, 0, &[down("x")]), SystemHealth::Operational);
        assert_eq!(calculate_system_health(3, 2, &[]), SystemHealth::Degraded);
    }

    #[test]
    fn test_missing_implementations_listed_once() {
        let regs = vec![
            registered("openai", ResourceCategory::Ai, ResourceHealth::Healthy),
            registered("openai", ResourceCategory::Ai, ResourceHealth::Healthy),
        ];
        let report = build_health_check(&catalog(), &regs, &[]);
        assert_eq!(
            report.missing_implementations,
            vec!["anthropic", "email", "slack", "s3"]
        );
        assert_eq!(report.categories[&ResourceCategory::Ai].registered, 1);
    }

    #[test]
    fn test_resources_sorted_regardless_of_input_order() {
        let a = vec![
            registered("slack", ResourceCategory::Communication, ResourceHealth::Healthy),
            registered("openai", ResourceCategory::Ai, ResourceHealth::Unhealthy),
            registered("email", ResourceCategory::Communication, ResourceHealth::Healthy),
        ];
        let mut b = a.clone();
        b.reverse();
        let enabled = vec!["slack".to_string(), "openai".to_string()];
        let mut enabled_rev = enabled.clone();
        enabled_rev.reverse();

        let ra = build_health_check(&catalog(), &a, &enabled);
        let rb = build_health_check(&catalog(), &b, &enabled_rev);
        let ids: Vec<_> = ra.resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["anthropic", "openai", "email", "slack", "s3"]);
        assert_eq!(ra.resources, rb.resources);
        assert_eq!(ra.unavailable, rb.unavailable);
        assert_eq!(ra.categories, rb.categories);
    }

    #[test]
    fn test_unavailable_reasons() {
        let regs = vec![
            registered("openai", ResourceCategory::Ai, ResourceHealth::Unhealthy),
            registered("slack", ResourceCategory::Communication, ResourceHealth::Healthy),
        ];
        let enabled = vec!["openai".to_string(), "slack".to_string(), "s3".to_string()];
        let report = build_health_check(&catalog(), &regs, &enabled);

        assert_eq!(
            report.unavailable,
            vec![
                UnavailableResource { id: "openai".into(), reason: UnavailableReason::HealthCheckFailed },
                UnavailableResource { id: "s3".into(), reason: UnavailableReason::NotFound },
            ]
        );
        assert_eq!(report.totals.enabled, 3);
        assert_eq!(report.totals.active, 1);
        assert_eq!(report.categories[&ResourceCategory::Storage].enabled, 1);
        assert_eq!(report.status, SystemHealth::Degraded);
    }

    #[test]
    fn test_all_enabled_healthy_is_operational() {
        let regs = vec![
            registered("openai", ResourceCategory::Ai, ResourceHealth::Healthy),
            registered("email", ResourceCategory::Communication, ResourceHealth::Healthy),
        ];
        let enabled = vec!["openai".to_string(), "email".to_string()];
        let report = build_health_check(&catalog(), &regs, &enabled);
        assert_eq!(report.status, SystemHealth::Operational);
        assert_eq!(report.totals.supported, 5);
        assert_eq!(report.totals.registered, 2);
        assert_eq!(report.totals.active, 2);
    }

    #[test]
    fn test_nothing_enabled_is_operational() {
        let regs = vec![registered("openai", ResourceCategory::Ai, ResourceHealth::Unhealthy)];
        let report = build_health_check(&catalog(), &regs, &[]);
        assert_eq!(report.status, SystemHealth::Operational);
        assert!(report.unavailable.is_empty());
    }

    #[test]
    fn test_enabled_unknown_id_counts_in_totals_only() {
        let report = build_health_check(&catalog(), &[], &["fax".to_string()]);
        assert_eq!(report.totals.enabled, 1);
        assert_eq!(report.unavailable[0].reason, UnavailableReason::NotFound);
        assert_eq!(report.status, SystemHealth::Down);
    }

    #[test]
    fn test_disabled_resource_discovery() {
        let mut s3 = registered("s3", ResourceCategory::Storage, ResourceHealth::Unknown);
        s3.disabled = true;
        let regs = vec![
            s3,
            registered("email", ResourceCategory::Communication, ResourceHealth::Unknown),
        ];
        let report = build_health_check(&catalog(), &regs, &[]);
        let discovery = |id: &str| report.resources.iter().find(|r| r.id == id).unwrap().discovery;
        assert_eq!(discovery("s3"), DiscoveryStatus::Disabled);
        assert_eq!(discovery("email"), DiscoveryStatus::Registered);
        assert_eq!(report.status, SystemHealth::Operational);
    }

    #[test]
    fn test_reason_wire_strings() {
        let json = serde_json::to_value(UnavailableResource {
            id: "s3".into(),
            reason: UnavailableReason::NotFound,
        })
        .unwrap();
        assert_eq!(json["reason"], "not found");
    }
}
