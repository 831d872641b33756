//! Supported-integration catalog reconciled against runtime registration,
//! operator choice and probe results.

pub mod catalog;
pub mod health;
pub mod registry;

pub use catalog::{Catalog, ResourceCategory, ResourceDefinition};
pub use health::{
    build_health_check, calculate_system_health, HealthCheckReport, RegisteredResource,
    ResourceHealth, SystemHealth, UnavailableReason, UnavailableResource,
};
pub use registry::{ResourceRegistry, ResourceState};
