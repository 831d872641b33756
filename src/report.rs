use strata_resources::health::{DiscoveryStatus, HealthCheckReport, ResourceHealth};

pub fn print_health(report: &HealthCheckReport) {
    println!("System: {}", report.status);
    println!(
        "  {} supported, {} registered, {} enabled, {} active",
        report.totals.supported, report.totals.registered, report.totals.enabled, report.totals.active
    );
    println!();

    for (category, counts) in &report.categories {
        println!(
            "  {:<14} {}/{} active ({} registered of {})",
            format!("{}:", category),
            counts.active,
            counts.enabled,
            counts.registered,
            counts.supported
        );
    }

    if !report.unavailable.is_empty() {
        println!();
        println!("Unavailable:");
        for resource in &report.unavailable {
            println!("  [!!] {} ({})", resource.id, resource.reason);
        }
    }

    println!();
    println!("Resources:");
    for resource in &report.resources {
        let marker = match (resource.discovery, resource.health) {
            (DiscoveryStatus::Enabled, ResourceHealth::Healthy) => "[OK]",
            (DiscoveryStatus::Enabled, ResourceHealth::Unhealthy) => "[!!]",
            (DiscoveryStatus::Enabled, ResourceHealth::Unknown) => "[..]",
            (DiscoveryStatus::Disabled, _) => "[--]",
            _ => "[  ]",
        };
        let checked = resource
            .last_checked
            .map(|t| format!(" checked {}", t.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_default();
        println!(
            "  {} {:<14} {:<28} {:?}{}",
            marker,
            resource.category,
            resource.display_name,
            resource.discovery,
            checked
        );
    }

    if !report.missing_implementations.is_empty() {
        println!();
        println!("  No implementation: {}", report.missing_implementations.join(", "));
    }
}
