use tracing_subscriber::EnvFilter;

use strata_core::types::ResourceAllocation;
use strata_core::AppConfig;
use strata_resources::Catalog;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

impl CheckResult {
    fn ok(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

pub fn run_doctor(config: &AppConfig) {
    let checks = vec![
        check_llm(config),
        check_retry(config),
        check_allocations(config),
        check_resources(config),
        check_log_filter(config),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_llm(config: &AppConfig) -> CheckResult {
    let llm = &config.llm;
    if !(0.0..=2.0).contains(&llm.temperature) {
        return CheckResult::fail(
            "LLM",
            format!("temperature {} outside 0.0..=2.0", llm.temperature),
        );
    }
    if llm.max_tokens == 0 {
        return CheckResult::fail("LLM", "max_tokens must be greater than zero");
    }
    match &llm.default_provider {
        Some(name) => CheckResult::ok("LLM", format!("default provider '{}'", name)),
        None => CheckResult::ok("LLM", "first registered provider becomes the default"),
    }
}

fn check_retry(config: &AppConfig) -> CheckResult {
    let retry = &config.publisher.retry;
    if retry.max_delay_ms < retry.base_delay_ms {
        return CheckResult::fail(
            "Publisher retry",
            format!(
                "max_delay_ms {} is below base_delay_ms {}",
                retry.max_delay_ms, retry.base_delay_ms
            ),
        );
    }
    if !(0.0..=1.0).contains(&retry.jitter_ratio) {
        return CheckResult::fail(
            "Publisher retry",
            format!("jitter_ratio {} outside 0.0..=1.0", retry.jitter_ratio),
        );
    }
    CheckResult::ok(
        "Publisher retry",
        format!(
            "{} attempts, base {}ms{}",
            retry.total_attempts(),
            retry.base_delay_ms,
            if retry.exponential_backoff { ", exponential" } else { "" }
        ),
    )
}

fn check_allocations(config: &AppConfig) -> CheckResult {
    let swarm = &config.swarm;
    let profiles = [
        ("standard", &swarm.standard),
        ("elevated", &swarm.elevated),
        ("constrained", &swarm.constrained),
    ];
    for (name, allocation) in profiles {
        if has_zero_field(allocation) {
            return CheckResult::fail("Swarm profiles", format!("{} has a zero ceiling", name));
        }
    }
    if swarm.constrained.max_credits > swarm.standard.max_credits
        || swarm.standard.max_credits > swarm.elevated.max_credits
    {
        return CheckResult::fail(
            "Swarm profiles",
            "credits should grow constrained <= standard <= elevated",
        );
    }
    CheckResult::ok(
        "Swarm profiles",
        format!(
            "credits {}/{}/{} (constrained/standard/elevated)",
            swarm.constrained.max_credits, swarm.standard.max_credits, swarm.elevated.max_credits
        ),
    )
}

fn has_zero_field(allocation: &ResourceAllocation) -> bool {
    allocation.max_credits == 0
        || allocation.max_duration_ms == 0
        || allocation.max_memory_mb == 0
        || allocation.max_concurrent_steps == 0
}

fn check_resources(config: &AppConfig) -> CheckResult {
    let catalog = Catalog::builtin();
    let unknown: Vec<&str> = config
        .resources
        .enabled
        .iter()
        .filter(|id| !catalog.contains(id))
        .map(String::as_str)
        .collect();

    if unknown.is_empty() {
        CheckResult::ok(
            "Resources",
            format!(
                "{} enabled of {} supported",
                config.resources.enabled.len(),
                catalog.len()
            ),
        )
    } else {
        CheckResult::fail("Resources", format!("not in catalog: {}", unknown.join(", ")))
    }
}

fn check_log_filter(config: &AppConfig) -> CheckResult {
    let Some(log) = &config.log else {
        return CheckResult::ok("Log filter", "default");
    };
    match EnvFilter::try_new(&log.filter) {
        Ok(_) => CheckResult::ok("Log filter", log.filter.clone()),
        Err(e) => CheckResult::fail("Log filter", format!("'{}': {}", log.filter, e)),
    }
}
