#[path = "../common/mod.rs"]
mod common;

use gatekeeper::config::EnvironmentSettings;
use gatekeeper::err;
use gatekeeper::readiness::{
    CheckGroup, EnvironmentProfile, Probe, ProbeOutcome, ProbeSet, ServiceCheckRegistry,
    StartupPhase, CACHE_CHECK, INTEGRATION_CHECK, STORAGE_CHECK,
};
use std::collections::BTreeMap;
use std::time::Duration;

fn registry_for(settings: &EnvironmentSettings, probes: &ProbeSet) -> ServiceCheckRegistry {
    let profile = EnvironmentProfile::resolve(settings);
    ServiceCheckRegistry::build(&profile, &settings.criticality, probes)
}

#[test]
fn registry_groups_checks_in_startup_order() {
    let registry = registry_for(&EnvironmentSettings::managed("staging", false), &ProbeSet::default());
    assert_eq!(registry.len(), 6);
    assert_eq!(
        registry.names_in(CheckGroup::Dependencies),
        vec!["storage", "cache", "auth"]
    );
    assert_eq!(
        registry.names_in(CheckGroup::Services),
        vec!["agent_supervisor", "event_bridge"]
    );
    assert_eq!(registry.names_in(CheckGroup::Integration), vec!["integration"]);
}

#[test]
fn cache_is_only_critical_in_production() {
    let staging = registry_for(&EnvironmentSettings::managed("staging", false), &ProbeSet::default());
    assert!(!staging.get(CACHE_CHECK).unwrap().critical);
    assert!(staging.get(STORAGE_CHECK).unwrap().critical);

    let production = registry_for(
        &EnvironmentSettings::managed("production", false),
        &ProbeSet::default(),
    );
    assert_eq!(production.critical_names().len(), 6);
}

#[test]
fn overrides_apply_outside_production_only() {
    let staging = EnvironmentSettings::managed("staging", false)
        .with_criticality(CACHE_CHECK, true)
        .with_criticality(STORAGE_CHECK, false);
    let registry = registry_for(&staging, &ProbeSet::default());
    assert!(registry.get(CACHE_CHECK).unwrap().critical);
    assert!(!registry.get(STORAGE_CHECK).unwrap().critical);

    let production =
        EnvironmentSettings::managed("production", false).with_criticality(STORAGE_CHECK, false);
    let registry = registry_for(&production, &ProbeSet::default());
    assert!(registry.get(STORAGE_CHECK).unwrap().critical);
}

#[test]
fn managed_and_self_hosted_use_different_budgets() {
    let managed = registry_for(&EnvironmentSettings::managed("production", false), &ProbeSet::default());
    let storage = managed.get(STORAGE_CHECK).unwrap();
    assert_eq!(storage.retry_count, 1);
    assert_eq!(storage.timeout, Duration::from_secs(3));
    assert_eq!(storage.retry_delay, Duration::from_millis(500));

    let self_hosted = registry_for(&EnvironmentSettings::self_hosted("production"), &ProbeSet::default());
    let storage = self_hosted.get(STORAGE_CHECK).unwrap();
    assert_eq!(storage.retry_count, 3);
    assert_eq!(storage.timeout, Duration::from_secs(15));
}

#[test]
fn integration_check_keeps_its_budget_everywhere() {
    let registry = registry_for(&EnvironmentSettings::self_hosted("staging"), &ProbeSet::default());
    let integration = registry.get(INTEGRATION_CHECK).unwrap();
    assert_eq!(integration.group, CheckGroup::Integration);
    assert_eq!(integration.retry_count, 1);
    assert!(!integration.description.is_empty());
}

#[tokio::test]
async fn default_probes_read_service_flags() {
    let state = common::healthy_state(StartupPhase::Dependencies);
    state.set_service(CACHE_CHECK, false);
    state.remove_service(STORAGE_CHECK);
    let registry = registry_for(
        &EnvironmentSettings::managed("staging", false),
        &common::probes(&state),
    );

    let timeout = Duration::from_secs(1);
    let auth = registry.get("auth").unwrap();
    assert_eq!(auth.probe.run(timeout).await, ProbeOutcome::Passed);
    let cache = registry.get(CACHE_CHECK).unwrap();
    assert_eq!(cache.probe.run(timeout).await, ProbeOutcome::Failed);
    let storage = registry.get(STORAGE_CHECK).unwrap();
    assert_eq!(storage.probe.run(timeout).await, ProbeOutcome::Failed);
}

#[tokio::test]
async fn integration_probe_follows_startup_progress() {
    let state = common::healthy_state(StartupPhase::Cache);
    let probe = Probe::startup_progress(Some(common::provider(&state)));
    let timeout = Duration::from_secs(1);

    assert_eq!(probe.run(timeout).await, ProbeOutcome::Failed);
    state.set_phase(StartupPhase::Services);
    assert_eq!(probe.run(timeout).await, ProbeOutcome::Passed);
    state.mark_failed();
    assert_eq!(probe.run(timeout).await, ProbeOutcome::Failed);

    let detached = Probe::startup_progress(None);
    assert_eq!(detached.run(timeout).await, ProbeOutcome::Failed);
}

#[tokio::test]
async fn supplied_probes_override_defaults() {
    let probes = ProbeSet::default().with_probe(STORAGE_CHECK, Probe::constant(true));
    let registry = registry_for(&EnvironmentSettings::managed("staging", false), &probes);
    let storage = registry.get(STORAGE_CHECK).unwrap();
    assert_eq!(
        storage.probe.run(Duration::from_secs(1)).await,
        ProbeOutcome::Passed
    );
}

#[tokio::test]
async fn probe_errors_become_failed_attempts() {
    let probe = Probe::from_fn(|| async { Err(err!("connection refused")) });
    match probe.run(Duration::from_secs(1)).await {
        ProbeOutcome::Errored(reason) => assert!(reason.contains("connection refused")),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn probe_panics_are_contained() {
    let probe = Probe::from_fn(|| async {
        if true {
            panic!("driver exploded");
        }
        Ok(true)
    });
    assert_eq!(
        probe.run(Duration::from_secs(1)).await,
        ProbeOutcome::Errored("probe panicked".to_string())
    );

    let blocking = Probe::blocking(|| panic!("blocking driver exploded"));
    assert!(matches!(
        blocking.run(Duration::from_secs(1)).await,
        ProbeOutcome::Errored(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn slow_probes_time_out() {
    let probe = Probe::from_fn(|| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(true)
    });
    assert_eq!(
        probe.run(Duration::from_millis(250)).await,
        ProbeOutcome::TimedOut
    );
}

#[test]
fn registry_rebuild_replaces_every_check() {
    let mut registry = registry_for(&EnvironmentSettings::managed("staging", false), &ProbeSet::default());
    let profile = EnvironmentProfile::resolve(&EnvironmentSettings::managed("production", false));
    registry.register(&profile, &BTreeMap::new(), &ProbeSet::default());
    assert_eq!(registry.len(), 6);
    assert!(registry.get(CACHE_CHECK).unwrap().critical);
}
