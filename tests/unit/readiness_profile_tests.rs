use gatekeeper::config::EnvironmentSettings;
use gatekeeper::readiness::{EnvironmentKind, EnvironmentProfile};
use std::time::Duration;

fn approx(actual: Duration, expected_secs: f64) {
    let diff = (actual.as_secs_f64() - expected_secs).abs();
    assert!(
        diff < 1e-6,
        "expected {expected_secs}s, got {}s",
        actual.as_secs_f64()
    );
}

#[test]
fn profile_rows_match_environment_table() {
    let dev = EnvironmentProfile::for_kind(EnvironmentKind::Development, true, false);
    assert_eq!(dev.timeout_multiplier, 0.3);
    assert_eq!(dev.safety_margin, 1.0);
    assert_eq!(dev.max_total_timeout, Duration::from_secs(3));
    assert_eq!(dev.min_platform_safety_timeout, Duration::ZERO);

    let staging = EnvironmentProfile::for_kind(EnvironmentKind::Staging, true, false);
    assert_eq!(staging.timeout_multiplier, 0.7);
    assert_eq!(staging.safety_margin, 1.2);
    assert_eq!(staging.max_total_timeout, Duration::from_secs(8));
    assert_eq!(staging.min_platform_safety_timeout, Duration::from_secs(1));

    let prod = EnvironmentProfile::for_kind(EnvironmentKind::Production, true, false);
    assert_eq!(prod.timeout_multiplier, 1.0);
    assert_eq!(prod.safety_margin, 1.5);
    assert_eq!(prod.max_total_timeout, Duration::from_secs(15));
    assert!(prod.is_production());
}

#[test]
fn testing_shares_development_tuning() {
    let testing = EnvironmentProfile::for_kind(EnvironmentKind::Testing, false, false);
    let dev = EnvironmentProfile::for_kind(EnvironmentKind::Development, false, false);
    assert_eq!(testing.timeout_multiplier, dev.timeout_multiplier);
    assert_eq!(testing.max_total_timeout, dev.max_total_timeout);
    assert_eq!(testing.name(), "testing");
}

#[test]
fn environment_names_resolve_with_aliases() {
    assert_eq!(EnvironmentKind::from_name("prod"), EnvironmentKind::Production);
    assert_eq!(EnvironmentKind::from_name("Production"), EnvironmentKind::Production);
    assert_eq!(EnvironmentKind::from_name("stage"), EnvironmentKind::Staging);
    assert_eq!(EnvironmentKind::from_name("ci"), EnvironmentKind::Testing);
    assert_eq!(EnvironmentKind::from_name(""), EnvironmentKind::Development);
}

#[test]
fn resolve_reads_flags_from_settings() {
    let settings = EnvironmentSettings::managed("staging", true);
    let profile = EnvironmentProfile::resolve(&settings);
    assert_eq!(profile.kind, EnvironmentKind::Staging);
    assert!(profile.is_managed_cloud);
    assert!(profile.is_cold_start_platform);
}

#[test]
fn optimized_timeout_scales_and_caps() {
    let prod = EnvironmentProfile::for_kind(EnvironmentKind::Production, true, false);
    approx(prod.optimized_timeout(Duration::from_secs(2)), 3.0);
    assert_eq!(
        prod.optimized_timeout(Duration::from_secs(60)),
        Duration::from_secs(15)
    );

    let dev = EnvironmentProfile::for_kind(EnvironmentKind::Development, true, false);
    approx(dev.optimized_timeout(Duration::from_secs(2)), 0.6);
    assert_eq!(
        dev.optimized_timeout(Duration::from_secs(10)),
        Duration::from_secs(3)
    );

    let staging = EnvironmentProfile::for_kind(EnvironmentKind::Staging, false, false);
    approx(staging.optimized_timeout(Duration::from_secs(5)), 4.2);
}

#[test]
fn cold_start_platforms_floor_the_timeout() {
    let staging = EnvironmentProfile::for_kind(EnvironmentKind::Staging, true, true);
    assert_eq!(
        staging.optimized_timeout(Duration::from_millis(100)),
        Duration::from_secs(1)
    );

    let dev = EnvironmentProfile::for_kind(EnvironmentKind::Development, true, true);
    assert_eq!(dev.min_platform_safety_timeout, Duration::from_millis(500));
    assert_eq!(
        dev.optimized_timeout(Duration::ZERO),
        Duration::from_millis(500)
    );
}

#[test]
fn optimized_timeout_secs_mirrors_duration_form() {
    let prod = EnvironmentProfile::for_kind(EnvironmentKind::Production, true, false);
    assert!((prod.optimized_timeout_secs(4.0) - 6.0).abs() < 1e-6);
    assert_eq!(prod.optimized_timeout_secs(100.0), 15.0);
}
