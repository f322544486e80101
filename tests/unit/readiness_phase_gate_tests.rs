#[path = "../common/mod.rs"]
mod common;

use gatekeeper::app_state::SharedAppState;
use gatekeeper::readiness::{PhaseGate, PhaseWait, StartupPhase, DEFAULT_POLL_INTERVAL};
use std::time::Duration;
use tokio::time::Instant;

fn gate(state: &SharedAppState) -> PhaseGate {
    PhaseGate::new(Some(common::provider(state))).with_poll_interval(common::POLL)
}

#[tokio::test(start_paused = true)]
async fn returns_immediately_when_phase_already_reached() {
    let state = SharedAppState::at_phase(StartupPhase::WebSocket);
    let started = Instant::now();
    let wait = gate(&state)
        .wait_for_phase(StartupPhase::Services, Duration::from_secs(5))
        .await;
    assert_eq!(wait, PhaseWait::Reached(StartupPhase::WebSocket));
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn observes_phase_reached_mid_wait() {
    let state = SharedAppState::at_phase(StartupPhase::Cache);
    common::advance_phase_after(&state, Duration::from_millis(320), StartupPhase::Services);

    let started = Instant::now();
    let wait = gate(&state)
        .wait_for_phase(StartupPhase::Services, Duration::from_secs(2))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(wait, PhaseWait::Reached(StartupPhase::Services));
    assert!(elapsed >= Duration::from_millis(320));
    assert!(elapsed <= Duration::from_millis(320) + common::POLL);
}

#[tokio::test(start_paused = true)]
async fn times_out_at_the_deadline_with_last_observation() {
    let state = SharedAppState::at_phase(StartupPhase::Cache);
    let started = Instant::now();
    let wait = gate(&state)
        .wait_for_phase(StartupPhase::Services, Duration::from_secs(1))
        .await;

    assert_eq!(
        wait,
        PhaseWait::TimedOut {
            last_observed: StartupPhase::Cache
        }
    );
    assert!(!wait.is_reached());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(1) + common::POLL);
}

#[tokio::test(start_paused = true)]
async fn startup_failure_aborts_the_wait_early() {
    let state = SharedAppState::at_phase(StartupPhase::Dependencies);
    let failing = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        failing.mark_failed();
    });

    let started = Instant::now();
    let wait = gate(&state)
        .wait_for_phase(StartupPhase::Services, Duration::from_secs(5))
        .await;

    assert_eq!(
        wait,
        PhaseWait::StartupFailed {
            last_observed: StartupPhase::Dependencies
        }
    );
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn unknown_phase_never_satisfies_the_wait() {
    let state = SharedAppState::at_phase(StartupPhase::Unknown);
    let wait = gate(&state)
        .wait_for_phase(StartupPhase::Init, Duration::from_millis(500))
        .await;
    assert_eq!(
        wait,
        PhaseWait::TimedOut {
            last_observed: StartupPhase::Unknown
        }
    );
}

#[tokio::test(start_paused = true)]
async fn missing_application_state_is_reported_without_waiting() {
    let started = Instant::now();
    let wait = PhaseGate::new(None)
        .wait_for_phase(StartupPhase::Dependencies, Duration::from_secs(3))
        .await;
    assert_eq!(wait, PhaseWait::NoApplicationState);
    assert_eq!(wait.last_observed(), StartupPhase::Unknown);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[test]
fn zero_poll_interval_keeps_the_default() {
    let gate = PhaseGate::new(None).with_poll_interval(Duration::ZERO);
    assert_eq!(gate.poll_interval(), DEFAULT_POLL_INTERVAL);
    assert_eq!(gate.current_phase(), None);
}
