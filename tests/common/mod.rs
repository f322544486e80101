#![allow(dead_code)]

use gatekeeper::app_state::{AppStateProvider, SharedAppState};
use gatekeeper::config::EnvironmentSettings;
use gatekeeper::readiness::{
    ProbeSet, ReadinessOrchestrator, StartupPhase, AGENT_SUPERVISOR_CHECK, AUTH_CHECK,
    CACHE_CHECK, EVENT_BRIDGE_CHECK, STORAGE_CHECK,
};
use std::sync::Arc;
use std::time::Duration;

pub const POLL: Duration = Duration::from_millis(50);

pub const SERVICES: [&str; 5] = [
    STORAGE_CHECK,
    CACHE_CHECK,
    AUTH_CHECK,
    AGENT_SUPERVISOR_CHECK,
    EVENT_BRIDGE_CHECK,
];

/// Application state at `phase` with every service handle reporting available.
pub fn healthy_state(phase: StartupPhase) -> SharedAppState {
    let state = SharedAppState::at_phase(phase);
    for service in SERVICES {
        state.set_service(service, true);
    }
    state
}

pub fn provider(state: &SharedAppState) -> Arc<dyn AppStateProvider> {
    Arc::new(state.clone())
}

pub fn probes(state: &SharedAppState) -> ProbeSet {
    ProbeSet::new(Some(provider(state)))
}

pub fn orchestrator(settings: EnvironmentSettings, state: &SharedAppState) -> ReadinessOrchestrator {
    ReadinessOrchestrator::new(settings, probes(state)).with_poll_interval(POLL)
}

/// Advances the shared state to `phase` after `delay` on the tokio clock.
pub fn advance_phase_after(state: &SharedAppState, delay: Duration, phase: StartupPhase) {
    let state = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        state.set_phase(phase);
    });
}
