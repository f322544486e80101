use crate::readiness::StartupPhase;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Read-only view of application startup progress.
///
/// Implemented by whatever owns the startup sequence. The gate never mutates it and only compares
/// phase ordinals and service flags.
pub trait AppStateProvider: Send + Sync {
    fn startup_phase(&self) -> StartupPhase;

    fn startup_complete(&self) -> bool;

    fn startup_failed(&self) -> bool;

    /// `None` when the service has no handle registered at all.
    fn service_available(&self, service: &str) -> Option<bool>;
}

/// In-memory application state, cheap to clone and share between the startup task and gates.
#[derive(Clone, Default)]
pub struct SharedAppState {
    inner: Arc<RwLock<StartupSnapshot>>,
}

#[derive(Debug, Default)]
struct StartupSnapshot {
    phase: StartupPhase,
    complete: bool,
    failed: bool,
    services: BTreeMap<String, bool>,
}

impl SharedAppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_phase(phase: StartupPhase) -> Self {
        let state = Self::new();
        state.set_phase(phase);
        state
    }

    pub fn set_phase(&self, phase: StartupPhase) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let previous = guard.phase;
        guard.phase = phase;
        drop(guard);

        if previous != phase {
            tracing::debug!(
                state_from = previous.as_str(),
                state_to = phase.as_str(),
                "startup phase transition"
            );
        }
    }

    pub fn set_service(&self, service: impl Into<String>, available: bool) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.services.insert(service.into(), available);
    }

    pub fn remove_service(&self, service: &str) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.services.remove(service);
    }

    pub fn mark_complete(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.phase = StartupPhase::Complete;
        guard.complete = true;
    }

    pub fn mark_failed(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.failed = true;
    }
}

impl AppStateProvider for SharedAppState {
    fn startup_phase(&self) -> StartupPhase {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).phase
    }

    fn startup_complete(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .complete
    }

    fn startup_failed(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .failed
    }

    fn service_available(&self, service: &str) -> Option<bool> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .services
            .get(service)
            .copied()
    }
}
