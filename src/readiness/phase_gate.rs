use crate::app_state::AppStateProvider;
use crate::readiness::state::StartupPhase;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of waiting for a startup phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseWait {
    Reached(StartupPhase),
    StartupFailed { last_observed: StartupPhase },
    TimedOut { last_observed: StartupPhase },
    /// No application state attached at all; validation raced ahead of startup tracking.
    NoApplicationState,
}

impl PhaseWait {
    pub fn is_reached(self) -> bool {
        matches!(self, PhaseWait::Reached(_))
    }

    pub fn last_observed(self) -> StartupPhase {
        match self {
            PhaseWait::Reached(phase)
            | PhaseWait::StartupFailed {
                last_observed: phase,
            }
            | PhaseWait::TimedOut {
                last_observed: phase,
            } => phase,
            PhaseWait::NoApplicationState => StartupPhase::Unknown,
        }
    }
}

/// Polls the application-state provider at a fixed interval until a phase is reached.
///
/// Sleeps go through the tokio clock, so a paused runtime drives the gate deterministically.
#[derive(Clone)]
pub struct PhaseGate {
    app_state: Option<Arc<dyn AppStateProvider>>,
    poll_interval: Duration,
}

impl PhaseGate {
    pub fn new(app_state: Option<Arc<dyn AppStateProvider>>) -> Self {
        Self {
            app_state,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.poll_interval = interval;
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn current_phase(&self) -> Option<StartupPhase> {
        self.app_state.as_ref().map(|state| state.startup_phase())
    }

    pub async fn wait_for_phase(&self, minimum: StartupPhase, timeout: Duration) -> PhaseWait {
        let Some(state) = self.app_state.as_ref() else {
            tracing::warn!(
                phase = minimum.as_str(),
                reason = "app_state_unavailable",
                "phase wait started without application state"
            );
            return PhaseWait::NoApplicationState;
        };

        let deadline = Instant::now() + timeout;
        loop {
            let observed = state.startup_phase();
            if state.startup_failed() {
                tracing::warn!(
                    phase = minimum.as_str(),
                    observed = observed.as_str(),
                    reason = "startup_failed",
                    "phase wait aborted"
                );
                return PhaseWait::StartupFailed {
                    last_observed: observed,
                };
            }

            if observed.has_reached(minimum) {
                return PhaseWait::Reached(observed);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(
                    phase = minimum.as_str(),
                    observed = observed.as_str(),
                    timeout_ms = timeout.as_millis() as u64,
                    "phase wait timed out"
                );
                return PhaseWait::TimedOut {
                    last_observed: observed,
                };
            }

            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
