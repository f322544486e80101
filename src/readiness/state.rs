use serde::Serialize;
use std::fmt;

/// Verdict progression of a single orchestration run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ReadinessState {
    Unknown,
    Initializing,
    DependenciesReady,
    ServicesReady,
    WebSocketReady,
    Failed,
}

impl ReadinessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadinessState::Unknown => "UNKNOWN",
            ReadinessState::Initializing => "INITIALIZING",
            ReadinessState::DependenciesReady => "DEPENDENCIES_READY",
            ReadinessState::ServicesReady => "SERVICES_READY",
            ReadinessState::WebSocketReady => "WEBSOCKET_READY",
            ReadinessState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReadinessState::WebSocketReady | ReadinessState::Failed)
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Startup phase reported by the application-state provider.
///
/// `Unknown` is an observation, not a step: phase tracking itself is stuck or was never started.
/// It has no ordinal and never satisfies a minimum-phase comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum StartupPhase {
    Unknown,
    #[default]
    Init,
    Dependencies,
    Database,
    Cache,
    Services,
    WebSocket,
    Finalize,
    Complete,
}

impl StartupPhase {
    pub const ORDERED: [StartupPhase; 8] = [
        StartupPhase::Init,
        StartupPhase::Dependencies,
        StartupPhase::Database,
        StartupPhase::Cache,
        StartupPhase::Services,
        StartupPhase::WebSocket,
        StartupPhase::Finalize,
        StartupPhase::Complete,
    ];

    pub fn ordinal(self) -> Option<usize> {
        Self::ORDERED.iter().position(|phase| *phase == self)
    }

    pub fn has_reached(self, minimum: StartupPhase) -> bool {
        match (self.ordinal(), minimum.ordinal()) {
            (Some(current), Some(required)) => current >= required,
            _ => false,
        }
    }

    pub fn next(self) -> Option<StartupPhase> {
        let ordinal = self.ordinal()?;
        Self::ORDERED.get(ordinal + 1).copied()
    }

    /// True when this phase is exactly one step before `target`.
    pub fn precedes(self, target: StartupPhase) -> bool {
        self.next() == Some(target)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StartupPhase::Unknown => "unknown",
            StartupPhase::Init => "init",
            StartupPhase::Dependencies => "dependencies",
            StartupPhase::Database => "database",
            StartupPhase::Cache => "cache",
            StartupPhase::Services => "services",
            StartupPhase::WebSocket => "websocket",
            StartupPhase::Finalize => "finalize",
            StartupPhase::Complete => "complete",
        }
    }

    pub fn parse(raw: &str) -> StartupPhase {
        match raw.trim().to_ascii_lowercase().as_str() {
            "init" => StartupPhase::Init,
            "dependencies" => StartupPhase::Dependencies,
            "database" => StartupPhase::Database,
            "cache" => StartupPhase::Cache,
            "services" => StartupPhase::Services,
            "websocket" => StartupPhase::WebSocket,
            "finalize" => StartupPhase::Finalize,
            "complete" => StartupPhase::Complete,
            _ => StartupPhase::Unknown,
        }
    }
}

impl fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionError {
    InvalidTransition {
        from: ReadinessState,
        to: ReadinessState,
    },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::InvalidTransition { from, to } => {
                write!(f, "invalid readiness transition {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Monotonic readiness progression for one orchestration run.
#[derive(Debug)]
pub struct ReadinessStateMachine {
    state: ReadinessState,
}

impl Default for ReadinessStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessStateMachine {
    pub fn new() -> Self {
        Self {
            state: ReadinessState::Unknown,
        }
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    pub fn advance(&mut self, next: ReadinessState) -> Result<ReadinessState, TransitionError> {
        if !Self::is_valid_transition(self.state, next) {
            return Err(TransitionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        let previous = self.state;
        self.state = next;
        tracing::debug!(
            state_from = previous.as_str(),
            state_to = next.as_str(),
            "readiness state transition"
        );
        Ok(self.state)
    }

    /// Any non-terminal state may fail; terminal states are final.
    pub fn fail(&mut self) -> ReadinessState {
        if !self.state.is_terminal() {
            self.state = ReadinessState::Failed;
        }
        self.state
    }

    fn is_valid_transition(current: ReadinessState, next: ReadinessState) -> bool {
        match current {
            ReadinessState::Unknown => matches!(next, ReadinessState::Initializing),
            ReadinessState::Initializing => matches!(
                next,
                ReadinessState::DependenciesReady | ReadinessState::Failed
            ),
            ReadinessState::DependenciesReady => {
                matches!(next, ReadinessState::ServicesReady | ReadinessState::Failed)
            }
            ReadinessState::ServicesReady => {
                matches!(next, ReadinessState::WebSocketReady | ReadinessState::Failed)
            }
            ReadinessState::WebSocketReady | ReadinessState::Failed => false,
        }
    }
}
