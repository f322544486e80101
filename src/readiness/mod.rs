pub mod guard;
pub mod orchestrator;
pub mod phase_gate;
pub mod profile;
pub mod queue;
pub mod registry;
pub mod result;
pub mod state;
pub mod validator;

pub use guard::{
    health_check, health_check_within, Admission, AdmissionScope, HealthReport, ReadinessGuard,
    DEFAULT_QUEUE_TIMEOUT, HEALTH_CHECK_TIMEOUT,
};
pub use orchestrator::{GateContext, ReadinessOrchestrator};
pub use phase_gate::{PhaseGate, PhaseWait, DEFAULT_POLL_INTERVAL};
pub use profile::{EnvironmentKind, EnvironmentProfile};
pub use queue::{ConnectionQueue, ConnectionTicket, DrainOutcome, QueueStatus, TicketState};
pub use registry::{
    CheckGroup, Probe, ProbeOutcome, ProbeSet, ReadinessProbe, ServiceCheck,
    ServiceCheckRegistry, AGENT_SUPERVISOR_CHECK, AUTH_CHECK, CACHE_CHECK, EVENT_BRIDGE_CHECK,
    INTEGRATION_CHECK, STORAGE_CHECK,
};
pub use result::{
    ReadinessResult, APP_STATE_UNAVAILABLE_MARKER, NEAR_READY_MARKER, PHASE_TIMEOUT_MARKER,
    QUEUE_AVAILABLE_KEY, STARTUP_FAILED_MARKER, TIMEOUT_MARKER, UNKNOWN_PHASE_MARKER,
};
pub use state::{ReadinessState, ReadinessStateMachine, StartupPhase, TransitionError};
pub use validator::{CheckReport, GroupResult, ServiceGroupValidator};
