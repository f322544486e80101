#![allow(clippy::result_large_err)]

pub mod app_state;
pub mod config;
pub mod error;
pub mod logging;
#[cfg(feature = "management")]
pub mod management;
pub mod metrics;
pub mod readiness;
pub mod retry;
pub mod telemetry;

pub use app_state::{AppStateProvider, SharedAppState};
pub use config::{EnvironmentSettings, GateSettings, GatekeeperConfig, ManagementSettings};
pub use error::{Error, GateError, Result};
pub use readiness::{
    ConnectionQueue, ConnectionTicket, ReadinessGuard, ReadinessOrchestrator, ReadinessResult,
    ReadinessState, StartupPhase,
};
