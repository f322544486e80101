use crate::readiness::state::ReadinessState;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

pub const QUEUE_AVAILABLE_KEY: &str = "queueAvailable";

pub const TIMEOUT_MARKER: &str = "timeout";
pub const PHASE_TIMEOUT_MARKER: &str = "startup_phase_timeout";
pub const NEAR_READY_MARKER: &str = "startup_phase_near_ready_queuing_available";
pub const UNKNOWN_PHASE_MARKER: &str = "startup_phase_unknown_queuing_available";
pub const STARTUP_FAILED_MARKER: &str = "startup_failed";
pub const APP_STATE_UNAVAILABLE_MARKER: &str = "app_state_unavailable";

/// Verdict of one orchestration run. Immutable once returned.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResult {
    ready: bool,
    state: ReadinessState,
    #[serde(serialize_with = "serialize_secs")]
    elapsed: Duration,
    failed_services: Vec<String>,
    warnings: Vec<String>,
    details: BTreeMap<String, Value>,
}

fn serialize_secs<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(value.as_secs_f64())
}

impl ReadinessResult {
    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn failed_services(&self) -> &[String] {
        &self.failed_services
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn queue_available(&self) -> bool {
        self.details
            .get(QUEUE_AVAILABLE_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Copy presented to the transport when the connection was deferred instead of rejected.
    pub(crate) fn queued(&self, connection_id: &str) -> ReadinessResult {
        let mut details = self.details.clone();
        details.insert("queued".to_string(), Value::Bool(true));
        details.insert("connectionId".to_string(), json!(connection_id));
        details.insert("deferredFailures".to_string(), json!(self.failed_services));

        let mut warnings = self.warnings.clone();
        warnings.push("connection queued pending startup completion".to_string());

        ReadinessResult {
            ready: true,
            state: self.state,
            elapsed: self.elapsed,
            failed_services: Vec::new(),
            warnings,
            details,
        }
    }
}

/// Accumulates a result while a run is in flight; only `finish` hands out the value.
#[derive(Debug, Default)]
pub(crate) struct ResultBuilder {
    failed_services: Vec<String>,
    warnings: Vec<String>,
    details: BTreeMap<String, Value>,
}

impl ResultBuilder {
    pub(crate) fn fail_service(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.failed_services.contains(&name) {
            self.failed_services.push(name);
        }
    }

    pub(crate) fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub(crate) fn detail(&mut self, key: &str, value: Value) {
        self.details.insert(key.to_string(), value);
    }

    pub(crate) fn finish(
        &self,
        ready: bool,
        state: ReadinessState,
        elapsed: Duration,
    ) -> ReadinessResult {
        let mut details = self.details.clone();
        details
            .entry(QUEUE_AVAILABLE_KEY.to_string())
            .or_insert(Value::Bool(false));
        details.insert("elapsedSeconds".to_string(), json!(elapsed.as_secs_f64()));

        ReadinessResult {
            ready,
            state,
            elapsed,
            failed_services: self.failed_services.clone(),
            warnings: self.warnings.clone(),
            details,
        }
    }
}
