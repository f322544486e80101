use crate::app_state::AppStateProvider;
use crate::config::EnvironmentSettings;
use crate::error::GateError;
use crate::metrics::metrics;
use crate::readiness::orchestrator::ReadinessOrchestrator;
use crate::readiness::profile::EnvironmentProfile;
use crate::readiness::queue::{ConnectionQueue, ConnectionTicket};
use crate::readiness::registry::{
    AGENT_SUPERVISOR_CHECK, AUTH_CHECK, CACHE_CHECK, EVENT_BRIDGE_CHECK, STORAGE_CHECK,
};
use crate::readiness::result::ReadinessResult;
use crate::retry::retry_after_seconds;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(30);
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

const REPORTED_SERVICES: [&str; 5] = [
    STORAGE_CHECK,
    CACHE_CHECK,
    AUTH_CHECK,
    AGENT_SUPERVISOR_CHECK,
    EVENT_BRIDGE_CHECK,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Admission {
    Accepted,
    /// Held in the connection queue until startup completes.
    Queued,
}

impl Admission {
    pub fn as_str(self) -> &'static str {
        match self {
            Admission::Accepted => "accepted",
            Admission::Queued => "queued",
        }
    }
}

struct InflightGuard {
    counter: Arc<AtomicUsize>,
}

impl InflightGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        metrics().inc_admissions_inflight();
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
        metrics().dec_admissions_inflight();
    }
}

/// Proof that a connection passed the gate. Cleanup runs when the scope drops, on every exit path.
pub struct AdmissionScope {
    connection_id: String,
    admission: Admission,
    result: ReadinessResult,
    _inflight: InflightGuard,
}

impl AdmissionScope {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn admission(&self) -> Admission {
        self.admission
    }

    pub fn is_queued(&self) -> bool {
        self.admission == Admission::Queued
    }

    pub fn result(&self) -> &ReadinessResult {
        &self.result
    }
}

impl Drop for AdmissionScope {
    fn drop(&mut self) {
        crate::gate_event!(
            debug,
            "admission scope closed",
            connection_id = self.connection_id.as_str(),
            admission = self.admission.as_str()
        );
    }
}

/// Validate-else-queue-or-reject wrapper around connection acceptance.
#[derive(Clone)]
pub struct ReadinessGuard {
    orchestrator: ReadinessOrchestrator,
    queue: ConnectionQueue,
    queue_timeout: Duration,
    inflight: Arc<AtomicUsize>,
}

impl ReadinessGuard {
    pub fn new(orchestrator: ReadinessOrchestrator, queue: ConnectionQueue) -> Self {
        Self {
            orchestrator,
            queue,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
            inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    pub fn orchestrator(&self) -> &ReadinessOrchestrator {
        &self.orchestrator
    }

    pub fn queue(&self) -> &ConnectionQueue {
        &self.queue
    }

    /// Admission checks currently between entry and scope drop.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub async fn validate(&self, timeout: Duration) -> Result<ReadinessResult, GateError> {
        self.orchestrator.validate(timeout).await
    }

    /// Runs the orchestrator for one inbound connection.
    ///
    /// A deferrable failure with a live ticket enqueues the connection and hands back a queued
    /// scope; any other failure is a [`GateError::NotReady`] carrying a `Retry-After` hint.
    pub async fn admit(
        &self,
        connection_id: &str,
        ticket: Option<&ConnectionTicket>,
        timeout: Duration,
    ) -> Result<AdmissionScope, GateError> {
        let inflight = InflightGuard::acquire(&self.inflight);

        let result = match self.orchestrator.validate(timeout).await {
            Ok(result) => result,
            Err(err) => {
                metrics().record_admission_rejected();
                crate::gate_event!(
                    error,
                    "connection rejected",
                    connection_id = connection_id,
                    reason = err
                );
                return Err(err);
            }
        };

        if result.ready() {
            metrics().record_admission_accepted();
            crate::gate_event!(
                info,
                "connection admitted",
                connection_id = connection_id,
                state = result.state().as_str(),
                elapsed_ms = result.elapsed().as_millis()
            );
            return Ok(AdmissionScope {
                connection_id: connection_id.to_string(),
                admission: Admission::Accepted,
                result,
                _inflight: inflight,
            });
        }

        if result.queue_available() {
            if let Some(ticket) = ticket {
                if self.queue.enqueue(ticket, connection_id, self.queue_timeout) {
                    metrics().record_admission_queued();
                    return Ok(AdmissionScope {
                        connection_id: connection_id.to_string(),
                        admission: Admission::Queued,
                        result: result.queued(connection_id),
                        _inflight: inflight,
                    });
                }
            }
        }

        let retry_after = Duration::from_secs(retry_after_seconds(timeout));
        metrics().record_admission_rejected();
        crate::gate_event!(
            warn,
            "connection rejected",
            connection_id = connection_id,
            state = result.state().as_str(),
            failed = result.failed_services().join(","),
            retry_after_s = retry_after.as_secs()
        );
        Err(GateError::NotReady {
            state: result.state(),
            failed_services: result.failed_services().to_vec(),
            retry_after,
            result: Box::new(result),
        })
    }

    /// Runs `handler` with an admitted scope; the scope drops when the handler's future completes.
    pub async fn with_admission<F, Fut, T>(
        &self,
        connection_id: &str,
        ticket: Option<&ConnectionTicket>,
        timeout: Duration,
        handler: F,
    ) -> Result<T, GateError>
    where
        F: FnOnce(AdmissionScope) -> Fut,
        Fut: Future<Output = T>,
    {
        let scope = self.admit(connection_id, ticket, timeout).await?;
        Ok(handler(scope).await)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthReport {
    pub ready: bool,
    pub details: Map<String, Value>,
}

pub async fn health_check(
    app_state: Option<Arc<dyn AppStateProvider>>,
    settings: &EnvironmentSettings,
) -> HealthReport {
    health_check_within(app_state, settings, HEALTH_CHECK_TIMEOUT).await
}

/// Point-in-time readiness summary that never runs probes or mutates state.
pub async fn health_check_within(
    app_state: Option<Arc<dyn AppStateProvider>>,
    settings: &EnvironmentSettings,
    timeout: Duration,
) -> HealthReport {
    let profile = EnvironmentProfile::resolve(settings);
    let mut details = Map::new();
    details.insert("environment".to_string(), json!(profile.name()));
    details.insert("managedCloud".to_string(), json!(profile.is_managed_cloud));
    details.insert(
        "coldStartPlatform".to_string(),
        json!(profile.is_cold_start_platform),
    );

    let Some(state) = app_state else {
        details.insert("reason".to_string(), json!("app_state_unavailable"));
        return HealthReport {
            ready: !profile.is_managed_cloud,
            details,
        };
    };

    let sample = tokio::task::spawn_blocking(move || {
        let services: Map<String, Value> = REPORTED_SERVICES
            .iter()
            .map(|service| {
                (
                    service.to_string(),
                    state
                        .service_available(service)
                        .map(Value::Bool)
                        .unwrap_or(Value::Null),
                )
            })
            .collect();
        (
            state.startup_phase(),
            state.startup_complete(),
            state.startup_failed(),
            services,
        )
    });

    match tokio::time::timeout(timeout, sample).await {
        Ok(Ok((phase, complete, failed, services))) => {
            details.insert("phase".to_string(), json!(phase.as_str()));
            details.insert("startupComplete".to_string(), json!(complete));
            details.insert("startupFailed".to_string(), json!(failed));
            details.insert("services".to_string(), Value::Object(services));
            HealthReport {
                ready: !failed && (complete || !profile.is_managed_cloud),
                details,
            }
        }
        Ok(Err(join_error)) => {
            details.insert("reason".to_string(), json!("health_probe_failed"));
            details.insert("error".to_string(), json!(join_error.to_string()));
            HealthReport {
                ready: false,
                details,
            }
        }
        Err(_) => {
            details.insert("reason".to_string(), json!("timeout"));
            details.insert("timeoutSeconds".to_string(), json!(timeout.as_secs_f64()));
            HealthReport {
                ready: false,
                details,
            }
        }
    }
}
