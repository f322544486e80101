use crate::app_state::AppStateProvider;
use crate::error::Result as GatekeeperResult;
use crate::readiness::profile::EnvironmentProfile;
use crate::readiness::state::StartupPhase;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

pub const STORAGE_CHECK: &str = "storage";
pub const CACHE_CHECK: &str = "cache";
pub const AUTH_CHECK: &str = "auth";
pub const AGENT_SUPERVISOR_CHECK: &str = "agent_supervisor";
pub const EVENT_BRIDGE_CHECK: &str = "event_bridge";
pub const INTEGRATION_CHECK: &str = "integration";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CheckGroup {
    Dependencies,
    Services,
    Integration,
}

impl CheckGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckGroup::Dependencies => "dependencies",
            CheckGroup::Services => "services",
            CheckGroup::Integration => "integration",
        }
    }
}

/// Asynchronous readiness probe. Errors count as a failed attempt.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn check(&self) -> GatekeeperResult<bool>;
}

struct FnProbe<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ReadinessProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = GatekeeperResult<bool>> + Send,
{
    async fn check(&self) -> GatekeeperResult<bool> {
        (self.f)().await
    }
}

/// Single call contract for every readiness probe, sync or async.
#[derive(Clone)]
pub enum Probe {
    /// Runs on the blocking pool so a slow driver call cannot stall sibling probes.
    Blocking(Arc<dyn Fn() -> bool + Send + Sync>),
    Async(Arc<dyn ReadinessProbe>),
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Blocking(_) => f.write_str("Probe::Blocking"),
            Probe::Async(_) => f.write_str("Probe::Async"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Passed,
    Failed,
    Errored(String),
    TimedOut,
}

impl ProbeOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, ProbeOutcome::Passed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Passed => "passed",
            ProbeOutcome::Failed => "failed",
            ProbeOutcome::Errored(_) => "errored",
            ProbeOutcome::TimedOut => "timed_out",
        }
    }
}

impl Probe {
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Probe::Blocking(Arc::new(f))
    }

    pub fn from_async<P>(probe: P) -> Self
    where
        P: ReadinessProbe + 'static,
    {
        Probe::Async(Arc::new(probe))
    }

    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GatekeeperResult<bool>> + Send + 'static,
    {
        Probe::Async(Arc::new(FnProbe { f }))
    }

    pub fn constant(value: bool) -> Self {
        Probe::blocking(move || value)
    }

    /// Reads the named availability flag from the application state; missing handles fail.
    pub fn service_flag(app_state: Option<Arc<dyn AppStateProvider>>, service: &str) -> Self {
        let service = service.to_string();
        Probe::blocking(move || {
            app_state
                .as_ref()
                .and_then(|state| state.service_available(&service))
                .unwrap_or(false)
        })
    }

    /// Cross-cutting check: startup has not failed and the services phase has been reached.
    pub fn startup_progress(app_state: Option<Arc<dyn AppStateProvider>>) -> Self {
        Probe::blocking(move || {
            app_state.as_ref().is_some_and(|state| {
                !state.startup_failed()
                    && (state.startup_complete()
                        || state.startup_phase().has_reached(StartupPhase::Services))
            })
        })
    }

    /// Runs one attempt bounded by `timeout`. Errors and panics never escape.
    pub async fn run(&self, timeout: Duration) -> ProbeOutcome {
        match self {
            Probe::Blocking(f) => {
                let f = Arc::clone(f);
                let task = tokio::task::spawn_blocking(move || f());
                match tokio::time::timeout(timeout, task).await {
                    Ok(Ok(true)) => ProbeOutcome::Passed,
                    Ok(Ok(false)) => ProbeOutcome::Failed,
                    Ok(Err(join_error)) => ProbeOutcome::Errored(join_error.to_string()),
                    Err(_) => ProbeOutcome::TimedOut,
                }
            }
            Probe::Async(probe) => {
                let attempt = AssertUnwindSafe(probe.check()).catch_unwind();
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(Ok(Ok(true))) => ProbeOutcome::Passed,
                    Ok(Ok(Ok(false))) => ProbeOutcome::Failed,
                    Ok(Ok(Err(err))) => ProbeOutcome::Errored(err.to_string()),
                    Ok(Err(_)) => ProbeOutcome::Errored("probe panicked".to_string()),
                    Err(_) => ProbeOutcome::TimedOut,
                }
            }
        }
    }
}

/// Probes supplied by the application, keyed by check name.
#[derive(Clone, Default)]
pub struct ProbeSet {
    app_state: Option<Arc<dyn AppStateProvider>>,
    probes: HashMap<String, Probe>,
}

impl ProbeSet {
    pub fn new(app_state: Option<Arc<dyn AppStateProvider>>) -> Self {
        Self {
            app_state,
            probes: HashMap::new(),
        }
    }

    pub fn with_probe(mut self, name: impl Into<String>, probe: Probe) -> Self {
        self.probes.insert(name.into(), probe);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, probe: Probe) {
        self.probes.insert(name.into(), probe);
    }

    pub fn app_state(&self) -> Option<&Arc<dyn AppStateProvider>> {
        self.app_state.as_ref()
    }

    fn resolve(&self, name: &str) -> Probe {
        if let Some(probe) = self.probes.get(name) {
            return probe.clone();
        }
        if name == INTEGRATION_CHECK {
            Probe::startup_progress(self.app_state.clone())
        } else {
            Probe::service_flag(self.app_state.clone(), name)
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceCheck {
    pub name: String,
    pub group: CheckGroup,
    pub probe: Probe,
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub critical: bool,
    pub description: String,
}

struct CheckTemplate {
    name: &'static str,
    group: CheckGroup,
    managed_timeout: Duration,
    self_hosted_timeout: Duration,
    managed_retries: u32,
    self_hosted_retries: u32,
    retry_delay: Duration,
    critical_outside_production: bool,
    description: &'static str,
}

const CHECK_TEMPLATES: [CheckTemplate; 6] = [
    CheckTemplate {
        name: STORAGE_CHECK,
        group: CheckGroup::Dependencies,
        managed_timeout: Duration::from_secs(2),
        self_hosted_timeout: Duration::from_secs(10),
        managed_retries: 1,
        self_hosted_retries: 3,
        retry_delay: Duration::from_millis(500),
        critical_outside_production: true,
        description: "primary storage accepts connections",
    },
    CheckTemplate {
        name: CACHE_CHECK,
        group: CheckGroup::Dependencies,
        managed_timeout: Duration::from_secs(2),
        self_hosted_timeout: Duration::from_secs(10),
        managed_retries: 1,
        self_hosted_retries: 3,
        retry_delay: Duration::from_millis(500),
        critical_outside_production: false,
        description: "cache client reports connectivity",
    },
    CheckTemplate {
        name: AUTH_CHECK,
        group: CheckGroup::Dependencies,
        managed_timeout: Duration::from_secs(2),
        self_hosted_timeout: Duration::from_secs(10),
        managed_retries: 2,
        self_hosted_retries: 2,
        retry_delay: Duration::from_millis(500),
        critical_outside_production: true,
        description: "authentication service can validate tokens",
    },
    CheckTemplate {
        name: AGENT_SUPERVISOR_CHECK,
        group: CheckGroup::Services,
        managed_timeout: Duration::from_secs(5),
        self_hosted_timeout: Duration::from_secs(5),
        managed_retries: 2,
        self_hosted_retries: 2,
        retry_delay: Duration::from_secs(1),
        critical_outside_production: true,
        description: "worker supervisor is accepting work",
    },
    CheckTemplate {
        name: EVENT_BRIDGE_CHECK,
        group: CheckGroup::Services,
        managed_timeout: Duration::from_secs(5),
        self_hosted_timeout: Duration::from_secs(5),
        managed_retries: 2,
        self_hosted_retries: 2,
        retry_delay: Duration::from_secs(1),
        critical_outside_production: true,
        description: "event bridge is forwarding to connections",
    },
    CheckTemplate {
        name: INTEGRATION_CHECK,
        group: CheckGroup::Integration,
        managed_timeout: Duration::from_secs(3),
        self_hosted_timeout: Duration::from_secs(3),
        managed_retries: 1,
        self_hosted_retries: 1,
        retry_delay: Duration::from_millis(500),
        critical_outside_production: true,
        description: "startup progressed far enough to serve connections",
    },
];

/// Named readiness checks for the current environment. Rebuilt wholesale, never patched.
#[derive(Clone, Debug, Default)]
pub struct ServiceCheckRegistry {
    checks: Vec<ServiceCheck>,
}

impl ServiceCheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(
        profile: &EnvironmentProfile,
        overrides: &BTreeMap<String, bool>,
        probes: &ProbeSet,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(profile, overrides, probes);
        registry
    }

    pub fn register(
        &mut self,
        profile: &EnvironmentProfile,
        overrides: &BTreeMap<String, bool>,
        probes: &ProbeSet,
    ) {
        let checks = CHECK_TEMPLATES
            .iter()
            .map(|template| {
                let (base_timeout, retry_count) = if profile.is_managed_cloud {
                    (template.managed_timeout, template.managed_retries)
                } else {
                    (template.self_hosted_timeout, template.self_hosted_retries)
                };

                let critical = if profile.is_production() {
                    true
                } else {
                    overrides
                        .get(template.name)
                        .copied()
                        .unwrap_or(template.critical_outside_production)
                };

                ServiceCheck {
                    name: template.name.to_string(),
                    group: template.group,
                    probe: probes.resolve(template.name),
                    timeout: profile.optimized_timeout(base_timeout),
                    retry_count,
                    retry_delay: template.retry_delay,
                    critical,
                    description: template.description.to_string(),
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(
            environment = profile.name(),
            managed_cloud = profile.is_managed_cloud,
            cold_start = profile.is_cold_start_platform,
            checks = checks.len(),
            "service check registry rebuilt"
        );

        self.checks = checks;
    }

    pub fn get(&self, name: &str) -> Option<&ServiceCheck> {
        self.checks.iter().find(|check| check.name == name)
    }

    pub fn names_in(&self, group: CheckGroup) -> Vec<String> {
        self.checks
            .iter()
            .filter(|check| check.group == group)
            .map(|check| check.name.clone())
            .collect()
    }

    pub fn critical_names(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|check| check.critical)
            .map(|check| check.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceCheck> {
        self.checks.iter()
    }
}
