use crate::app_state::AppStateProvider;
use crate::config::{EnvironmentSettings, GatekeeperConfig};
use crate::error::GateError;
use crate::metrics::{metrics, ValidationOutcome};
use crate::readiness::phase_gate::{PhaseGate, PhaseWait};
use crate::readiness::profile::EnvironmentProfile;
use crate::readiness::registry::{CheckGroup, ProbeSet, ServiceCheckRegistry};
use crate::readiness::result::{
    ReadinessResult, ResultBuilder, APP_STATE_UNAVAILABLE_MARKER, NEAR_READY_MARKER,
    PHASE_TIMEOUT_MARKER, QUEUE_AVAILABLE_KEY, STARTUP_FAILED_MARKER, TIMEOUT_MARKER,
    UNKNOWN_PHASE_MARKER,
};
use crate::readiness::state::{ReadinessState, ReadinessStateMachine, StartupPhase};
use crate::readiness::validator::ServiceGroupValidator;
use serde_json::json;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};

const SKIPPED_WARNING: &str = "managed cloud platform not detected; readiness validation skipped";
const BYPASS_WARNING: &str = "readiness validation bypassed for non-production environment";

/// Environment-derived configuration shared by concurrent validations.
#[derive(Debug)]
pub struct GateContext {
    pub settings: EnvironmentSettings,
    pub profile: EnvironmentProfile,
    pub registry: ServiceCheckRegistry,
}

impl GateContext {
    fn build(settings: EnvironmentSettings, probes: &ProbeSet) -> Self {
        let profile = EnvironmentProfile::resolve(&settings);
        let registry = ServiceCheckRegistry::build(&profile, &settings.criticality, probes);
        Self {
            settings,
            profile,
            registry,
        }
    }

    fn queue_eligible(&self) -> bool {
        self.profile.is_managed_cloud && !self.profile.is_production()
    }
}

/// Sequences the phase gate and the three check groups into one verdict.
#[derive(Clone)]
pub struct ReadinessOrchestrator {
    probes: ProbeSet,
    gate: PhaseGate,
    settle_delay: Duration,
    context: Arc<RwLock<Arc<GateContext>>>,
}

struct Run {
    started: Instant,
    deadline: Instant,
    machine: ReadinessStateMachine,
    builder: ResultBuilder,
}

impl Run {
    fn new(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + timeout,
            machine: ReadinessStateMachine::new(),
            builder: ResultBuilder::default(),
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn finish(&self, ready: bool) -> ReadinessResult {
        self.builder
            .finish(ready, self.machine.state(), self.started.elapsed())
    }

    fn fail(&mut self) -> ReadinessResult {
        self.machine.fail();
        self.finish(false)
    }
}

impl ReadinessOrchestrator {
    pub fn new(settings: EnvironmentSettings, probes: ProbeSet) -> Self {
        let gate = PhaseGate::new(probes.app_state().cloned());
        let context = GateContext::build(settings, &probes);
        Self {
            probes,
            gate,
            settle_delay: Duration::ZERO,
            context: Arc::new(RwLock::new(Arc::new(context))),
        }
    }

    pub fn from_config(config: &GatekeeperConfig, probes: ProbeSet) -> Self {
        Self::new(config.environment.clone(), probes)
            .with_poll_interval(config.gate.poll_interval)
            .with_settle_delay(config.gate.settle_delay)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.gate = self.gate.with_poll_interval(interval);
        self
    }

    /// Pause after the dependency group passes. A stop-gap for background stabilisation, not a
    /// correctness guarantee; the duration needs tuning per deployment.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn app_state(&self) -> Option<&Arc<dyn AppStateProvider>> {
        self.probes.app_state()
    }

    pub fn context(&self) -> Arc<GateContext> {
        Arc::clone(&self.context.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn profile(&self) -> EnvironmentProfile {
        self.context().profile
    }

    /// Rebuilds the profile and check registry from fresh settings. Runs already in flight keep
    /// the snapshot they started with.
    pub fn update_environment_configuration(&self, settings: EnvironmentSettings) {
        let rebuilt = Arc::new(GateContext::build(settings, &self.probes));
        tracing::info!(
            environment = rebuilt.profile.name(),
            managed_cloud = rebuilt.profile.is_managed_cloud,
            cold_start = rebuilt.profile.is_cold_start_platform,
            "environment configuration updated"
        );
        *self.context.write().unwrap_or_else(PoisonError::into_inner) = rebuilt;
    }

    pub async fn validate(&self, timeout: Duration) -> Result<ReadinessResult, GateError> {
        let context = self.context();
        let mut run = Run::new(timeout);
        run.builder
            .detail("environment", json!(context.profile.name()));
        run.builder
            .detail("timeoutSeconds", json!(timeout.as_secs_f64()));

        if !context.profile.is_managed_cloud {
            return Ok(self.skip(&mut run, SKIPPED_WARNING));
        }
        if context.settings.bypass_validation && !context.profile.is_production() {
            return Ok(self.skip(&mut run, BYPASS_WARNING));
        }

        self.advance(&mut run, ReadinessState::Initializing)?;

        if let Some(failure) = self
            .await_phase(&mut run, &context, StartupPhase::Dependencies)
            .await
        {
            return Ok(failure);
        }
        if let Some(failure) = self
            .run_group(&mut run, &context, CheckGroup::Dependencies)
            .await
        {
            return Ok(failure);
        }
        if !self.settle_delay.is_zero() {
            run.builder.detail(
                "settleDelaySeconds",
                json!(self.settle_delay.as_secs_f64()),
            );
            sleep(self.settle_delay.min(run.remaining())).await;
        }
        self.advance(&mut run, ReadinessState::DependenciesReady)?;

        if let Some(failure) = self
            .await_phase(&mut run, &context, StartupPhase::Services)
            .await
        {
            return Ok(failure);
        }
        if let Some(failure) = self
            .run_group(&mut run, &context, CheckGroup::Services)
            .await
        {
            return Ok(failure);
        }
        self.advance(&mut run, ReadinessState::ServicesReady)?;

        if let Some(failure) = self
            .run_group(&mut run, &context, CheckGroup::Integration)
            .await
        {
            return Ok(failure);
        }
        self.advance(&mut run, ReadinessState::WebSocketReady)?;

        if context.profile.is_cold_start_platform {
            let floor = run.started + context.profile.min_platform_safety_timeout;
            if Instant::now() < floor {
                run.builder.detail(
                    "minimumLatencySeconds",
                    json!(context.profile.min_platform_safety_timeout.as_secs_f64()),
                );
                sleep_until(floor).await;
            }
        }

        let result = run.finish(true);
        metrics().record_validation(ValidationOutcome::Ready);
        tracing::info!(
            environment = context.profile.name(),
            state = result.state().as_str(),
            elapsed_ms = result.elapsed().as_millis() as u64,
            warnings = result.warnings().len(),
            "readiness validation passed"
        );
        Ok(result)
    }

    fn skip(&self, run: &mut Run, warning: &str) -> ReadinessResult {
        run.builder.warn(warning);
        run.builder.detail("validationSkipped", json!(true));
        let result = run
            .builder
            .finish(true, ReadinessState::WebSocketReady, run.started.elapsed());
        metrics().record_validation(ValidationOutcome::Skipped);
        tracing::debug!(reason = warning, "readiness validation skipped");
        result
    }

    fn advance(&self, run: &mut Run, next: ReadinessState) -> Result<(), GateError> {
        let previous = run.machine.state();
        match run.machine.advance(next) {
            Ok(_) => {
                tracing::info!(
                    state_from = previous.as_str(),
                    state_to = next.as_str(),
                    elapsed_ms = run.started.elapsed().as_millis() as u64,
                    "readiness state transition"
                );
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "readiness orchestration fault");
                Err(GateError::Orchestration {
                    reason: err.to_string(),
                    partial: Box::new(run.finish(false)),
                })
            }
        }
    }

    async fn await_phase(
        &self,
        run: &mut Run,
        context: &GateContext,
        target: StartupPhase,
    ) -> Option<ReadinessResult> {
        let wait = self.gate.wait_for_phase(target, run.remaining()).await;
        run.builder
            .detail("phase", json!(wait.last_observed().as_str()));
        if wait.is_reached() {
            return None;
        }

        run.builder.detail("awaitedPhase", json!(target.as_str()));
        let queue_eligible = context.queue_eligible();
        let (marker, queue_available, race) = match wait {
            PhaseWait::TimedOut { last_observed } if last_observed.precedes(StartupPhase::Services) => {
                (NEAR_READY_MARKER, true, Some("near_ready"))
            }
            PhaseWait::TimedOut {
                last_observed: StartupPhase::Unknown,
            } if queue_eligible => (UNKNOWN_PHASE_MARKER, true, Some("unknown_phase")),
            PhaseWait::NoApplicationState if queue_eligible => {
                (UNKNOWN_PHASE_MARKER, true, Some("app_state_unavailable"))
            }
            PhaseWait::NoApplicationState => {
                (APP_STATE_UNAVAILABLE_MARKER, false, Some("app_state_unavailable"))
            }
            PhaseWait::StartupFailed { .. } => (STARTUP_FAILED_MARKER, false, None),
            PhaseWait::TimedOut { .. } | PhaseWait::Reached(_) => {
                (PHASE_TIMEOUT_MARKER, false, None)
            }
        };

        run.builder.fail_service(marker);
        run.builder
            .detail(QUEUE_AVAILABLE_KEY, json!(queue_available));
        if let Some(race) = race {
            run.builder.detail("raceCondition", json!(race));
        }

        let result = run.fail();
        metrics().record_validation(if queue_available {
            ValidationOutcome::Deferrable
        } else {
            ValidationOutcome::NotReady
        });
        tracing::warn!(
            awaited = target.as_str(),
            observed = wait.last_observed().as_str(),
            marker,
            queue_available,
            elapsed_ms = result.elapsed().as_millis() as u64,
            "startup phase not reached"
        );
        Some(result)
    }

    async fn run_group(
        &self,
        run: &mut Run,
        context: &GateContext,
        group: CheckGroup,
    ) -> Option<ReadinessResult> {
        let names = context.registry.names_in(group);
        let validator = ServiceGroupValidator::new(&context.registry);
        let outcome = validator.validate(&names, run.remaining()).await;

        for warning in &outcome.warnings {
            run.builder.warn(warning.clone());
        }
        run.builder.detail(
            group.as_str(),
            json!({
                "successCount": outcome.success_count,
                "totalCount": outcome.total_count,
                "checks": outcome.checks,
            }),
        );

        if outcome.success {
            return None;
        }

        for name in &outcome.failed {
            run.builder.fail_service(name.clone());
        }
        if outcome.timed_out {
            run.builder.fail_service(TIMEOUT_MARKER);
        }
        run.builder.detail(QUEUE_AVAILABLE_KEY, json!(false));

        let result = run.fail();
        metrics().record_validation(ValidationOutcome::NotReady);
        tracing::warn!(
            group = group.as_str(),
            failed = ?outcome.failed,
            timed_out = outcome.timed_out,
            elapsed_ms = result.elapsed().as_millis() as u64,
            "readiness check group failed"
        );
        Some(result)
    }
}
