use crate::metrics::metrics;
use crate::readiness::registry::{ProbeOutcome, ServiceCheck, ServiceCheckRegistry};
use crate::retry::RetrySchedule;
use futures_util::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub name: String,
    pub critical: bool,
    pub passed: bool,
    pub attempts: u32,
    pub outcome: String,
    /// The group deadline cut retries short.
    pub budget_exhausted: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResult {
    pub success: bool,
    pub failed: Vec<String>,
    pub warnings: Vec<String>,
    pub success_count: usize,
    pub total_count: usize,
    pub timed_out: bool,
    pub checks: Vec<CheckReport>,
}

/// Runs a named subset of registered checks concurrently under one outer deadline.
pub struct ServiceGroupValidator<'a> {
    registry: &'a ServiceCheckRegistry,
}

impl<'a> ServiceGroupValidator<'a> {
    pub fn new(registry: &'a ServiceCheckRegistry) -> Self {
        Self { registry }
    }

    pub async fn validate(&self, names: &[String], timeout: Duration) -> GroupResult {
        let deadline = Instant::now() + timeout;

        let mut result = GroupResult {
            total_count: names.len(),
            ..GroupResult::default()
        };

        let mut pending = Vec::with_capacity(names.len());
        for name in names {
            match self.registry.get(name) {
                Some(check) => pending.push(run_check(check, deadline)),
                None => {
                    result.failed.push(name.clone());
                    result
                        .warnings
                        .push(format!("check `{name}` is not registered"));
                }
            }
        }

        for report in join_all(pending).await {
            if report.passed {
                result.success_count += 1;
            } else if report.critical {
                if report.budget_exhausted {
                    result.timed_out = true;
                }
                if !result.failed.contains(&report.name) {
                    result.failed.push(report.name.clone());
                }
            } else {
                result.warnings.push(format!(
                    "non-critical service `{}` unavailable ({} after {} attempt(s)); continuing degraded",
                    report.name, report.outcome, report.attempts
                ));
            }
            result.checks.push(report);
        }

        result.success = result.failed.is_empty();
        result
    }
}

async fn run_check(check: &ServiceCheck, deadline: Instant) -> CheckReport {
    let schedule = RetrySchedule::new(check.retry_count, check.retry_delay, deadline);
    let mut attempts = 0;
    let mut last = ProbeOutcome::TimedOut;

    let budget_exhausted = loop {
        let remaining = schedule.remaining(Instant::now());
        if remaining.is_zero() {
            break true;
        }

        attempts += 1;
        let outcome = check.probe.run(check.timeout.min(remaining)).await;
        metrics().record_probe(&check.name, outcome.passed());

        if outcome.passed() {
            return CheckReport {
                name: check.name.clone(),
                critical: check.critical,
                passed: true,
                attempts,
                outcome: outcome.label().to_string(),
                budget_exhausted: false,
            };
        }

        if let ProbeOutcome::Errored(reason) = &outcome {
            tracing::debug!(
                check = check.name.as_str(),
                attempts,
                error = reason.as_str(),
                "readiness probe errored"
            );
        } else {
            tracing::debug!(
                check = check.name.as_str(),
                attempts,
                outcome = outcome.label(),
                "readiness probe attempt failed"
            );
        }
        last = outcome;

        match schedule.next_delay(attempts, Instant::now()) {
            Some(delay) => sleep(delay).await,
            None => break attempts < schedule.max_attempts(),
        }
    };

    tracing::info!(
        check = check.name.as_str(),
        critical = check.critical,
        attempts,
        outcome = last.label(),
        budget_exhausted,
        "readiness check failed"
    );

    CheckReport {
        name: check.name.clone(),
        critical: check.critical,
        passed: false,
        attempts,
        outcome: last.label().to_string(),
        budget_exhausted,
    }
}
