use crate::readiness::queue::QueueStatus;
use crate::telemetry::{runtime_counters, RuntimeCounters};
use std::fmt::Write as _;
use std::sync::OnceLock;
use std::time::Duration;

pub use crate::telemetry::{
    HttpDurationSnapshot, HttpMetricsSnapshot, ProbeOutcomeSnapshot, RuntimeCountersSnapshot,
};

/// How one orchestration run ended, as counted by the metrics surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    Ready,
    /// Not ready, but the caller may defer the connection.
    Deferrable,
    NotReady,
    Skipped,
}

/// Collector that wraps the runtime counter APIs with a single entrypoint.
pub struct MetricsCollector {
    counters: &'static RuntimeCounters,
}

impl MetricsCollector {
    fn new() -> Self {
        Self {
            counters: runtime_counters(),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        self.counters.snapshot()
    }

    pub fn http_metrics_snapshot(&self) -> HttpMetricsSnapshot {
        self.counters.http_metrics_snapshot()
    }

    pub fn record_validation(&self, outcome: ValidationOutcome) {
        match outcome {
            ValidationOutcome::Ready => self.counters.inc_validations_ready(),
            ValidationOutcome::Deferrable => self.counters.inc_validations_deferrable(),
            ValidationOutcome::NotReady => self.counters.inc_validations_not_ready(),
            ValidationOutcome::Skipped => self.counters.inc_validations_skipped(),
        }
    }

    pub fn record_probe(&self, check: &str, passed: bool) {
        self.counters.record_probe(check, passed);
    }

    pub fn record_admission_accepted(&self) {
        self.counters.inc_admissions_accepted();
    }

    pub fn record_admission_queued(&self) {
        self.counters.inc_admissions_queued();
    }

    pub fn record_admission_rejected(&self) {
        self.counters.inc_admissions_rejected();
    }

    pub fn inc_admissions_inflight(&self) {
        self.counters.inc_admissions_inflight();
    }

    pub fn dec_admissions_inflight(&self) {
        self.counters.dec_admissions_inflight();
    }

    pub fn record_queue_enqueued(&self) {
        self.counters.inc_queue_enqueued();
    }

    pub fn record_queue_released(&self, count: usize) {
        self.counters.add_queue_released(count);
    }

    pub fn record_queue_expired(&self, count: usize) {
        self.counters.add_queue_expired(count);
    }

    pub fn record_queue_closed(&self, count: usize) {
        self.counters.add_queue_closed(count);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.counters.set_queue_depth(depth);
    }

    pub fn record_http_request(&self, route: &str, status: u16, duration: Duration) {
        self.counters.record_http_request(route, status, duration);
    }
}

/// Returns the shared `MetricsCollector` instance.
pub fn metrics() -> &'static MetricsCollector {
    MetricsCollector::global()
}

fn push_metric(output: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {kind}");
    let _ = writeln!(output, "{name} {value}");
}

/// Renders the counters in the Prometheus text exposition format.
pub fn render_prometheus(ready: bool, queue: Option<&QueueStatus>) -> String {
    let snapshot = metrics().snapshot();
    let http = metrics().http_metrics_snapshot();
    let mut output = String::new();

    push_metric(
        &mut output,
        "gatekeeper_ready",
        "Whether the last readiness verdict admitted connections",
        "gauge",
        u64::from(ready),
    );

    let _ = writeln!(
        output,
        "# HELP gatekeeper_validations_total Readiness validations by outcome"
    );
    let _ = writeln!(output, "# TYPE gatekeeper_validations_total counter");
    for (outcome, value) in [
        ("ready", snapshot.validations_ready),
        ("deferrable", snapshot.validations_deferrable),
        ("not_ready", snapshot.validations_not_ready),
        ("skipped", snapshot.validations_skipped),
    ] {
        let _ = writeln!(
            output,
            "gatekeeper_validations_total{{outcome=\"{outcome}\"}} {value}"
        );
    }

    let _ = writeln!(
        output,
        "# HELP gatekeeper_admissions_total Connection admission decisions"
    );
    let _ = writeln!(output, "# TYPE gatekeeper_admissions_total counter");
    for (decision, value) in [
        ("accepted", snapshot.admissions_accepted),
        ("queued", snapshot.admissions_queued),
        ("rejected", snapshot.admissions_rejected),
    ] {
        let _ = writeln!(
            output,
            "gatekeeper_admissions_total{{decision=\"{decision}\"}} {value}"
        );
    }
    push_metric(
        &mut output,
        "gatekeeper_admissions_inflight",
        "Admission checks currently in progress",
        "gauge",
        snapshot.admissions_inflight,
    );

    let _ = writeln!(
        output,
        "# HELP gatekeeper_probe_attempts_total Readiness probe attempts by check and result"
    );
    let _ = writeln!(output, "# TYPE gatekeeper_probe_attempts_total counter");
    for probe in &snapshot.probes {
        let _ = writeln!(
            output,
            "gatekeeper_probe_attempts_total{{check=\"{}\",result=\"success\"}} {}",
            probe.check, probe.success
        );
        let _ = writeln!(
            output,
            "gatekeeper_probe_attempts_total{{check=\"{}\",result=\"failure\"}} {}",
            probe.check, probe.failure
        );
    }

    let _ = writeln!(
        output,
        "# HELP gatekeeper_queue_events_total Deferred connection lifecycle events"
    );
    let _ = writeln!(output, "# TYPE gatekeeper_queue_events_total counter");
    for (event, value) in [
        ("enqueued", snapshot.queue_enqueued),
        ("released", snapshot.queue_released),
        ("expired", snapshot.queue_expired),
        ("closed", snapshot.queue_closed),
    ] {
        let _ = writeln!(
            output,
            "gatekeeper_queue_events_total{{event=\"{event}\"}} {value}"
        );
    }

    let depth = queue
        .map(|status| status.queue_size as u64)
        .unwrap_or(snapshot.queue_depth);
    push_metric(
        &mut output,
        "gatekeeper_queue_depth",
        "Connections currently deferred",
        "gauge",
        depth,
    );
    if let Some(age) = queue.and_then(|status| status.oldest_age_seconds) {
        let _ = writeln!(
            output,
            "# HELP gatekeeper_queue_oldest_age_seconds Age of the oldest deferred connection"
        );
        let _ = writeln!(output, "# TYPE gatekeeper_queue_oldest_age_seconds gauge");
        let _ = writeln!(output, "gatekeeper_queue_oldest_age_seconds {age}");
    }

    if !http.requests.is_empty() {
        let _ = writeln!(
            output,
            "# HELP gatekeeper_http_requests_total Management HTTP requests by route and status"
        );
        let _ = writeln!(output, "# TYPE gatekeeper_http_requests_total counter");
        for request in &http.requests {
            let _ = writeln!(
                output,
                "gatekeeper_http_requests_total{{route=\"{}\",status=\"{}\"}} {}",
                request.route, request.status_code, request.total
            );
        }
    }

    if !http.durations.is_empty() {
        let _ = writeln!(
            output,
            "# HELP gatekeeper_http_request_duration_seconds Management HTTP latency"
        );
        let _ = writeln!(
            output,
            "# TYPE gatekeeper_http_request_duration_seconds histogram"
        );
        for duration in &http.durations {
            for (boundary, count) in &duration.buckets {
                let _ = writeln!(
                    output,
                    "gatekeeper_http_request_duration_seconds_bucket{{route=\"{}\",le=\"{}\"}} {}",
                    duration.route, boundary, count
                );
            }
            let _ = writeln!(
                output,
                "gatekeeper_http_request_duration_seconds_bucket{{route=\"{}\",le=\"+Inf\"}} {}",
                duration.route, duration.count
            );
            let _ = writeln!(
                output,
                "gatekeeper_http_request_duration_seconds_sum{{route=\"{}\"}} {}",
                duration.route, duration.sum
            );
            let _ = writeln!(
                output,
                "gatekeeper_http_request_duration_seconds_count{{route=\"{}\"}} {}",
                duration.route, duration.count
            );
        }
    }

    output
}
