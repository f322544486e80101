use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self as stdfmt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::Event;
use tracing::Subscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{
    self as fmt_subscriber, format::Writer, FmtContext, FormatEvent, FormatFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "gatekeeper";
const HTTP_DURATION_BUCKETS: [f64; 10] = [0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

pub fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gatekeeper=info,info"));

    let stdout = std::io::stdout;
    let stderr = std::io::stderr;

    let writer = stdout
        .with_max_level(tracing::Level::INFO)
        .or_else(stderr.with_min_level(tracing::Level::WARN));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(false)
        .with_ansi(false)
        .event_format(KeyValueFormatter::new())
        .fmt_fields(fmt_subscriber::format::DefaultFields::new())
        .with_writer(writer)
        .try_init()
        .map_err(|err| crate::err!("failed to initialise tracing subscriber: {err}"))
}

struct KeyValueFormatter {
    service_name: &'static str,
}

impl KeyValueFormatter {
    const fn new() -> Self {
        Self {
            service_name: SERVICE_NAME,
        }
    }
}

impl<S, N> FormatEvent<S, N> for KeyValueFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());

        let mut fields = visitor.fields;
        fields.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));

        let mut line = String::new();
        push_field(
            &mut line,
            "ts",
            &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        push_field(&mut line, "level", metadata.level().as_str());
        push_field(&mut line, "service", self.service_name);
        push_field(&mut line, "component", metadata.target());
        push_field(&mut line, "pid", &std::process::id().to_string());

        if let Some(span_path) = current_span_path(ctx) {
            push_field(&mut line, "span", &span_path);
        }

        push_field(&mut line, "msg", &message);

        for (key, value) in fields {
            push_field(&mut line, &key, &value);
        }

        if let Some(file) = metadata.file() {
            push_field(&mut line, "file", file);
        }
        if let Some(line_no) = metadata.line() {
            push_field(&mut line, "line", &line_no.to_string());
        }

        writer.write_str(&line)?;
        writer.write_char('\n')
    }
}

fn current_span_path<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    let span = ctx.lookup_current()?;
    let names: Vec<&str> = span.scope().from_root().map(|s| s.name()).collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join("."))
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn record_field(&mut self, field: &Field, value: String) {
        if field.name().is_empty() {
            return;
        }
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_field(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        self.record_field(field, format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_field(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_field(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_field(field, value.to_string());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct RuntimeCounters {
    validations_ready: AtomicU64,
    validations_deferrable: AtomicU64,
    validations_not_ready: AtomicU64,
    validations_skipped: AtomicU64,
    admissions_accepted: AtomicU64,
    admissions_queued: AtomicU64,
    admissions_rejected: AtomicU64,
    admissions_inflight: AtomicU64,
    queue_enqueued: AtomicU64,
    queue_released: AtomicU64,
    queue_expired: AtomicU64,
    queue_closed: AtomicU64,
    queue_depth: AtomicU64,
    probes: ProbeOutcomeRegistry,
    http_requests: HttpRequestMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCountersSnapshot {
    pub validations_ready: u64,
    pub validations_deferrable: u64,
    pub validations_not_ready: u64,
    pub validations_skipped: u64,
    pub admissions_accepted: u64,
    pub admissions_queued: u64,
    pub admissions_rejected: u64,
    pub admissions_inflight: u64,
    pub queue_enqueued: u64,
    pub queue_released: u64,
    pub queue_expired: u64,
    pub queue_closed: u64,
    pub queue_depth: u64,
    pub probes: Vec<ProbeOutcomeSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOutcomeSnapshot {
    pub check: String,
    pub success: u64,
    pub failure: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequestCountSnapshot {
    pub route: String,
    pub status_code: u16,
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpDurationSnapshot {
    pub route: String,
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpMetricsSnapshot {
    pub requests: Vec<HttpRequestCountSnapshot>,
    pub durations: Vec<HttpDurationSnapshot>,
}

#[derive(Default)]
struct HttpRequestMetrics {
    counts: Mutex<HashMap<(String, u16), u64>>,
    durations: Mutex<HashMap<String, HttpDurationBuckets>>,
}

impl HttpRequestMetrics {
    fn record(&self, route: &str, status: u16, duration: Duration) {
        *lock(&self.counts)
            .entry((route.to_string(), status))
            .or_insert(0) += 1;

        lock(&self.durations)
            .entry(route.to_string())
            .or_default()
            .observe(duration.as_secs_f64());
    }

    fn snapshot(&self) -> HttpMetricsSnapshot {
        let mut requests: Vec<_> = lock(&self.counts)
            .iter()
            .map(|((route, status), total)| HttpRequestCountSnapshot {
                route: route.clone(),
                status_code: *status,
                total: *total,
            })
            .collect();
        requests.sort_by(|lhs, rhs| {
            (lhs.route.as_str(), lhs.status_code).cmp(&(rhs.route.as_str(), rhs.status_code))
        });

        let mut durations: Vec<_> = lock(&self.durations)
            .iter()
            .map(|(route, buckets)| HttpDurationSnapshot {
                route: route.clone(),
                buckets: buckets.histogram(),
                sum: buckets.sum,
                count: buckets.total,
            })
            .collect();
        durations.sort_by(|lhs, rhs| lhs.route.cmp(&rhs.route));

        HttpMetricsSnapshot {
            requests,
            durations,
        }
    }
}

#[derive(Default)]
struct HttpDurationBuckets {
    counts: [u64; HTTP_DURATION_BUCKETS.len()],
    sum: f64,
    total: u64,
}

impl HttpDurationBuckets {
    fn observe(&mut self, duration_secs: f64) {
        for (idx, boundary) in HTTP_DURATION_BUCKETS.iter().enumerate() {
            if duration_secs <= *boundary {
                self.counts[idx] += 1;
                break;
            }
        }
        self.sum += duration_secs;
        self.total += 1;
    }

    fn histogram(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0;
        HTTP_DURATION_BUCKETS
            .iter()
            .enumerate()
            .map(|(idx, boundary)| {
                cumulative += self.counts[idx];
                (*boundary, cumulative)
            })
            .collect()
    }
}

#[derive(Default)]
struct ProbeOutcomeRegistry {
    inner: Mutex<BTreeMap<String, (u64, u64)>>,
}

impl ProbeOutcomeRegistry {
    fn record(&self, check: &str, passed: bool) {
        let mut guard = lock(&self.inner);
        let entry = guard.entry(check.to_string()).or_default();
        if passed {
            entry.0 = entry.0.saturating_add(1);
        } else {
            entry.1 = entry.1.saturating_add(1);
        }
    }

    fn snapshot(&self) -> Vec<ProbeOutcomeSnapshot> {
        lock(&self.inner)
            .iter()
            .map(|(check, (success, failure))| ProbeOutcomeSnapshot {
                check: check.clone(),
                success: *success,
                failure: *failure,
            })
            .collect()
    }
}

static RUNTIME_COUNTERS: OnceLock<RuntimeCounters> = OnceLock::new();

pub fn runtime_counters() -> &'static RuntimeCounters {
    RUNTIME_COUNTERS.get_or_init(RuntimeCounters::default)
}

fn add(counter: &AtomicU64, amount: usize) {
    counter.fetch_add(amount as u64, Ordering::Relaxed);
}

impl RuntimeCounters {
    pub fn inc_validations_ready(&self) {
        add(&self.validations_ready, 1);
    }

    pub fn inc_validations_deferrable(&self) {
        add(&self.validations_deferrable, 1);
    }

    pub fn inc_validations_not_ready(&self) {
        add(&self.validations_not_ready, 1);
    }

    pub fn inc_validations_skipped(&self) {
        add(&self.validations_skipped, 1);
    }

    pub fn inc_admissions_accepted(&self) {
        add(&self.admissions_accepted, 1);
    }

    pub fn inc_admissions_queued(&self) {
        add(&self.admissions_queued, 1);
    }

    pub fn inc_admissions_rejected(&self) {
        add(&self.admissions_rejected, 1);
    }

    pub fn inc_admissions_inflight(&self) {
        add(&self.admissions_inflight, 1);
    }

    pub fn dec_admissions_inflight(&self) {
        let _ = self.admissions_inflight.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |current| (current > 0).then_some(current - 1),
        );
    }

    pub fn inc_queue_enqueued(&self) {
        add(&self.queue_enqueued, 1);
    }

    pub fn add_queue_released(&self, count: usize) {
        add(&self.queue_released, count);
    }

    pub fn add_queue_expired(&self, count: usize) {
        add(&self.queue_expired, count);
    }

    pub fn add_queue_closed(&self, count: usize) {
        add(&self.queue_closed, count);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth as u64, Ordering::Relaxed);
    }

    pub fn record_probe(&self, check: &str, passed: bool) {
        self.probes.record(check, passed);
    }

    pub fn record_http_request(&self, route: &str, status: u16, duration: Duration) {
        self.http_requests.record(route, status, duration);
    }

    pub fn http_metrics_snapshot(&self) -> HttpMetricsSnapshot {
        self.http_requests.snapshot()
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        RuntimeCountersSnapshot {
            validations_ready: self.validations_ready.load(Ordering::Relaxed),
            validations_deferrable: self.validations_deferrable.load(Ordering::Relaxed),
            validations_not_ready: self.validations_not_ready.load(Ordering::Relaxed),
            validations_skipped: self.validations_skipped.load(Ordering::Relaxed),
            admissions_accepted: self.admissions_accepted.load(Ordering::Relaxed),
            admissions_queued: self.admissions_queued.load(Ordering::Relaxed),
            admissions_rejected: self.admissions_rejected.load(Ordering::Relaxed),
            admissions_inflight: self.admissions_inflight.load(Ordering::Relaxed),
            queue_enqueued: self.queue_enqueued.load(Ordering::Relaxed),
            queue_released: self.queue_released.load(Ordering::Relaxed),
            queue_expired: self.queue_expired.load(Ordering::Relaxed),
            queue_closed: self.queue_closed.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            probes: self.probes.snapshot(),
        }
    }
}

fn encode_field_value(value: &str) -> String {
    let needs_quotes = value.chars().any(|c| {
        c.is_whitespace()
            || matches!(
                c,
                '"' | '\\' | '=' | '[' | ']' | '{' | '}' | ',' | '\n' | '\r' | '\t'
            )
    });

    if !needs_quotes {
        return value.to_string();
    }

    let mut encoded = String::with_capacity(value.len() + 2);
    encoded.push('"');
    for ch in value.chars() {
        match ch {
            '"' => encoded.push_str("\\\""),
            '\\' => encoded.push_str("\\\\"),
            '\n' => encoded.push_str("\\n"),
            '\r' => encoded.push_str("\\r"),
            '\t' => encoded.push_str("\\t"),
            _ => encoded.push(ch),
        }
    }
    encoded.push('"');
    encoded
}

fn push_field(buffer: &mut String, key: &str, value: &str) {
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(key);
    buffer.push('=');
    buffer.push_str(&encode_field_value(value));
}
