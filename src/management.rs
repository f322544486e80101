use crate::config::ManagementSettings;
use crate::error::{Context, Result};
use crate::metrics::{metrics as metrics_collector, render_prometheus};
use crate::readiness::guard::{health_check_within, HealthReport, ReadinessGuard};
use crate::retry::retry_after_seconds;
use axum::body::Body;
use axum::http::{
    header::{CONTENT_TYPE, RETRY_AFTER},
    HeaderValue, StatusCode,
};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde_json::json;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const LIVE_PATH: &str = "/health/live";
pub const READY_PATH: &str = "/health/ready";
pub const QUEUE_PATH: &str = "/health/queue";
pub const METRICS_PATH: &str = "/metrics";

/// Shared state behind the management routes.
#[derive(Clone)]
pub struct GateState {
    pub guard: ReadinessGuard,
    pub health_timeout: Duration,
}

impl GateState {
    pub fn new(guard: ReadinessGuard, health_timeout: Duration) -> Self {
        Self {
            guard,
            health_timeout,
        }
    }

    async fn health(&self) -> HealthReport {
        let orchestrator = self.guard.orchestrator();
        let settings = orchestrator.context().settings.clone();
        health_check_within(
            orchestrator.app_state().cloned(),
            &settings,
            self.health_timeout,
        )
        .await
    }
}

pub struct ManagementServer {
    addr: SocketAddr,
}

impl ManagementServer {
    pub fn build(settings: &ManagementSettings) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid management listen address {}:{}",
                    settings.host, settings.port
                )
            })?;
        Ok(Self { addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn serve(self, state: GateState, shutdown: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind management listener on {}", self.addr))?;

        tracing::info!("management server listening on {}", self.addr);

        axum::serve(listener, router(state))
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            })
            .await
            .context("management server exited abnormally")?;

        Ok(())
    }
}

pub fn router(state: GateState) -> Router {
    Router::new()
        .route(LIVE_PATH, get(live))
        .route(READY_PATH, get(ready))
        .route(QUEUE_PATH, get(queue_status))
        .route(METRICS_PATH, get(metrics))
        .layer(Extension(state))
}

fn observe(route: &str, started: Instant, response: Response) -> Response {
    metrics_collector().record_http_request(route, response.status().as_u16(), started.elapsed());
    response
}

async fn live() -> impl IntoResponse {
    let started = Instant::now();
    let response = (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "ts": Utc::now().to_rfc3339(),
        })),
    )
        .into_response();
    observe(LIVE_PATH, started, response)
}

async fn ready(Extension(state): Extension<GateState>) -> impl IntoResponse {
    let started = Instant::now();
    let report = state.health().await;
    let payload = Json(json!({
        "ready": report.ready,
        "details": report.details,
        "ts": Utc::now().to_rfc3339(),
    }));

    let response = if report.ready {
        (StatusCode::OK, payload).into_response()
    } else {
        let mut response = payload.into_response();
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        let retry_after = retry_after_seconds(state.health_timeout);
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    };
    observe(READY_PATH, started, response)
}

async fn queue_status(Extension(state): Extension<GateState>) -> impl IntoResponse {
    let started = Instant::now();
    let status = state.guard.queue().status();
    let response = (
        StatusCode::OK,
        Json(json!({
            "queue": status,
            "inflight": state.guard.inflight(),
            "ts": Utc::now().to_rfc3339(),
        })),
    )
        .into_response();
    observe(QUEUE_PATH, started, response)
}

async fn metrics(Extension(state): Extension<GateState>) -> impl IntoResponse {
    let started = Instant::now();
    let report = state.health().await;
    let status = state.guard.queue().status();
    let body = render_prometheus(report.ready, Some(&status));

    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    observe(METRICS_PATH, started, response)
}
