use crate::app_state::AppStateProvider;
use crate::error::GateError;
use crate::metrics::metrics;
use crate::readiness::orchestrator::ReadinessOrchestrator;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Fate of a deferred connection as seen by the transport that holds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TicketState {
    Pending,
    Released,
    Expired,
    Closed,
}

impl TicketState {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketState::Pending => "PENDING",
            TicketState::Released => "RELEASED",
            TicketState::Expired => "EXPIRED",
            TicketState::Closed => "CLOSED",
        }
    }
}

/// Liveness token shared between the transport and the queue.
///
/// The transport calls [`ConnectionTicket::close`] when the socket goes away; the queue settles the
/// ticket when it releases or expires the connection. Every ticket settles at most once.
#[derive(Clone, Debug)]
pub struct ConnectionTicket {
    state: Arc<watch::Sender<TicketState>>,
}

impl Default for ConnectionTicket {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTicket {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(TicketState::Pending);
        Self {
            state: Arc::new(sender),
        }
    }

    pub fn state(&self) -> TicketState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == TicketState::Closed
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TicketState::Pending
    }

    pub fn close(&self) -> bool {
        self.settle(TicketState::Closed)
    }

    fn settle(&self, next: TicketState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == TicketState::Pending {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Resolves once the ticket leaves `Pending`.
    pub async fn settled(&self) -> TicketState {
        let mut receiver = self.state.subscribe();
        let settled = match receiver
            .wait_for(|state| *state != TicketState::Pending)
            .await
        {
            Ok(state) => *state,
            Err(_) => TicketState::Closed,
        };
        settled
    }
}

struct QueuedConnection {
    ticket: ConnectionTicket,
    connection_id: String,
    enqueued_at: Instant,
    timeout: Duration,
}

impl QueuedConnection {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.enqueued_at) > self.timeout
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_size: usize,
    pub oldest_age_seconds: Option<f64>,
    pub startup_complete: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub ready: bool,
    pub released: Vec<String>,
    pub expired: usize,
    pub remaining: usize,
}

#[derive(Default)]
struct QueueInner {
    entries: Mutex<Vec<QueuedConnection>>,
    startup_complete: AtomicBool,
}

/// Connections deferred while startup is ambiguous.
#[derive(Clone, Default)]
pub struct ConnectionQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct Purge {
    expired: usize,
    closed: usize,
}

impl ConnectionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<QueuedConnection>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn purge_locked(entries: &mut Vec<QueuedConnection>, now: Instant) -> Purge {
        let mut purge = Purge::default();
        entries.retain(|entry| {
            if !entry.ticket.is_pending() {
                purge.closed += 1;
                return false;
            }
            if entry.is_expired(now) {
                entry.ticket.settle(TicketState::Expired);
                tracing::info!(
                    connection_id = entry.connection_id.as_str(),
                    waited_ms = now.saturating_duration_since(entry.enqueued_at).as_millis() as u64,
                    "queued connection expired"
                );
                purge.expired += 1;
                return false;
            }
            true
        });
        purge
    }

    fn record_purge(purge: &Purge, depth: usize) {
        let counters = metrics();
        if purge.expired > 0 {
            counters.record_queue_expired(purge.expired);
        }
        if purge.closed > 0 {
            counters.record_queue_closed(purge.closed);
        }
        counters.set_queue_depth(depth);
    }

    /// Defers a connection. Returns `false` when the ticket is no longer pending or the id is
    /// already queued. Once a drain has succeeded the ticket is released on the spot instead.
    pub fn enqueue(
        &self,
        ticket: &ConnectionTicket,
        connection_id: impl Into<String>,
        timeout: Duration,
    ) -> bool {
        let connection_id = connection_id.into();
        let now = Instant::now();
        let mut entries = self.entries();
        let purge = Self::purge_locked(&mut entries, now);

        // Checked under the entries lock; the drain sets the flag while holding it.
        if self.inner.startup_complete.load(Ordering::Acquire) {
            let depth = entries.len();
            drop(entries);
            Self::record_purge(&purge, depth);

            let released = ticket.settle(TicketState::Released);
            if released {
                metrics().record_queue_released(1);
            }
            crate::gate_event!(
                info,
                "connection released without queueing",
                connection_id = connection_id.as_str(),
                reason = "startup_complete",
                released = released
            );
            return released;
        }

        let accepted = ticket.is_pending()
            && !entries
                .iter()
                .any(|entry| entry.connection_id == connection_id);
        if accepted {
            entries.push(QueuedConnection {
                ticket: ticket.clone(),
                connection_id: connection_id.clone(),
                enqueued_at: now,
                timeout,
            });
        }
        let depth = entries.len();
        drop(entries);

        Self::record_purge(&purge, depth);
        if accepted {
            metrics().record_queue_enqueued();
            crate::gate_event!(
                info,
                "connection queued",
                connection_id = connection_id.as_str(),
                timeout_ms = timeout.as_millis(),
                queue_size = depth
            );
        } else {
            crate::gate_event!(
                debug,
                "connection not queued",
                connection_id = connection_id.as_str(),
                ticket_state = ticket.state().as_str()
            );
        }
        accepted
    }

    /// Removes a connection the transport closed. Idempotent.
    pub fn close(&self, connection_id: &str) -> bool {
        let mut entries = self.entries();
        let mut purge = Self::purge_locked(&mut entries, Instant::now());
        let position = entries
            .iter()
            .position(|entry| entry.connection_id == connection_id);
        let removed = position.map(|index| entries.remove(index));
        let depth = entries.len();
        drop(entries);

        if let Some(entry) = &removed {
            entry.ticket.close();
            purge.closed += 1;
        }
        Self::record_purge(&purge, depth);
        removed.is_some()
    }

    /// Purges expired and closed entries, returning how many expired.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries();
        let purge = Self::purge_locked(&mut entries, Instant::now());
        let depth = entries.len();
        drop(entries);
        Self::record_purge(&purge, depth);
        purge.expired
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries();
        let purge = Self::purge_locked(&mut entries, Instant::now());
        let depth = entries.len();
        drop(entries);
        Self::record_purge(&purge, depth);
        depth
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> QueueStatus {
        let now = Instant::now();
        let mut entries = self.entries();
        let purge = Self::purge_locked(&mut entries, now);
        let oldest_age_seconds = entries
            .iter()
            .map(|entry| now.saturating_duration_since(entry.enqueued_at))
            .max()
            .map(|age| age.as_secs_f64());
        let queue_size = entries.len();
        drop(entries);
        Self::record_purge(&purge, queue_size);

        QueueStatus {
            queue_size,
            oldest_age_seconds,
            startup_complete: self.inner.startup_complete.load(Ordering::Acquire),
        }
    }

    /// Re-runs orchestration once and, when it passes, releases every live queued connection.
    ///
    /// Expired entries are purged before orchestration starts and again before release, so a
    /// connection is either released or expired, never both.
    pub async fn drain_on_startup_complete(
        &self,
        orchestrator: &ReadinessOrchestrator,
        timeout: Duration,
    ) -> Result<DrainOutcome, GateError> {
        let mut outcome = DrainOutcome {
            expired: self.sweep_expired(),
            ..DrainOutcome::default()
        };

        let result = orchestrator.validate(timeout).await?;
        outcome.ready = result.ready();

        let mut entries = self.entries();
        let purge = Self::purge_locked(&mut entries, Instant::now());
        outcome.expired += purge.expired;

        if result.ready() {
            for entry in entries.drain(..) {
                if entry.ticket.settle(TicketState::Released) {
                    outcome.released.push(entry.connection_id);
                }
            }
            self.inner.startup_complete.store(true, Ordering::Release);
        }
        outcome.remaining = entries.len();
        drop(entries);

        Self::record_purge(&purge, outcome.remaining);
        metrics().record_queue_released(outcome.released.len());
        tracing::info!(
            ready = outcome.ready,
            released = outcome.released.len(),
            expired = outcome.expired,
            remaining = outcome.remaining,
            state = result.state().as_str(),
            "connection queue drain finished"
        );
        Ok(outcome)
    }

    /// Periodically purges expired entries until `shutdown` fires.
    pub fn spawn_expiry_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(interval) => {
                        queue.sweep_expired();
                    }
                }
            }
        })
    }

    /// Waits for the application to report startup complete, then drains. Keeps polling while the
    /// drain's orchestration is not ready.
    pub fn spawn_drain_on_startup(
        &self,
        orchestrator: ReadinessOrchestrator,
        app_state: Arc<dyn AppStateProvider>,
        poll_interval: Duration,
        timeout: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<Option<DrainOutcome>> {
        let queue = self.clone();
        tokio::spawn(async move {
            loop {
                if app_state.startup_failed() {
                    tracing::warn!(reason = "startup_failed", "queue drain abandoned");
                    return None;
                }

                if app_state.startup_complete() {
                    let drain = tokio::select! {
                        _ = shutdown.cancelled() => return None,
                        drain = queue.drain_on_startup_complete(&orchestrator, timeout) => drain,
                    };
                    match drain {
                        Ok(outcome) if outcome.ready => return Some(outcome),
                        Ok(_) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "queue drain orchestration fault");
                        }
                    }
                }

                tokio::select! {
                    _ = shutdown.cancelled() => return None,
                    _ = sleep(poll_interval) => {}
                }
            }
        })
    }
}
