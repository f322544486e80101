#[path = "../common/mod.rs"]
mod common;

use gatekeeper::config::EnvironmentSettings;
use gatekeeper::readiness::{
    ConnectionQueue, ConnectionTicket, StartupPhase, TicketState, STORAGE_CHECK,
};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const LONG: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn enqueue_rejects_closed_tickets_and_duplicate_ids() {
    let queue = ConnectionQueue::new();
    let first = ConnectionTicket::new();
    assert!(queue.enqueue(&first, "conn-1", LONG));

    let duplicate = ConnectionTicket::new();
    assert!(!queue.enqueue(&duplicate, "conn-1", LONG));

    let closed = ConnectionTicket::new();
    assert!(closed.close());
    assert!(!queue.enqueue(&closed, "conn-2", LONG));

    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn status_reports_size_and_oldest_age() {
    let queue = ConnectionQueue::new();
    assert_eq!(queue.status().oldest_age_seconds, None);

    queue.enqueue(&ConnectionTicket::new(), "conn-1", LONG);
    sleep(Duration::from_secs(2)).await;
    queue.enqueue(&ConnectionTicket::new(), "conn-2", LONG);

    let status = queue.status();
    assert_eq!(status.queue_size, 2);
    assert_eq!(status.oldest_age_seconds, Some(2.0));
    assert!(!status.startup_complete);
}

#[tokio::test(start_paused = true)]
async fn expired_entries_are_purged_once() {
    let queue = ConnectionQueue::new();
    let ticket = ConnectionTicket::new();
    queue.enqueue(&ticket, "conn-1", Duration::from_secs(1));

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(queue.sweep_expired(), 1);
    assert_eq!(queue.sweep_expired(), 0);
    assert_eq!(ticket.state(), TicketState::Expired);
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn entries_survive_until_their_timeout_elapses() {
    let queue = ConnectionQueue::new();
    queue.enqueue(&ConnectionTicket::new(), "conn-1", Duration::from_secs(1));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(queue.sweep_expired(), 0);
    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent_and_keyed_by_id() {
    let queue = ConnectionQueue::new();
    let ticket = ConnectionTicket::new();
    queue.enqueue(&ticket, "conn-1", LONG);

    assert!(queue.close("conn-1"));
    assert!(!queue.close("conn-1"));
    assert!(!queue.close("never-queued"));
    assert!(ticket.is_closed());
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn transport_side_close_is_purged_lazily() {
    let queue = ConnectionQueue::new();
    let ticket = ConnectionTicket::new();
    queue.enqueue(&ticket, "conn-1", LONG);

    ticket.close();
    assert_eq!(queue.status().queue_size, 0);
}

#[tokio::test(start_paused = true)]
async fn drain_releases_live_entries_and_counts_expired_ones() {
    let state = common::healthy_state(StartupPhase::Complete);
    state.mark_complete();
    let orchestrator = common::orchestrator(EnvironmentSettings::managed("staging", false), &state);

    let queue = ConnectionQueue::new();
    let live = ConnectionTicket::new();
    let stale = ConnectionTicket::new();
    queue.enqueue(&live, "live", Duration::from_secs(30));
    queue.enqueue(&stale, "stale", Duration::from_secs(1));

    let waiter = {
        let live = live.clone();
        tokio::spawn(async move { live.settled().await })
    };

    sleep(Duration::from_secs(2)).await;
    let outcome = queue
        .drain_on_startup_complete(&orchestrator, Duration::from_secs(10))
        .await
        .unwrap();

    assert!(outcome.ready);
    assert_eq!(outcome.released, vec!["live".to_string()]);
    assert_eq!(outcome.expired, 1);
    assert_eq!(outcome.remaining, 0);
    assert_eq!(stale.state(), TicketState::Expired);
    assert_eq!(waiter.await.unwrap(), TicketState::Released);
    assert!(queue.status().startup_complete);
}

#[tokio::test(start_paused = true)]
async fn failed_drain_keeps_entries_queued() {
    let state = common::healthy_state(StartupPhase::Complete);
    state.set_service(STORAGE_CHECK, false);
    let orchestrator = common::orchestrator(EnvironmentSettings::managed("staging", false), &state);

    let queue = ConnectionQueue::new();
    let ticket = ConnectionTicket::new();
    queue.enqueue(&ticket, "conn-1", LONG);

    let outcome = queue
        .drain_on_startup_complete(&orchestrator, Duration::from_secs(5))
        .await
        .unwrap();

    assert!(!outcome.ready);
    assert!(outcome.released.is_empty());
    assert_eq!(outcome.remaining, 1);
    assert!(ticket.is_pending());
    assert!(!queue.status().startup_complete);
}

#[tokio::test(start_paused = true)]
async fn background_drain_waits_for_startup_complete() {
    let state = common::healthy_state(StartupPhase::Services);
    let orchestrator = common::orchestrator(EnvironmentSettings::managed("staging", false), &state);
    let queue = ConnectionQueue::new();
    let ticket = ConnectionTicket::new();
    queue.enqueue(&ticket, "conn-1", LONG);

    let shutdown = CancellationToken::new();
    let handle = queue.spawn_drain_on_startup(
        orchestrator,
        common::provider(&state),
        Duration::from_millis(100),
        Duration::from_secs(10),
        shutdown.clone(),
    );

    sleep(Duration::from_millis(500)).await;
    assert!(ticket.is_pending());
    state.mark_complete();

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.released, vec!["conn-1".to_string()]);
    assert_eq!(ticket.state(), TicketState::Released);
}

#[tokio::test(start_paused = true)]
async fn background_drain_stops_on_shutdown() {
    let state = common::healthy_state(StartupPhase::Dependencies);
    let orchestrator = common::orchestrator(EnvironmentSettings::managed("staging", false), &state);
    let queue = ConnectionQueue::new();

    let shutdown = CancellationToken::new();
    let handle = queue.spawn_drain_on_startup(
        orchestrator,
        common::provider(&state),
        Duration::from_millis(100),
        Duration::from_secs(10),
        shutdown.clone(),
    );

    sleep(Duration::from_millis(250)).await;
    shutdown.cancel();
    assert_eq!(handle.await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn expiry_sweeper_settles_tickets_in_the_background() {
    let queue = ConnectionQueue::new();
    let ticket = ConnectionTicket::new();
    queue.enqueue(&ticket, "conn-1", Duration::from_secs(1));

    let shutdown = CancellationToken::new();
    let sweeper = queue.spawn_expiry_sweeper(Duration::from_millis(200), shutdown.clone());

    assert_eq!(ticket.settled().await, TicketState::Expired);
    shutdown.cancel();
    sweeper.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn late_enqueue_after_drain_is_released_immediately() {
    let state = common::healthy_state(StartupPhase::Complete);
    state.mark_complete();
    let orchestrator = common::orchestrator(EnvironmentSettings::managed("staging", false), &state);
    let queue = ConnectionQueue::new();

    let handle = queue.spawn_drain_on_startup(
        orchestrator,
        common::provider(&state),
        Duration::from_millis(100),
        Duration::from_secs(10),
        CancellationToken::new(),
    );
    let outcome = handle.await.unwrap().unwrap();
    assert!(outcome.ready);

    let late = ConnectionTicket::new();
    assert!(queue.enqueue(&late, "late", Duration::from_secs(5)));
    assert_eq!(late.settled().await, TicketState::Released);

    let status = queue.status();
    assert_eq!(status.queue_size, 0);
    assert!(status.startup_complete);

    let closed = ConnectionTicket::new();
    closed.close();
    assert!(!queue.enqueue(&closed, "closed", Duration::from_secs(5)));
}

#[tokio::test(start_paused = true)]
async fn close_purges_expired_entries_first() {
    let queue = ConnectionQueue::new();
    let stale = ConnectionTicket::new();
    let live = ConnectionTicket::new();
    queue.enqueue(&stale, "stale", Duration::from_secs(1));
    queue.enqueue(&live, "live", LONG);

    sleep(Duration::from_secs(2)).await;
    assert!(queue.close("live"));
    assert_eq!(stale.state(), TicketState::Expired);
    assert!(!queue.close("stale"));
    assert!(queue.is_empty());
}
