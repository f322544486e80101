use std::time::Duration;
use tokio::time::Instant;

/// Fixed-delay retry schedule bounded by an outer deadline.
///
/// Probes retry at a constant interval rather than backing off so that wait durations stay
/// predictable under a paused test clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetrySchedule {
    max_attempts: u32,
    delay: Duration,
    deadline: Instant,
}

impl RetrySchedule {
    pub fn new(retry_count: u32, delay: Duration, deadline: Instant) -> Self {
        Self {
            max_attempts: retry_count.saturating_add(1),
            delay,
            deadline,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    /// Delay before the next attempt, or `None` once attempts are spent or the delay would not
    /// leave room for another attempt before the deadline.
    pub fn next_delay(&self, attempts: u32, now: Instant) -> Option<Duration> {
        if attempts >= self.max_attempts {
            return None;
        }

        let remaining = self.remaining(now);
        if remaining.is_zero() || remaining <= self.delay {
            return None;
        }

        Some(self.delay)
    }
}

/// Converts a wait into the whole-second `Retry-After` hint handed to clients.
pub fn retry_after_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() == 0 {
        secs.max(1)
    } else {
        secs.saturating_add(1).max(1)
    }
}
