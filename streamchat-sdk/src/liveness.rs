//! Keep-alive bookkeeping for one session.
//!
//! The monitor never performs I/O. The session polls it from the same
//! `select!` loop that reads the socket and acts on the returned
//! [`LivenessAction`].

use std::time::Duration;

use tokio::time::Instant;

/// Token carried by our own keep-alive PINGs.
pub const PROBE_TOKEN: &str = "keepalive";

/// `at + after`, saturating instead of overflowing the clock.
pub fn deadline_after(at: Instant, after: Duration) -> Instant {
    at.checked_add(after)
        .or_else(|| at.checked_add(FAR_FUTURE))
        .unwrap_or(at)
}

// Roughly thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessAction {
    /// Nothing to do until [`LivenessMonitor::next_wakeup`].
    Idle,
    /// The line has been quiet for a full interval: send a probe.
    Probe,
    /// A probe went unanswered past the deadline. Carries the silence length.
    TimedOut(Duration),
}

#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    interval: Duration,
    deadline: Duration,
    last_activity: Instant,
    probe_sent_at: Option<Instant>,
}

impl LivenessMonitor {
    pub fn new(interval: Duration, deadline: Duration, now: Instant) -> Self {
        Self {
            interval,
            deadline,
            last_activity: now,
            probe_sent_at: None,
        }
    }

    /// Any inbound line counts, and it settles an outstanding probe.
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.probe_sent_at = None;
    }

    pub fn probe_sent(&mut self, now: Instant) {
        self.probe_sent_at = Some(now);
    }

    pub fn outstanding_probe(&self) -> bool {
        self.probe_sent_at.is_some()
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// When the session should next call [`poll`](Self::poll).
    pub fn next_wakeup(&self) -> Instant {
        match self.probe_sent_at {
            Some(sent) => deadline_after(sent, self.deadline),
            None => deadline_after(self.last_activity, self.interval),
        }
    }

    pub fn poll(&self, now: Instant) -> LivenessAction {
        match self.probe_sent_at {
            Some(sent) if now >= deadline_after(sent, self.deadline) => {
                LivenessAction::TimedOut(now.saturating_duration_since(self.last_activity))
            }
            Some(_) => LivenessAction::Idle,
            None if now >= deadline_after(self.last_activity, self.interval) => {
                LivenessAction::Probe
            }
            None => LivenessAction::Idle,
        }
    }
}
