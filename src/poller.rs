use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep};

/// Fixed-delay status poll timer
///
/// The timer is an owned value: arming replaces (and thereby releases) any
/// timer already held, and disarming drops it. There is never more than one.
/// The next tick is armed by the caller only after the current tick's work
/// completes, so slow responses stretch the interval instead of piling up.
pub struct StatusPoller {
    interval: Duration,
    state: PollerState,
}

enum PollerState {
    Idle,
    Polling(Pin<Box<Sleep>>),
}

impl StatusPoller {
    /// Create an idle poller
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: PollerState::Idle,
        }
    }

    /// Delay between ticks
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if a tick is pending
    pub fn is_armed(&self) -> bool {
        matches!(self.state, PollerState::Polling(_))
    }

    /// Deadline of the pending tick, if armed
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            PollerState::Polling(sleep) => Some(sleep.deadline()),
            PollerState::Idle => None,
        }
    }

    /// Schedule the next tick one interval from now
    pub fn arm(&mut self) {
        self.disarm();
        self.state = PollerState::Polling(Box::pin(tokio::time::sleep(self.interval)));
        tracing::trace!("Status poll armed ({:?})", self.interval);
    }

    /// Cancel the pending tick, if any
    pub fn disarm(&mut self) {
        if let PollerState::Polling(_) = std::mem::replace(&mut self.state, PollerState::Idle) {
            tracing::trace!("Status poll disarmed");
        }
    }

    /// Wait for the pending tick
    ///
    /// Never resolves while idle. Once it resolves the poller is idle again
    /// until re-armed. Safe to use in `tokio::select!`: dropping the future
    /// before it resolves leaves the timer armed.
    pub fn tick(&mut self) -> impl Future<Output = ()> + '_ {
        async move {
            match &mut self.state {
                PollerState::Polling(sleep) => sleep.as_mut().await,
                PollerState::Idle => std::future::pending::<()>().await,
            }
            self.state = PollerState::Idle;
        }
    }
}
