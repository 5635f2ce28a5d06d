// ── Heartbeat monitor ──
//
// Per-connection staleness watchdog. Lives inside the connection driver's
// select loop, so it is created on open and dropped with the session.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

pub(crate) struct Heartbeat {
    ticker: Interval,
    timeout: Duration,
    last_message_at: Instant,
}

impl Heartbeat {
    /// Start watching a freshly opened connection. The first check runs one
    /// `interval` from now.
    pub(crate) fn start(interval: Duration, timeout: Duration) -> Self {
        let now = Instant::now();
        let mut ticker = tokio::time::interval_at(now + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            ticker,
            timeout,
            last_message_at: now,
        }
    }

    pub(crate) fn record_message(&mut self) {
        self.last_message_at = Instant::now();
    }

    /// Time since the last frame as of `now`, if it exceeds the timeout.
    pub(crate) fn stale_at(&self, now: Instant) -> Option<Duration> {
        let silent = now.saturating_duration_since(self.last_message_at);
        (silent > self.timeout).then_some(silent)
    }

    /// Wait for the next tick and report staleness.
    ///
    /// Cancel-safe: dropping the future before it completes loses nothing.
    pub(crate) async fn tick(&mut self) -> Option<Duration> {
        self.ticker.tick().await;
        self.stale_at(Instant::now())
    }
}
