//! Heartbeat bookkeeping for an established connection.
//!
//! Every `interval` of connected time a ping goes out and a response timer is
//! armed. Liveness traffic seen after the ping clears the wait; if the timer
//! fires first the connection is considered dead.

use std::time::Duration;

use crate::timeouts::TimeoutId;

/// Heartbeat timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Connected time between pings. Default: 8 s.
    pub interval: Duration,
    /// How long to wait for liveness after a ping. Default: 4 s.
    pub response_timeout: Duration,
    /// Ping payload. Default: a single zero byte.
    pub ping: Vec<u8>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(8),
            response_timeout: Duration::from_secs(4),
            ping: vec![0x00],
        }
    }
}

/// Per-connection heartbeat state.
#[derive(Debug, Default)]
pub struct Heartbeat {
    elapsed: Duration,
    awaiting_response: bool,
    liveness_at_ping: u64,
    response_timer: Option<TimeoutId>,
}

impl Heartbeat {
    /// Fresh state: no ping outstanding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate tick time. Returns `true` when a ping is due.
    pub fn tick(&mut self, dt: Duration, interval: Duration, connected: bool) -> bool {
        self.elapsed += dt;
        connected && self.elapsed > interval
    }

    /// Record that a ping went out, with the liveness count at that moment.
    ///
    /// Returns the previous response timer, if any, so the caller can cancel it.
    pub fn ping_sent(&mut self, liveness: u64, timer: TimeoutId) -> Option<TimeoutId> {
        self.elapsed = Duration::ZERO;
        self.awaiting_response = true;
        self.liveness_at_ping = liveness;
        self.response_timer.replace(timer)
    }

    /// Clear the wait if liveness advanced since the ping.
    ///
    /// Returns the response timer to cancel when the ping was answered.
    pub fn observe(&mut self, liveness: u64) -> Option<TimeoutId> {
        if self.awaiting_response && liveness != self.liveness_at_ping {
            self.awaiting_response = false;
            return self.response_timer.take();
        }
        None
    }

    /// Whether a ping is still unanswered.
    pub fn awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    /// Time since the last ping (or reset).
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Forget everything. Returns the response timer to cancel.
    pub fn reset(&mut self) -> Option<TimeoutId> {
        self.elapsed = Duration::ZERO;
        self.awaiting_response = false;
        self.response_timer.take()
    }

    /// Called when the response timer fired; forgets its id.
    pub fn response_timer_fired(&mut self) {
        self.response_timer = None;
    }
}
