//! Seams to the application: packet delivery, reachability, dispatch locking.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Channel name every inbound payload is published on.
pub const NET_EVENT_CHANNEL: &str = "Net.Event";

/// Receives decoded inbound payloads on the owning thread.
pub trait PacketSink {
    /// Deliver one payload published on `channel`.
    fn publish(&mut self, channel: &str, payload: Vec<u8>);
}

impl<F> PacketSink for F
where
    F: FnMut(&str, Vec<u8>),
{
    fn publish(&mut self, channel: &str, payload: Vec<u8>) {
        self(channel, payload);
    }
}

impl PacketSink for crossbeam_channel::Sender<Vec<u8>> {
    fn publish(&mut self, channel: &str, payload: Vec<u8>) {
        if self.send(payload).is_err() {
            tracing::debug!(channel, "packet subscriber dropped, discarding payload");
        }
    }
}

/// Reports whether the device currently has a usable network.
pub trait Reachability {
    /// `false` suspends automatic reconnects.
    fn is_reachable(&self) -> bool;
}

impl<F> Reachability for F
where
    F: Fn() -> bool,
{
    fn is_reachable(&self) -> bool {
        self()
    }
}

/// [`Reachability`] for platforms without a reachability check.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

impl Reachability for AlwaysReachable {
    fn is_reachable(&self) -> bool {
        true
    }
}

/// Countdown that holds back inbound delivery without dropping payloads.
///
/// Clones share the same countdown, so a packet handler can keep one and lock
/// dispatch (say, for a scene transition) from inside its own callback.
#[derive(Debug, Clone, Default)]
pub struct DispatchLock {
    remaining: Arc<Mutex<Duration>>,
}

impl DispatchLock {
    /// Create an unlocked countdown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the lock by `duration`. Locks accumulate.
    pub fn lock(&self, duration: Duration) {
        let mut remaining = self.remaining.lock();
        *remaining += duration;
        tracing::debug!(lock = ?*remaining, "lock event");
    }

    /// Release the lock immediately.
    pub fn unlock(&self) {
        let mut remaining = self.remaining.lock();
        tracing::debug!(lock = ?*remaining, "unlock event");
        *remaining = Duration::ZERO;
    }

    /// Whether delivery is currently held back.
    pub fn is_locked(&self) -> bool {
        !self.remaining.lock().is_zero()
    }

    /// Time left before delivery resumes.
    pub fn remaining(&self) -> Duration {
        *self.remaining.lock()
    }

    /// Count down by one tick.
    pub fn tick(&self, dt: Duration) {
        let mut remaining = self.remaining.lock();
        if !remaining.is_zero() {
            *remaining = remaining.saturating_sub(dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_sink_receives_channel_and_payload() {
        let mut seen = Vec::new();
        {
            let mut sink = |channel: &str, payload: Vec<u8>| seen.push((channel.to_string(), payload));
            sink.publish(NET_EVENT_CHANNEL, vec![1, 2]);
        }
        assert_eq!(seen, vec![("Net.Event".to_string(), vec![1, 2])]);
    }

    #[test]
    fn test_channel_sink_tolerates_dropped_receiver() {
        let (mut tx, rx) = crossbeam_channel::unbounded::<Vec<u8>>();
        tx.publish(NET_EVENT_CHANNEL, vec![9]);
        assert_eq!(rx.try_recv(), Ok(vec![9]));
        drop(rx);
        tx.publish(NET_EVENT_CHANNEL, vec![10]);
    }

    #[test]
    fn test_lock_accumulates_and_counts_down() {
        let lock = DispatchLock::new();
        assert!(!lock.is_locked());

        lock.lock(Duration::from_millis(300));
        lock.lock(Duration::from_millis(200));
        assert_eq!(lock.remaining(), Duration::from_millis(500));

        lock.tick(Duration::from_millis(400));
        assert!(lock.is_locked());
        lock.tick(Duration::from_millis(400));
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_clones_share_the_countdown() {
        let lock = DispatchLock::new();
        let handle = lock.clone();
        handle.lock(Duration::from_secs(1));
        assert!(lock.is_locked());
        lock.unlock();
        assert!(!handle.is_locked());
    }

    #[test]
    fn test_reachability_impls() {
        assert!(AlwaysReachable.is_reachable());
        let offline = || false;
        assert!(!offline.is_reachable());
    }
}
