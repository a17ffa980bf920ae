//! Tick-driven one-shot timers.
//!
//! Timers never fire on their own thread. The owner calls
//! [`Timeouts::advance`] from its tick with the elapsed frame time and handles
//! whatever came due, which keeps every state change on the owning thread.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Opaque handle used to cancel a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutId(u64);

/// Scheduler of delayed events, advanced by the owner's tick.
pub trait Timeouts<E> {
    /// Schedule `event` to come due after `after` of ticked time.
    fn create_timeout(&mut self, after: Duration, event: E) -> TimeoutId;

    /// Cancel a pending timer. Returns `false` if it already fired or was cleared.
    fn clear_timeout(&mut self, id: TimeoutId) -> bool;

    /// Advance the clock by `dt` and return the events that came due, earliest first.
    fn advance(&mut self, dt: Duration) -> Vec<E>;
}

/// Default [`Timeouts`] implementation keyed on a virtual clock.
pub struct TimeoutRegistry<E> {
    now: Duration,
    next_id: u64,
    by_deadline: BTreeMap<(Duration, TimeoutId), E>,
    deadlines: HashMap<TimeoutId, Duration>,
}

impl<E> Default for TimeoutRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TimeoutRegistry<E> {
    /// Create an empty registry with its clock at zero.
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 1,
            by_deadline: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Cancel a timer and hand back its event so the caller can run it now.
    pub fn clear_timeout_and_fire(&mut self, id: TimeoutId) -> Option<E> {
        let deadline = self.deadlines.remove(&id)?;
        self.by_deadline.remove(&(deadline, id))
    }

    /// Cancel every pending timer.
    pub fn clear_all(&mut self) {
        self.by_deadline.clear();
        self.deadlines.clear();
    }

    /// Number of pending timers.
    pub fn pending(&self) -> usize {
        self.deadlines.len()
    }

    /// Time left before `id` fires, if it is still pending.
    pub fn remaining(&self, id: TimeoutId) -> Option<Duration> {
        self.deadlines
            .get(&id)
            .map(|deadline| deadline.saturating_sub(self.now))
    }
}

impl<E> Timeouts<E> for TimeoutRegistry<E> {
    fn create_timeout(&mut self, after: Duration, event: E) -> TimeoutId {
        let id = TimeoutId(self.next_id);
        self.next_id += 1;

        let deadline = self.now + after;
        self.by_deadline.insert((deadline, id), event);
        self.deadlines.insert(id, deadline);
        id
    }

    fn clear_timeout(&mut self, id: TimeoutId) -> bool {
        self.clear_timeout_and_fire(id).is_some()
    }

    fn advance(&mut self, dt: Duration) -> Vec<E> {
        self.now += dt;

        let mut due = Vec::new();
        while let Some(entry) = self.by_deadline.first_entry() {
            let (deadline, id) = *entry.key();
            if deadline > self.now {
                break;
            }
            due.push(entry.remove());
            self.deadlines.remove(&id);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_timer_fires_once_after_delay() {
        let mut timers = TimeoutRegistry::new();
        timers.create_timeout(ms(300), "retry");

        assert!(timers.advance(ms(200)).is_empty());
        assert_eq!(timers.advance(ms(100)), vec!["retry"]);
        assert!(timers.advance(ms(1000)).is_empty());
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn test_due_events_come_back_in_deadline_order() {
        let mut timers = TimeoutRegistry::new();
        timers.create_timeout(ms(50), 2);
        timers.create_timeout(ms(10), 1);
        timers.create_timeout(ms(50), 3);

        assert_eq!(timers.advance(ms(100)), vec![1, 2, 3]);
    }

    #[test]
    fn test_cleared_timer_never_fires() {
        let mut timers = TimeoutRegistry::new();
        let id = timers.create_timeout(ms(10), "connect timeout");
        assert!(timers.clear_timeout(id));
        assert!(!timers.clear_timeout(id), "second clear is a no-op");
        assert!(timers.advance(ms(100)).is_empty());
    }

    #[test]
    fn test_clear_and_fire_returns_event() {
        let mut timers = TimeoutRegistry::new();
        let id = timers.create_timeout(ms(10), 42);
        assert_eq!(timers.clear_timeout_and_fire(id), Some(42));
        assert_eq!(timers.clear_timeout_and_fire(id), None);
    }

    #[test]
    fn test_clear_all_and_remaining() {
        let mut timers = TimeoutRegistry::new();
        let id = timers.create_timeout(ms(100), ());
        timers.advance(ms(40));
        assert_eq!(timers.remaining(id), Some(ms(60)));

        timers.clear_all();
        assert_eq!(timers.remaining(id), None);
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn test_timer_created_later_uses_current_clock() {
        let mut timers = TimeoutRegistry::new();
        timers.advance(ms(500));
        timers.create_timeout(ms(100), "late");
        assert!(timers.advance(ms(99)).is_empty());
        assert_eq!(timers.advance(ms(1)), vec!["late"]);
    }
}
