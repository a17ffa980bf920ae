//! Packet queues shared between the owning thread and the I/O workers.
//!
//! Both queues keep FIFO order and hold their lock only for a push or pop,
//! never across socket I/O.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// What counts as a reply to a heartbeat ping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HeartbeatAck {
    /// Any inbound frame proves the link is alive.
    #[default]
    AnyTraffic,
    /// Only a frame whose payload equals these bytes counts.
    Payload(Vec<u8>),
}

impl HeartbeatAck {
    fn accepts(&self, payload: &[u8]) -> bool {
        match self {
            Self::AnyTraffic => true,
            Self::Payload(expected) => expected.as_slice() == payload,
        }
    }
}

/// Payloads waiting to be written, in [`send_packet`](crate::NetClient::send_packet) order.
///
/// Payloads are stored as `Arc<[u8]>` so the sender can peek the head without
/// copying it under the lock.
#[derive(Default)]
pub struct OutboundQueue {
    packets: Mutex<VecDeque<Arc<[u8]>>>,
}

impl OutboundQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload.
    pub fn push(&self, payload: impl Into<Arc<[u8]>>) {
        self.packets.lock().push_back(payload.into());
    }

    /// Clone a handle to the head without removing it.
    pub fn peek(&self) -> Option<Arc<[u8]>> {
        self.packets.lock().front().cloned()
    }

    /// Remove the head if it is still `sent`.
    ///
    /// Returns `false` when the queue was cleared while the write was in flight.
    pub fn pop_sent(&self, sent: &Arc<[u8]>) -> bool {
        let mut packets = self.packets.lock();
        match packets.front() {
            Some(head) if Arc::ptr_eq(head, sent) => {
                packets.pop_front();
                true
            }
            _ => false,
        }
    }

    /// Drop every queued payload.
    pub fn clear(&self) {
        self.packets.lock().clear();
    }

    /// Number of queued payloads.
    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.packets.lock().is_empty()
    }
}

/// Decoded payloads waiting for dispatch, in arrival order.
///
/// Also counts liveness proofs so the owner can tell whether a heartbeat was
/// answered even while dispatch is locked.
pub struct InboundQueue {
    packets: Mutex<VecDeque<Vec<u8>>>,
    liveness: AtomicU64,
    ack: HeartbeatAck,
}

impl InboundQueue {
    /// Create an empty queue using `ack` to recognise heartbeat replies.
    pub fn new(ack: HeartbeatAck) -> Self {
        Self {
            packets: Mutex::new(VecDeque::new()),
            liveness: AtomicU64::new(0),
            ack,
        }
    }

    /// Append a payload decoded by the receiver.
    pub fn push(&self, payload: Vec<u8>) {
        if self.ack.accepts(&payload) {
            self.liveness.fetch_add(1, Ordering::Release);
        }
        self.packets.lock().push_back(payload);
    }

    /// Remove the oldest payload.
    pub fn pop(&self) -> Option<Vec<u8>> {
        self.packets.lock().pop_front()
    }

    /// Monotonic count of payloads that qualified as heartbeat replies.
    pub fn liveness(&self) -> u64 {
        self.liveness.load(Ordering::Acquire)
    }

    /// Drop every queued payload.
    pub fn clear(&self) {
        self.packets.lock().clear();
    }

    /// Number of queued payloads.
    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.packets.lock().is_empty()
    }
}
