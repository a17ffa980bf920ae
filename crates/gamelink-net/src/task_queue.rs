//! Hand-off queue from worker threads to the thread that owns the connection.
//!
//! Workers never touch connection state. They [`add`](TaskQueue::add) a
//! [`NetTask`] describing what happened, and the owner applies it during its
//! next tick via [`update`](TaskQueue::update).

use std::io;
use std::net::TcpStream;

use parking_lot::Mutex;

use crate::framing::FrameError;

/// Identifies one connect attempt. Reports carrying an older attempt are stale.
pub type AttemptId = u64;

/// Outcome reported by a worker thread.
#[derive(Debug)]
pub enum NetTask {
    /// The connector established a stream.
    Connected {
        /// Attempt that produced the stream.
        attempt: AttemptId,
        /// The connected stream; ownership moves to the owning thread.
        stream: TcpStream,
    },
    /// The connector gave up.
    ConnectFailed {
        /// Attempt that failed.
        attempt: AttemptId,
        /// Last error seen while connecting.
        error: io::Error,
    },
    /// The receiver hit end-of-stream or a read error.
    ReceiveFailed {
        /// Attempt whose stream failed.
        attempt: AttemptId,
        /// `None` when the peer closed the stream cleanly.
        error: Option<io::Error>,
    },
    /// The receiver read a length field outside the legal range.
    ProtocolViolation {
        /// Attempt whose stream is corrupt.
        attempt: AttemptId,
        /// The framing error.
        error: FrameError,
    },
    /// The sender failed to write and was configured to give up.
    SendFailed {
        /// Attempt whose stream failed.
        attempt: AttemptId,
        /// The write error.
        error: io::Error,
    },
}

impl NetTask {
    /// Attempt the report belongs to.
    pub fn attempt(&self) -> AttemptId {
        match self {
            Self::Connected { attempt, .. }
            | Self::ConnectFailed { attempt, .. }
            | Self::ReceiveFailed { attempt, .. }
            | Self::ProtocolViolation { attempt, .. }
            | Self::SendFailed { attempt, .. } => *attempt,
        }
    }
}

/// Multi-producer, single-consumer list of pending tasks.
pub struct TaskQueue<T> {
    pending: Mutex<Vec<T>>,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Append a task. Callable from any thread.
    pub fn add(&self, task: T) {
        self.pending.lock().push(task);
    }

    /// Swap out everything queued so far and run `apply` on each task in order.
    ///
    /// The lock is released before `apply` runs, so a task handler may call
    /// [`add`](Self::add); such tasks are picked up on the next update.
    pub fn update(&self, mut apply: impl FnMut(T)) -> usize {
        let current = std::mem::take(&mut *self.pending.lock());
        let count = current.len();
        for task in current {
            apply(task);
        }
        count
    }

    /// Drop all pending tasks.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Number of tasks waiting for the next update.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no tasks are waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
