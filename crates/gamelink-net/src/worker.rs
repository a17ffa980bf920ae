//! One-shot background threads with cooperative cancellation.
//!
//! Every I/O worker (connector, receiver, sender) runs on its own OS thread and
//! polls a shared [`Termination`] flag at each loop boundary. Idle waits use
//! [`Termination::idle`], which parks the thread so [`WorkerThread::interrupt`]
//! can wake it early. Threads blocked in socket I/O are released by closing the
//! socket, not by the flag.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

/// Shared "please stop" flag between a worker and its owner.
#[derive(Debug, Clone, Default)]
pub struct Termination(Arc<AtomicBool>);

impl Termination {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination. Setting an already-set flag is a no-op.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether termination has been requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleep for up to `duration`, returning early on [`WorkerThread::interrupt`].
    pub fn idle(&self, duration: Duration) {
        if !self.is_set() {
            thread::park_timeout(duration);
        }
    }
}

/// Handle to a running worker thread.
pub struct WorkerThread {
    name: String,
    termination: Termination,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
    /// Spawn `body` on a named thread. The thread runs exactly once.
    pub fn run<F>(name: impl Into<String>, body: F) -> io::Result<Self>
    where
        F: FnOnce(Termination) + Send + 'static,
    {
        let name = name.into();
        let termination = Termination::new();
        let worker_flag = termination.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(worker_flag))?;

        Ok(Self {
            name,
            termination,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Thread name, as given at spawn.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the worker to stop at its next loop boundary.
    pub fn set_terminated(&self) {
        self.termination.set();
    }

    /// Whether termination was requested, by the owner or by the worker itself.
    pub fn is_terminated(&self) -> bool {
        self.termination.is_set()
    }

    /// Wake the worker if it is parked in [`Termination::idle`].
    pub fn interrupt(&self) {
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.thread().unpark();
        }
    }

    /// Whether the thread body has returned.
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    /// Block until the thread exits. Joining twice is a no-op.
    pub fn wait_termination(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::error!(worker = %self.name, "worker thread panicked");
        }
    }

    /// Set the flag and wake the thread without waiting for it.
    pub fn stop(&self) {
        self.set_terminated();
        self.interrupt();
    }
}

impl std::fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThread")
            .field("name", &self.name)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn test_worker_exits_after_terminate() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);
        let worker = WorkerThread::run("test-loop", move |term| {
            while !term.is_set() {
                counter.fetch_add(1, Ordering::Relaxed);
                term.idle(Duration::from_millis(5));
            }
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(30));
        worker.set_terminated();
        worker.wait_termination();

        assert!(worker.is_finished());
        assert!(iterations.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_terminate_and_join_are_idempotent() {
        let worker = WorkerThread::run("test-once", |_| {}).unwrap();
        worker.set_terminated();
        worker.set_terminated();
        worker.wait_termination();
        worker.wait_termination();
        assert!(worker.is_terminated());
        assert!(worker.is_finished());
    }

    #[test]
    fn test_interrupt_cuts_idle_short() {
        let worker = WorkerThread::run("test-idle", |term| {
            while !term.is_set() {
                term.idle(Duration::from_secs(30));
            }
        })
        .unwrap();

        let start = Instant::now();
        worker.stop();
        worker.wait_termination();
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "interrupt should wake a parked worker"
        );
    }

    #[test]
    fn test_worker_can_terminate_itself() {
        let worker = WorkerThread::run("test-self", |term| term.set()).unwrap();
        worker.wait_termination();
        assert!(worker.is_terminated());
        assert_eq!(worker.name(), "test-self");
    }
}
