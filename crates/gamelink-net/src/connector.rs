//! Connector worker: one blocking connect attempt per thread.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::platform::{ConnectCancel, SocketConfig, connect_host};
use crate::task_queue::{AttemptId, NetTask, TaskQueue};
use crate::worker::WorkerThread;

/// Everything the connector needs to dial the server.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// Attempt id stamped on the report.
    pub attempt: AttemptId,
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Total connect budget shared by every resolved address.
    pub timeout: Duration,
    /// Options applied to the new socket.
    pub socket: SocketConfig,
}

/// A running connect attempt.
///
/// Stopping it also shuts down the socket being connected, so the thread
/// leaves a blocked connect right away instead of waiting for the timeout.
#[derive(Debug)]
pub struct Connector {
    worker: WorkerThread,
    cancel: ConnectCancel,
}

impl Connector {
    /// Cancel the attempt and hand back the thread for joining.
    pub fn stop(self) -> WorkerThread {
        self.cancel.cancel();
        self.worker.stop();
        self.worker
    }

    /// Give up ownership once the attempt reported on its own.
    pub fn into_worker(self) -> WorkerThread {
        self.worker
    }

    /// Whether the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }
}

/// Start a connector thread for `request`.
///
/// The outcome is posted to `tasks` as [`NetTask::Connected`] or
/// [`NetTask::ConnectFailed`]. If the owner stopped the connector before the
/// connect finished, nothing is posted and any stream is dropped.
pub fn spawn_connector(
    request: ConnectRequest,
    tasks: Arc<TaskQueue<NetTask>>,
) -> io::Result<Connector> {
    let cancel = ConnectCancel::new();
    let thread_cancel = cancel.clone();

    let worker = WorkerThread::run(format!("net-connect-{}", request.attempt), move |term| {
        tracing::debug!(
            attempt = request.attempt,
            host = %request.host,
            port = request.port,
            "connect thread begin"
        );

        let result = connect_host(
            &request.host,
            request.port,
            request.timeout,
            &request.socket,
            &thread_cancel,
        );

        if term.is_set() || thread_cancel.is_cancelled() {
            tracing::debug!(attempt = request.attempt, "connect finished after cancellation");
            return;
        }

        match result {
            Ok(stream) => tasks.add(NetTask::Connected {
                attempt: request.attempt,
                stream,
            }),
            Err(error) => {
                tracing::debug!(attempt = request.attempt, %error, "connect failed");
                tasks.add(NetTask::ConnectFailed {
                    attempt: request.attempt,
                    error,
                });
            }
        }

        term.set();
        tracing::debug!(attempt = request.attempt, "connect thread end");
    })?;

    Ok(Connector { worker, cancel })
}
