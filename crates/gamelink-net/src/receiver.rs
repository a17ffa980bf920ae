//! Receiver worker: blocking reads, frame extraction, inbound hand-off.

use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::framing::{FrameConfig, FrameDecoder};
use crate::queues::InboundQueue;
use crate::task_queue::{AttemptId, NetTask, TaskQueue};
use crate::worker::{Termination, WorkerThread};

/// Pause when the rolling buffer has no room for another read.
pub const RECEIVE_IDLE: Duration = Duration::from_millis(16);

/// Start the receiver for one connection.
///
/// `stream` is the receiver's own clone of the connection socket. The thread
/// exits on termination, end-of-stream, a read error (timeouts included) or a
/// framing violation; the last three are reported to `tasks`.
pub fn spawn_receiver(
    stream: TcpStream,
    attempt: AttemptId,
    frame: FrameConfig,
    inbound: Arc<InboundQueue>,
    tasks: Arc<TaskQueue<NetTask>>,
) -> io::Result<WorkerThread> {
    WorkerThread::run(format!("net-recv-{attempt}"), move |term| {
        tracing::debug!(attempt, "receiver thread begin");
        receive_loop(stream, attempt, frame, &inbound, &tasks, &term);
        tracing::debug!(attempt, "receiver thread end");
    })
}

fn receive_loop(
    mut stream: TcpStream,
    attempt: AttemptId,
    frame: FrameConfig,
    inbound: &InboundQueue,
    tasks: &TaskQueue<NetTask>,
    term: &Termination,
) {
    let mut decoder = FrameDecoder::new(frame);

    while !term.is_set() {
        let spare = decoder.spare_mut();
        if spare.is_empty() {
            term.idle(RECEIVE_IDLE);
            continue;
        }

        match stream.read(spare) {
            Ok(0) => {
                if !term.is_set() {
                    tracing::debug!(attempt, "receiver read length = 0");
                    tasks.add(NetTask::ReceiveFailed {
                        attempt,
                        error: None,
                    });
                }
                term.set();
                return;
            }
            Ok(n) => decoder.advance(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                if !term.is_set() {
                    tracing::debug!(attempt, %error, "receiver read failed");
                    tasks.add(NetTask::ReceiveFailed {
                        attempt,
                        error: Some(error),
                    });
                }
                term.set();
                return;
            }
        }

        let drained = decoder.drain_frames(|payload| {
            if !term.is_set() {
                inbound.push(payload);
            }
        });

        if let Err(error) = drained {
            tracing::warn!(attempt, %error, "corrupt stream, dropping connection");
            if !term.is_set() {
                tasks.add(NetTask::ProtocolViolation { attempt, error });
            }
            term.set();
            return;
        }
    }
}
