//! Sender worker: drains the outbound queue onto the socket.

use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::framing::{FrameConfig, encode_frame};
use crate::queues::OutboundQueue;
use crate::task_queue::{AttemptId, NetTask, TaskQueue};
use crate::worker::{Termination, WorkerThread};

/// Pause when there is nothing to send, and between retries of a failed write.
pub const SEND_IDLE: Duration = Duration::from_millis(15);

/// Sender settings for one connection.
#[derive(Debug, Clone, Copy)]
pub struct SenderOptions {
    /// Frame limits used to encode payloads.
    pub frame: FrameConfig,
    /// Report the first write error and stop instead of retrying.
    pub disconnect_on_error: bool,
}

/// Start the sender for one connection.
///
/// The head of `outbound` is only removed after it was written and flushed, so
/// payloads go out in queue order. A frame interrupted by a write error is
/// resumed from its first unwritten byte.
pub fn spawn_sender(
    stream: TcpStream,
    attempt: AttemptId,
    options: SenderOptions,
    outbound: Arc<OutboundQueue>,
    tasks: Arc<TaskQueue<NetTask>>,
) -> io::Result<WorkerThread> {
    WorkerThread::run(format!("net-send-{attempt}"), move |term| {
        tracing::debug!(attempt, "sender thread begin");
        send_loop(stream, attempt, options, &outbound, &tasks, &term);
        tracing::debug!(attempt, "sender thread end");
    })
}

/// Encoded head of the queue and how much of it is already on the wire.
struct InFlight {
    payload: Arc<[u8]>,
    frame: Vec<u8>,
    written: usize,
}

fn send_loop(
    mut stream: TcpStream,
    attempt: AttemptId,
    options: SenderOptions,
    outbound: &OutboundQueue,
    tasks: &TaskQueue<NetTask>,
    term: &Termination,
) {
    let mut in_flight: Option<InFlight> = None;

    while !term.is_set() {
        if in_flight.is_none() {
            let Some(payload) = outbound.peek() else {
                term.idle(SEND_IDLE);
                continue;
            };
            match encode_frame(&payload, &options.frame) {
                Ok(frame) => {
                    in_flight = Some(InFlight {
                        payload,
                        frame,
                        written: 0,
                    });
                }
                Err(error) => {
                    tracing::error!(attempt, %error, "dropping unencodable payload");
                    outbound.pop_sent(&payload);
                    continue;
                }
            }
        }
        let Some(current) = in_flight.as_mut() else {
            continue;
        };

        // Resume where a timed-out write stopped; restarting would repeat bytes.
        let result = match stream.write(&current.frame[current.written..]) {
            Ok(0) => Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                current.written += n;
                if current.written < current.frame.len() {
                    continue;
                }
                stream.flush()
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                if let Some(done) = in_flight.take() {
                    outbound.pop_sent(&done.payload);
                }
            }
            Err(error) => {
                if term.is_set() {
                    return;
                }
                tracing::warn!(
                    attempt,
                    %error,
                    written = current.written,
                    len = current.frame.len(),
                    "sender write failed"
                );
                if options.disconnect_on_error {
                    tasks.add(NetTask::SendFailed { attempt, error });
                    term.set();
                    return;
                }
                term.idle(SEND_IDLE);
            }
        }
    }
}
