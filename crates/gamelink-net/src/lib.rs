//! Persistent TCP link to a game server: length-prefixed framing, connect,
//! receive and send worker threads, and a tick-driven client that reconnects
//! and keeps the connection alive with heartbeats.

pub mod client;
pub mod connector;
pub mod dispatch;
pub mod framing;
pub mod heartbeat;
pub mod platform;
pub mod queues;
pub mod receiver;
pub mod sender;
pub mod state;
pub mod task_queue;
pub mod timeouts;
pub mod worker;

#[cfg(test)]
mod test_util;

pub use client::{ClientConfig, NetClient, NetTimer};
pub use dispatch::{AlwaysReachable, DispatchLock, NET_EVENT_CHANNEL, PacketSink, Reachability};
pub use framing::{FrameConfig, FrameDecoder, FrameError, encode_frame, try_decode_one};
pub use heartbeat::HeartbeatConfig;
pub use platform::{ConnectCancel, SocketConfig};
pub use queues::{HeartbeatAck, InboundQueue, OutboundQueue};
pub use state::{ConnectionState, ConnectionStateWatch, NetEvent};
pub use task_queue::{AttemptId, NetTask, TaskQueue};
pub use timeouts::{TimeoutId, TimeoutRegistry, Timeouts};
pub use worker::{Termination, WorkerThread};
