//! Persistent TCP client driven by a per-frame tick.
//!
//! [`NetClient`] owns the socket and the connection state machine:
//!
//! ```text
//! Init ──connect()──▶ Connecting ──ok──▶ Connected
//!                       │   ▲                 │
//!         fail/timeout  ▼   │ retry timer     │ heartbeat timeout,
//!                  ConnectFailed              │ read/write/frame error
//!                       │ retries exhausted   ▼
//!                       └───────────────▶ DisConnected ──reconnect check──▶ Connecting
//! ```
//!
//! Worker threads never touch this state. They post [`NetTask`]s which the
//! owner applies inside [`NetClient::update`], together with due timers,
//! reconnect checks, inbound dispatch and heartbeats.

use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use gamelink_config::NetworkConfig;
use tokio::sync::watch;

use crate::connector::{ConnectRequest, Connector, spawn_connector};
use crate::dispatch::{AlwaysReachable, DispatchLock, NET_EVENT_CHANNEL, PacketSink, Reachability};
use crate::framing::FrameConfig;
use crate::heartbeat::{Heartbeat, HeartbeatConfig};
use crate::platform::SocketConfig;
use crate::queues::{HeartbeatAck, InboundQueue, OutboundQueue};
use crate::receiver::spawn_receiver;
use crate::sender::{SenderOptions, spawn_sender};
use crate::state::{ConnectionState, ConnectionStateWatch, EventBus, NetEvent};
use crate::task_queue::{AttemptId, NetTask, TaskQueue};
use crate::timeouts::{TimeoutId, TimeoutRegistry, Timeouts};
use crate::worker::WorkerThread;

/// Everything the client needs to know about the server and its timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Socket options for each connection.
    pub socket: SocketConfig,
    /// Give up on a connect attempt after this long. Default: 6 s.
    pub connect_timeout: Duration,
    /// Heartbeat timing and ping payload.
    pub heartbeat: HeartbeatConfig,
    /// What counts as a heartbeat reply.
    pub heartbeat_ack: HeartbeatAck,
    /// Connect attempts before giving up with [`NetEvent::RetryFail`]. Default: 3.
    pub max_retries: u32,
    /// Pause between a failed attempt and the next one. Default: 0.3 s.
    pub retry_backoff: Duration,
    /// Frame size limits.
    pub frame: FrameConfig,
    /// Drop the connection on the first write error instead of waiting for the
    /// heartbeat to notice. Default: false.
    pub disconnect_on_send_error: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            socket: SocketConfig::default(),
            connect_timeout: Duration::from_secs(6),
            heartbeat: HeartbeatConfig::default(),
            heartbeat_ack: HeartbeatAck::AnyTraffic,
            max_retries: 3,
            retry_backoff: Duration::from_millis(300),
            frame: FrameConfig::default(),
            disconnect_on_send_error: false,
        }
    }
}

impl From<&NetworkConfig> for ClientConfig {
    fn from(net: &NetworkConfig) -> Self {
        let defaults = Self::default();
        Self {
            host: net.host.clone(),
            port: net.port,
            socket: SocketConfig {
                tcp_nodelay: net.tcp_nodelay,
                recv_buffer_size: net.recv_buffer_size,
                send_buffer_size: net.send_buffer_size,
                recv_timeout: Duration::from_millis(net.recv_timeout_ms),
                send_timeout: Duration::from_millis(net.send_timeout_ms),
            },
            connect_timeout: secs(net.connect_timeout_secs, defaults.connect_timeout),
            heartbeat: HeartbeatConfig {
                interval: secs(net.heartbeat_interval_secs, defaults.heartbeat.interval),
                response_timeout: secs(
                    net.heartbeat_response_timeout_secs,
                    defaults.heartbeat.response_timeout,
                ),
                ping: defaults.heartbeat.ping,
            },
            heartbeat_ack: match &net.heartbeat_ack {
                Some(bytes) => HeartbeatAck::Payload(bytes.clone()),
                None => HeartbeatAck::AnyTraffic,
            },
            max_retries: net.max_retries,
            retry_backoff: secs(net.retry_backoff_secs, defaults.retry_backoff),
            frame: FrameConfig {
                max_frame_len: net.max_frame_len,
            },
            disconnect_on_send_error: net.disconnect_on_send_error,
        }
    }
}

fn secs(value: f32, fallback: Duration) -> Duration {
    Duration::try_from_secs_f32(value).unwrap_or(fallback)
}

/// Timers the client schedules on its [`Timeouts`] registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetTimer {
    /// The connect attempt took too long.
    ConnectTimeout {
        /// Attempt the timer guards.
        attempt: AttemptId,
    },
    /// Backoff elapsed; try connecting again.
    Retry,
    /// A heartbeat ping went unanswered.
    HeartbeatResponse {
        /// Connection the ping was sent on.
        attempt: AttemptId,
    },
}

/// An established connection: the socket plus its two I/O workers.
struct Link {
    stream: TcpStream,
    outbound: Arc<OutboundQueue>,
    sender: WorkerThread,
    receiver: WorkerThread,
}

/// Tick-driven TCP client with reconnect and heartbeat handling.
///
/// Construct once at start-up and call [`update`](Self::update) from one
/// thread at a steady cadence. No method blocks on the network or returns a
/// network error; outcomes surface as [`NetEvent`]s and state changes.
pub struct NetClient {
    config: ClientConfig,
    state: ConnectionStateWatch,
    events: EventBus,
    tasks: Arc<TaskQueue<NetTask>>,
    timeouts: Box<dyn Timeouts<NetTimer>>,
    sink: Box<dyn PacketSink>,
    reachability: Box<dyn Reachability>,
    inbound: Arc<InboundQueue>,
    dispatch_lock: DispatchLock,
    link: Option<Link>,
    connector: Option<Connector>,
    retired: Vec<WorkerThread>,
    attempt: AttemptId,
    retries_remaining: u32,
    heartbeat: Heartbeat,
    connect_timer: Option<TimeoutId>,
    retry_timer: Option<TimeoutId>,
    stopped: bool,
    not_reachable_reported: bool,
}

impl NetClient {
    /// Create an idle client delivering inbound payloads to `sink`.
    pub fn new(config: ClientConfig, sink: impl PacketSink + 'static) -> Self {
        let inbound = Arc::new(InboundQueue::new(config.heartbeat_ack.clone()));
        Self {
            retries_remaining: config.max_retries,
            config,
            state: ConnectionStateWatch::new(),
            events: EventBus::new(),
            tasks: Arc::new(TaskQueue::new()),
            timeouts: Box::new(TimeoutRegistry::new()),
            sink: Box::new(sink),
            reachability: Box::new(AlwaysReachable),
            inbound,
            dispatch_lock: DispatchLock::new(),
            link: None,
            connector: None,
            retired: Vec::new(),
            attempt: 0,
            heartbeat: Heartbeat::new(),
            connect_timer: None,
            retry_timer: None,
            stopped: true,
            not_reachable_reported: false,
        }
    }

    /// Use `check` to decide whether reconnects may run.
    pub fn with_reachability(mut self, check: impl Reachability + 'static) -> Self {
        self.reachability = Box::new(check);
        self
    }

    /// Schedule timers on `timeouts` instead of the built-in registry.
    pub fn with_timeouts(mut self, timeouts: impl Timeouts<NetTimer> + 'static) -> Self {
        self.timeouts = Box::new(timeouts);
        self
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Subscribe to state changes.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe_events(&mut self) -> Receiver<NetEvent> {
        self.events.subscribe()
    }

    /// Whether a connection is established.
    pub fn is_connected(&self) -> bool {
        self.link.is_some() && self.state() == ConnectionState::Connected
    }

    /// Connect attempts left before giving up.
    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    /// Whether the owner explicitly stopped the client.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shared handle to the inbound dispatch lock.
    pub fn dispatch_lock(&self) -> DispatchLock {
        self.dispatch_lock.clone()
    }

    /// Payloads received but not yet delivered.
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Payloads queued but not yet written.
    pub fn pending_outbound(&self) -> usize {
        self.link.as_ref().map_or(0, |link| link.outbound.len())
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Connect to the configured server.
    ///
    /// Ignored unless the client is idle (`Init` or `DisConnected`).
    pub fn connect(&mut self) {
        let state = self.state();
        if !state.accepts_connect() {
            tracing::debug!(?state, "connect server ignored");
            return;
        }

        self.stopped = false;
        tracing::info!(host = %self.config.host, port = self.config.port, "connect server");

        self.close_connect();
        self.enable_retry(true);
        self.start_connecting();
    }

    /// Point the client at `host:port` and connect.
    ///
    /// Ignored, endpoint included, unless the client is idle.
    pub fn connect_to(&mut self, host: impl Into<String>, port: u16) {
        if !self.state().accepts_connect() {
            tracing::debug!(state = ?self.state(), "connect server ignored");
            return;
        }
        self.config.host = host.into();
        self.config.port = port;
        self.connect();
    }

    /// Tear everything down and stay down until the next [`connect`](Self::connect).
    ///
    /// Safe to call in any state, any number of times.
    pub fn stop_connect_server(&mut self) {
        tracing::debug!("stop connect server");

        self.stopped = true;
        self.close_connect();
        self.enable_retry(false);

        self.clear_connect_timer();
        self.clear_retry_timer();
        if let Some(id) = self.heartbeat.reset() {
            self.timeouts.clear_timeout(id);
        }
        self.tasks.clear();
    }

    /// Queue `payload` for sending.
    ///
    /// Returns `false`, after logging, when not connected or when the payload
    /// cannot fit in a frame. Nothing is buffered across disconnects.
    pub fn send_packet(&mut self, payload: impl Into<Arc<[u8]>>) -> bool {
        let payload = payload.into();

        let Some(link) = self.link.as_ref().filter(|_| self.state() == ConnectionState::Connected)
        else {
            tracing::debug!(state = ?self.state(), "send packet ignored");
            return false;
        };

        let max = self.config.frame.max_payload_len();
        if payload.len() > max {
            tracing::warn!(size = payload.len(), max, "send packet too large, dropped");
            return false;
        }

        link.outbound.push(payload);
        true
    }

    /// Hold back inbound delivery for `duration` more.
    pub fn lock_event(&self, duration: Duration) {
        self.dispatch_lock.lock(duration);
    }

    /// Resume inbound delivery now.
    pub fn unlock_event(&self) {
        self.dispatch_lock.unlock();
    }

    /// Application moved to the background (`true`) or foreground (`false`).
    ///
    /// No reconnects happen while paused.
    pub fn on_application_pause(&mut self, paused: bool) {
        tracing::debug!(paused, "application pause");
        if paused {
            self.enable_retry(false);
        } else if !self.stopped {
            self.enable_retry(true);
        }
    }

    /// Run one tick: apply worker reports, fire due timers, reconnect if
    /// needed, deliver inbound payloads and keep the heartbeat going.
    pub fn update(&mut self, dt: Duration) {
        if self.stopped {
            return;
        }

        let tasks = Arc::clone(&self.tasks);
        tasks.update(|task| self.apply_task(task));

        // A reply that is already here must win against its own timeout.
        self.observe_heartbeat();

        for timer in self.timeouts.advance(dt) {
            self.on_timer(timer);
        }

        self.check_reconnect();
        self.dispatch_lock.tick(dt);
        self.fire_events();
        self.send_heartbeat(dt);

        self.retired.retain(|worker| !worker.is_finished());
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    fn set_state(&mut self, state: ConnectionState) {
        tracing::trace!(from = ?self.state(), to = ?state, "net state");
        self.state.set(state);
    }

    fn start_connecting(&mut self) {
        let state = self.state();
        if !state.can_start_connecting() {
            tracing::debug!(?state, "start connecting ignored");
            return;
        }

        self.attempt += 1;
        self.set_state(ConnectionState::Connecting);
        self.events.emit(NetEvent::Connecting);

        self.begin_connect_timer();
        self.start_connect_thread();
    }

    fn start_connect_thread(&mut self) {
        let request = ConnectRequest {
            attempt: self.attempt,
            host: self.config.host.clone(),
            port: self.config.port,
            timeout: self.config.connect_timeout,
            socket: self.config.socket.clone(),
        };

        match spawn_connector(request, Arc::clone(&self.tasks)) {
            Ok(connector) => self.connector = Some(connector),
            Err(error) => {
                tracing::error!(%error, "failed to spawn connect thread");
                self.tasks.add(NetTask::ConnectFailed {
                    attempt: self.attempt,
                    error,
                });
            }
        }
    }

    fn apply_task(&mut self, task: NetTask) {
        if task.attempt() != self.attempt {
            tracing::debug!(
                task_attempt = task.attempt(),
                current = self.attempt,
                "ignoring report from superseded attempt"
            );
            return;
        }

        match task {
            NetTask::Connected { stream, .. } => self.connect_ok(stream),
            NetTask::ConnectFailed { error, .. } => {
                tracing::debug!(%error, "connect thread reported failure");
                self.release_connector();
                self.connect_fail();
            }
            NetTask::ReceiveFailed { error, .. } => {
                match error {
                    Some(error) => tracing::info!(%error, "receiver thread failed"),
                    None => tracing::info!("server closed the connection"),
                }
                self.notify_disconnect();
            }
            NetTask::ProtocolViolation { error, .. } => {
                tracing::warn!(%error, "framing violation");
                self.notify_disconnect();
            }
            NetTask::SendFailed { error, .. } => {
                tracing::warn!(%error, "sender thread failed");
                self.notify_disconnect();
            }
        }
    }

    fn connect_ok(&mut self, stream: TcpStream) {
        let state = self.state();
        if state != ConnectionState::Connecting {
            tracing::debug!(?state, "connect ok ignored");
            return;
        }

        self.release_connector();
        self.clear_connect_timer();

        match self.open_link(stream) {
            Ok(link) => self.link = Some(link),
            Err(error) => {
                tracing::error!(%error, "failed to start connection workers");
                self.connect_fail();
                return;
            }
        }

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            attempt = self.attempt,
            "connected"
        );
        self.set_state(ConnectionState::Connected);
        if let Some(id) = self.heartbeat.reset() {
            self.timeouts.clear_timeout(id);
        }
        self.enable_retry(true);
        self.events.emit(NetEvent::Success);
    }

    fn open_link(&self, stream: TcpStream) -> std::io::Result<Link> {
        let outbound = Arc::new(OutboundQueue::new());

        let sender = spawn_sender(
            stream.try_clone()?,
            self.attempt,
            SenderOptions {
                frame: self.config.frame,
                disconnect_on_error: self.config.disconnect_on_send_error,
            },
            Arc::clone(&outbound),
            Arc::clone(&self.tasks),
        )?;

        let receiver = match stream.try_clone().and_then(|clone| {
            spawn_receiver(
                clone,
                self.attempt,
                self.config.frame,
                Arc::clone(&self.inbound),
                Arc::clone(&self.tasks),
            )
        }) {
            Ok(receiver) => receiver,
            Err(error) => {
                sender.stop();
                let _ = stream.shutdown(Shutdown::Both);
                return Err(error);
            }
        };

        Ok(Link {
            stream,
            outbound,
            sender,
            receiver,
        })
    }

    fn connect_fail(&mut self) {
        let state = self.state();
        if state != ConnectionState::Connecting {
            tracing::debug!(?state, "connect fail ignored");
            return;
        }

        self.set_state(ConnectionState::ConnectFailed);
        self.clear_connect_timer();
        self.stop_connector();

        self.retries_remaining = self.retries_remaining.saturating_sub(1);
        tracing::info!(retries = self.retries_remaining, "connect failed");

        if self.retries_remaining > 0 {
            self.begin_retry_timer();
        } else {
            self.close_connect();
            self.events.emit(NetEvent::RetryFail);
        }
    }

    /// Abort a connect still in flight; the thread is joined on drop.
    fn stop_connector(&mut self) {
        if let Some(connector) = self.connector.take() {
            self.retired.push(connector.stop());
        }
    }

    fn release_connector(&mut self) {
        if let Some(connector) = self.connector.take() {
            self.retired.push(connector.into_worker());
        }
    }

    fn notify_disconnect(&mut self) {
        let state = self.state();
        if state == ConnectionState::Connected {
            self.close_connect();
        } else {
            tracing::debug!(?state, "notify disconnect ignored");
        }
    }

    fn close_connect(&mut self) {
        self.set_state(ConnectionState::DisConnected);

        if let Some(id) = self.heartbeat.reset() {
            self.timeouts.clear_timeout(id);
        }
        self.stop_connector();

        let Some(link) = self.link.take() else {
            return;
        };

        tracing::info!("close connect");
        link.outbound.clear();
        link.sender.stop();
        link.receiver.stop();
        if let Err(error) = link.stream.shutdown(Shutdown::Both) {
            tracing::debug!(%error, "socket shutdown failed");
        }
        self.retired.push(link.sender);
        self.retired.push(link.receiver);

        self.events.emit(NetEvent::Close);
    }

    fn enable_retry(&mut self, enable: bool) {
        self.retries_remaining = if enable { self.config.max_retries } else { 0 };
        tracing::debug!(enable, "enable retry");
    }

    fn check_reconnect(&mut self) {
        if self.state() != ConnectionState::DisConnected || self.retries_remaining == 0 {
            return;
        }

        if self.reachability.is_reachable() {
            self.not_reachable_reported = false;
            tracing::debug!("check reconnect: connecting");
            self.start_connecting();
        } else if !self.not_reachable_reported {
            self.not_reachable_reported = true;
            tracing::info!("network not reachable, reconnect suspended");
            self.events.emit(NetEvent::NotReachable);
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    fn on_timer(&mut self, timer: NetTimer) {
        match timer {
            NetTimer::ConnectTimeout { attempt } => {
                self.connect_timer = None;
                if attempt == self.attempt && self.state() == ConnectionState::Connecting {
                    tracing::info!(attempt, "connect timeout");
                    self.stop_connector();
                    self.connect_fail();
                }
            }
            NetTimer::Retry => {
                self.retry_timer = None;
                tracing::debug!(retries = self.retries_remaining, "net retry");
                self.start_connecting();
            }
            NetTimer::HeartbeatResponse { attempt } => {
                self.heartbeat.response_timer_fired();
                if attempt == self.attempt && self.heartbeat.awaiting_response() {
                    tracing::warn!("heartbeat response timeout");
                    self.notify_disconnect();
                }
            }
        }
    }

    fn begin_connect_timer(&mut self) {
        self.clear_connect_timer();
        let id = self.timeouts.create_timeout(
            self.config.connect_timeout,
            NetTimer::ConnectTimeout {
                attempt: self.attempt,
            },
        );
        self.connect_timer = Some(id);
    }

    fn clear_connect_timer(&mut self) {
        if let Some(id) = self.connect_timer.take() {
            self.timeouts.clear_timeout(id);
        }
    }

    fn begin_retry_timer(&mut self) {
        self.clear_retry_timer();
        let id = self
            .timeouts
            .create_timeout(self.config.retry_backoff, NetTimer::Retry);
        self.retry_timer = Some(id);
    }

    fn clear_retry_timer(&mut self) {
        if let Some(id) = self.retry_timer.take() {
            self.timeouts.clear_timeout(id);
        }
    }

    // -----------------------------------------------------------------------
    // Per-tick work
    // -----------------------------------------------------------------------

    fn fire_events(&mut self) {
        while !self.dispatch_lock.is_locked() {
            let Some(payload) = self.inbound.pop() else {
                break;
            };
            self.sink.publish(NET_EVENT_CHANNEL, payload);
        }
    }

    fn observe_heartbeat(&mut self) {
        if let Some(id) = self.heartbeat.observe(self.inbound.liveness()) {
            self.timeouts.clear_timeout(id);
        }
    }

    fn send_heartbeat(&mut self, dt: Duration) {
        self.observe_heartbeat();
        let liveness = self.inbound.liveness();

        let connected = self.is_connected();
        if !self.heartbeat.tick(dt, self.config.heartbeat.interval, connected) {
            return;
        }

        let ping = self.config.heartbeat.ping.clone();
        self.send_packet(ping);

        let timer = self.timeouts.create_timeout(
            self.config.heartbeat.response_timeout,
            NetTimer::HeartbeatResponse {
                attempt: self.attempt,
            },
        );
        if let Some(previous) = self.heartbeat.ping_sent(liveness, timer) {
            self.timeouts.clear_timeout(previous);
        }
    }
}

impl Drop for NetClient {
    fn drop(&mut self) {
        self.stop_connect_server();
        for worker in self.retired.drain(..) {
            worker.wait_termination();
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
