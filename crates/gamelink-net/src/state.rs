//! Connection states, lifecycle events and their observers.

use crossbeam_channel::{Receiver, Sender, unbounded};
use tokio::sync::watch;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Freshly constructed; never connected.
    Init,
    /// A connect attempt is in flight.
    Connecting,
    /// Stream open, sender and receiver running.
    Connected,
    /// The last attempt failed; a retry may be scheduled.
    ConnectFailed,
    /// Torn down. The rest state after any close.
    DisConnected,
}

impl ConnectionState {
    /// States from which a user-initiated connect is accepted.
    pub fn accepts_connect(self) -> bool {
        matches!(self, Self::Init | Self::DisConnected)
    }

    /// States from which a (re)connect attempt may start.
    pub fn can_start_connecting(self) -> bool {
        matches!(self, Self::ConnectFailed | Self::DisConnected)
    }
}

/// Lifecycle notification delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetEvent {
    /// A connect attempt started.
    Connecting,
    /// The connection is established.
    Success,
    /// An established connection was closed.
    Close,
    /// Every retry failed; no further attempts will be made automatically.
    RetryFail,
    /// A reconnect is pending but the network is unreachable.
    NotReachable,
}

/// Observable connection state backed by a [`watch`] channel.
///
/// Multiple subscribers can observe state transitions without polling.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Init`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Init);
        Self { tx, rx }
    }

    /// Set the current connection state, notifying subscribers on change.
    pub fn set(&self, state: ConnectionState) {
        self.tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// Fan-out of [`NetEvent`]s to any number of channel subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Sender<NetEvent>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&mut self) -> Receiver<NetEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, forgetting dropped ones.
    pub fn emit(&mut self, event: NetEvent) {
        tracing::debug!(?event, "net event");
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    /// Number of live subscribers as of the last emit.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
