//! One client session: a [`NetClient`] plus the application's view of it.

use std::time::Duration;

use crossbeam_channel::Receiver;
use gamelink_config::Config;
use gamelink_net::{ClientConfig, NetClient, NetEvent};
use tracing::{debug, info, warn};

/// Payload the session sends periodically while connected.
pub const KEEPALIVE_PAYLOAD: &[u8] = b"ping";

/// Drives a client from the fixed-step loop and logs what comes back.
pub struct Session {
    client: NetClient,
    events: Receiver<NetEvent>,
    packets: Receiver<Vec<u8>>,
    log_packets: bool,
    keepalive_interval: Duration,
    since_keepalive: Duration,
    received: u64,
    last_packet: Option<Vec<u8>>,
    gave_up: bool,
}

impl Session {
    /// Build the client from `config` and start connecting.
    pub fn start(config: &Config, keepalive_interval: Duration) -> Self {
        let (tx, packets) = crossbeam_channel::unbounded();
        let mut client = NetClient::new(ClientConfig::from(&config.network), tx);
        let events = client.subscribe_events();
        client.connect();

        Self {
            client,
            events,
            packets,
            log_packets: config.debug.log_packets,
            keepalive_interval,
            since_keepalive: Duration::ZERO,
            received: 0,
            last_packet: None,
            gave_up: false,
        }
    }

    /// Advance the session by one fixed step.
    pub fn step(&mut self, dt: Duration) {
        self.client.update(dt);

        for event in self.events.try_iter() {
            match event {
                NetEvent::Connecting => info!(retries = self.client.retries_remaining(), "connecting"),
                NetEvent::Success => info!("link up"),
                NetEvent::Close => warn!("link closed"),
                NetEvent::NotReachable => warn!("network unreachable, waiting"),
                NetEvent::RetryFail => {
                    warn!("all connect attempts failed");
                    self.gave_up = true;
                }
            }
        }

        for payload in self.packets.try_iter() {
            self.received += 1;
            if self.log_packets {
                info!(len = payload.len(), total = self.received, "packet");
            } else {
                debug!(len = payload.len(), total = self.received, "packet");
            }
            self.last_packet = Some(payload);
        }

        if self.client.is_connected() && !self.keepalive_interval.is_zero() {
            self.since_keepalive += dt;
            if self.since_keepalive >= self.keepalive_interval {
                self.since_keepalive = Duration::ZERO;
                self.client.send_packet(KEEPALIVE_PAYLOAD);
            }
        }
    }

    /// Whether the client exhausted its retries.
    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    /// Inbound payloads seen so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Most recent inbound payload.
    pub fn last_packet(&self) -> Option<&[u8]> {
        self.last_packet.as_deref()
    }

    /// The underlying client.
    pub fn client(&self) -> &NetClient {
        &self.client
    }

    /// Stop the client.
    pub fn shutdown(&mut self) {
        info!(received = self.received, "shutting down");
        self.client.stop_connect_server();
    }
}
