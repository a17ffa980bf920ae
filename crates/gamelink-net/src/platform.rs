//! Cross-platform TCP socket configuration.
//!
//! [`SocketConfig`] collects the options applied to every client socket
//! (TCP_NODELAY, kernel buffer sizes, blocking I/O timeouts). Buffer sizes are
//! set through `socket2` before connecting so the kernel can size the receive
//! window during the handshake.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockRef, Socket, Type};

/// Socket options applied to each connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm for lower latency. Default: true.
    pub tcp_nodelay: bool,
    /// `SO_RCVBUF` in bytes. Default: 1 MiB.
    pub recv_buffer_size: usize,
    /// `SO_SNDBUF` in bytes. Default: 1 MiB.
    pub send_buffer_size: usize,
    /// Blocking read timeout. A read that times out is treated as a dead link. Default: 30 s.
    pub recv_timeout: Duration,
    /// Blocking write timeout. Default: 30 s.
    pub send_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            recv_buffer_size: 1024 * 1024,
            send_buffer_size: 1024 * 1024,
            recv_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// Lets the owner abort a connect that is still in progress.
///
/// The connecting thread registers each socket it creates; [`cancel`](Self::cancel)
/// shuts that socket down, which wakes a thread blocked in the connect with an
/// error. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct ConnectCancel {
    inner: Arc<Mutex<CancelState>>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: bool,
    socket: Option<Socket>,
}

impl ConnectCancel {
    /// Create a handle that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the current attempt and any later one using this handle.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        state.cancelled = true;
        if let Some(socket) = state.socket.take()
            && let Err(error) = socket.shutdown(Shutdown::Both)
        {
            tracing::trace!(%error, "shutdown of connecting socket failed");
        }
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    fn register(&self, socket: &Socket) -> io::Result<()> {
        let mut state = self.inner.lock();
        if state.cancelled {
            return Err(cancelled());
        }
        state.socket = Some(socket.try_clone()?);
        Ok(())
    }

    fn release(&self) {
        self.inner.lock().socket = None;
    }
}

fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connect cancelled")
}

/// Resolve `host:port` and connect to the first address that accepts.
///
/// All addresses share one `timeout` budget; zero means no limit. The last
/// error is returned if none succeed.
pub fn connect_host(
    host: &str,
    port: u16,
    timeout: Duration,
    config: &SocketConfig,
    cancel: &ConnectCancel,
) -> io::Result<TcpStream> {
    let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
    let mut last_err = None;

    for addr in (host, port).to_socket_addrs()? {
        let remaining = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    last_err = Some(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {host}:{port} timed out"),
                    ));
                    break;
                }
                left
            }
            None => Duration::ZERO,
        };

        match connect_addr(addr, remaining, config, cancel) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "address refused connection");
                if cancel.is_cancelled() {
                    return Err(e);
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{host}:{port} resolved to no addresses"),
        )
    }))
}

/// Connect a single address with the configured socket options.
pub fn connect_addr(
    addr: SocketAddr,
    timeout: Duration,
    config: &SocketConfig,
    cancel: &ConnectCancel,
) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_recv_buffer_size(config.recv_buffer_size)?;
    socket.set_send_buffer_size(config.send_buffer_size)?;

    cancel.register(&socket)?;
    let connected = if timeout.is_zero() {
        socket.connect(&addr.into())
    } else {
        socket.connect_timeout(&addr.into(), timeout)
    };
    cancel.release();
    connected?;

    if cancel.is_cancelled() {
        return Err(cancelled());
    }

    let stream: TcpStream = socket.into();
    configure_stream(&stream, config)?;
    Ok(stream)
}

/// Apply the post-connect options to `stream`.
pub fn configure_stream(stream: &TcpStream, config: &SocketConfig) -> io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;
    stream.set_read_timeout(non_zero(config.recv_timeout))?;
    stream.set_write_timeout(non_zero(config.send_timeout))?;
    Ok(())
}

/// Read back the kernel buffer sizes actually granted for `stream`.
pub fn buffer_sizes(stream: &TcpStream) -> io::Result<(usize, usize)> {
    let sock = SockRef::from(stream);
    Ok((sock.recv_buffer_size()?, sock.send_buffer_size()?))
}

// std rejects a zero timeout; zero means "block forever" here.
fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}
