//! Loopback helpers shared by the worker and client tests.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};

/// A connected pair of loopback sockets: `(client side, server side)`.
pub(crate) fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

/// Poll `cond` for up to five seconds.
pub(crate) fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// A listener whose accept queue is full, so new connects hang in the
/// handshake. Returns `None` where the platform refuses or accepts instead.
pub(crate) struct StalledListener {
    pub(crate) addr: SocketAddr,
    _listener: Socket,
    _fillers: Vec<TcpStream>,
}

pub(crate) fn stalled_listener() -> Option<StalledListener> {
    let listener = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).ok()?;
    listener.bind(&SocketAddr::from(([127, 0, 0, 1], 0)).into()).ok()?;
    listener.listen(0).ok()?;
    let addr = listener.local_addr().ok()?.as_socket()?;

    let mut fillers = Vec::new();
    for _ in 0..8 {
        match TcpStream::connect_timeout(&addr, Duration::from_millis(200)) {
            Ok(stream) => fillers.push(stream),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                return Some(StalledListener {
                    addr,
                    _listener: listener,
                    _fillers: fillers,
                });
            }
            Err(_) => return None,
        }
    }
    None
}
