use super::Result;
use crate::error::HarnessError;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use tracing::debug;

/// Interval between connection attempts while waiting for a listener
const PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Asks the OS for a currently unused TCP port on the loopback interface.
///
/// The port is released before returning, so another process can still grab
/// it; good enough for handing a port to a server we are about to start.
pub fn pick_free_port() -> Result<u16> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::LOCALHOST, 0)).into())?;

    let port = socket
        .local_addr()?
        .as_socket()
        .map(|addr| addr.port())
        .ok_or_else(|| eyre::eyre!("bound socket has no inet address"))?;

    debug!("picked free port {}", port);
    Ok(port)
}

/// Returns true if something accepts TCP connections on `addr`
pub fn is_listening(addr: SocketAddr) -> bool {
    TcpStream::connect_timeout(&addr, PROBE_INTERVAL * 4).is_ok()
}

/// Deadline `timeout` from now; `None` when it lies beyond what `Instant` can hold
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

pub(crate) fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Polls `addr` until a connection succeeds or `timeout` elapses
pub fn wait_until_listening(addr: SocketAddr, timeout: Duration) -> Result<()> {
    let deadline = deadline_after(timeout);
    loop {
        if is_listening(addr) {
            debug!("{} is accepting connections", addr);
            return Ok(());
        }
        if past(deadline) {
            return Err(HarnessError::NotListening { addr, timeout }.into());
        }
        std::thread::sleep(PROBE_INTERVAL);
    }
}
