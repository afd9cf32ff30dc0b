//! Socket setup and readiness helpers

use super::config::TransportConfig;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::RawFd;
use std::time::Duration;
use tracing::debug;

/// OS handle of the connection socket, as passed to readiness polls
pub type SocketHandle = RawFd;

/// Open a TCP socket and connect it to `addr`
pub(crate) fn connect(addr: &SocketAddr, config: &TransportConfig) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;

    match config.connect_timeout {
        Some(timeout) => socket.connect_timeout(&(*addr).into(), timeout)?,
        None => socket.connect(&(*addr).into())?,
    }

    Ok(socket.into())
}

/// Apply the low-latency socket options
///
/// Disables Nagle and raises the receive buffer to `min_recv_buffer` when the
/// OS default is smaller. Failures are logged and otherwise ignored.
pub(crate) fn apply_options(stream: &TcpStream, min_recv_buffer: usize) {
    let sock = SockRef::from(stream);

    if let Err(e) = sock.set_nodelay(true) {
        debug!(error = %e, "failed to disable Nagle");
    }

    match sock.recv_buffer_size() {
        Ok(size) if size < min_recv_buffer => {
            if let Err(e) = sock.set_recv_buffer_size(min_recv_buffer) {
                debug!(error = %e, size, "failed to raise receive buffer");
            }
        }
        Ok(_) => {}
        Err(e) => debug!(error = %e, "failed to query receive buffer size"),
    }
}

/// Wait until `fd` is writable or `timeout` elapses
///
/// Returns true if the socket became writable.
pub(crate) fn wait_writable(fd: SocketHandle, timeout: Duration) -> bool {
    use libc::{poll, pollfd, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: POLLOUT,
        revents: 0,
    };

    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    result > 0
}
