//! Session operations abstraction
//!
//! The transport loop is written once against `SessionOps` and runs
//! unchanged over the plain socket or the TLS session.

use super::socket::{self, SocketHandle};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Session operations trait
///
/// Transient conditions are reported as `io::ErrorKind::WouldBlock` (or
/// `Interrupted`); any other error is fatal for the connection.
pub trait SessionOps: Send {
    /// Send bytes, returning how many were consumed
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Receive into `buf`; `Ok(0)` means the peer closed the connection
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Bytes already decrypted and buffered above the socket
    fn pending(&self) -> usize {
        0
    }

    /// Wait up to `timeout` for the socket to accept more data
    fn wait_writable(&self, timeout: Duration) -> bool;

    /// Socket handle handed to readiness polls
    fn handle(&self) -> SocketHandle;

    /// Whether traffic is encrypted
    fn is_tls(&self) -> bool {
        false
    }

    /// Close the session layer
    fn close(&mut self) -> io::Result<()>;
}

/// Plain socket session operations
pub struct PlainSession {
    stream: TcpStream,
}

impl PlainSession {
    /// Create plain session operations from a TCP stream
    pub fn new(stream: TcpStream) -> Self {
        PlainSession { stream }
    }

    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl SessionOps for PlainSession {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn wait_writable(&self, timeout: Duration) -> bool {
        socket::wait_writable(self.stream.as_raw_fd(), timeout)
    }

    fn handle(&self) -> SocketHandle {
        self.stream.as_raw_fd()
    }

    fn close(&mut self) -> io::Result<()> {
        // The owning connection shuts the socket down
        Ok(())
    }
}

/// Readiness poll supplied by the UI
///
/// Called before every socket read while no decrypted data is buffered.
/// The implementation is expected to block briefly until the socket may be
/// readable, running other pending work (UI events) meanwhile.
pub trait ReadinessPoll: Send {
    fn wait(&mut self, socket: SocketHandle);
}

impl<F: FnMut(SocketHandle) + Send> ReadinessPoll for F {
    fn wait(&mut self, socket: SocketHandle) {
        self(socket)
    }
}

/// Exit signal observed by `recv` after each readiness poll
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every pending receive to return
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
