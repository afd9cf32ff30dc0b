//! TLS session operations
//!
//! This module implements the SessionOps trait for TLS connections,
//! so the transport switches from plain to encrypted I/O by swapping
//! its session.

use super::config::TlsConfig;
use super::handshake;
use super::info::SessionInfo;
use super::Result;
use crate::net::socket::{self, SocketHandle};
use crate::net::SessionOps;
use openssl::ssl::{ErrorCode, SslRef, SslStream};
use openssl::x509::X509;
use std::io;
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::time::Duration;
use tracing::{debug, info};

/// Client side of an established TLS session
pub struct TlsSession {
    stream: SslStream<TcpStream>,
    closed: bool,
}

impl TlsSession {
    /// Run the client handshake over `stream`
    pub fn connect(stream: TcpStream, config: &TlsConfig) -> Result<Self> {
        let stream = handshake::client_handshake(stream, config)?;
        info!(session = %SessionInfo::from_ssl(stream.ssl()), "TLS session established");

        Ok(TlsSession {
            stream,
            closed: false,
        })
    }

    /// Certificate presented by the server
    pub fn peer_certificate(&self) -> Option<X509> {
        self.stream.ssl().peer_certificate()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo::from_ssl(self.stream.ssl())
    }

    pub fn ssl(&self) -> &SslRef {
        self.stream.ssl()
    }

    /// Get reference to underlying TCP stream
    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }
}

/// Map an OpenSSL I/O failure onto the transient/fatal split of `SessionOps`
fn io_error(e: openssl::ssl::Error) -> io::Error {
    match e.code() {
        ErrorCode::WANT_READ | ErrorCode::WANT_WRITE => io::ErrorKind::WouldBlock.into(),
        _ => e
            .into_io_error()
            .unwrap_or_else(|e| io::Error::new(io::ErrorKind::Other, e)),
    }
}

impl SessionOps for TlsSession {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.ssl_write(buf).map_err(io_error)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.ssl_read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.code() == ErrorCode::ZERO_RETURN => Ok(0),
            // EOF without close-notify
            Err(e) if e.code() == ErrorCode::SYSCALL && e.io_error().is_none() => Ok(0),
            Err(e) => Err(io_error(e)),
        }
    }

    fn pending(&self) -> usize {
        self.stream.ssl().pending()
    }

    fn wait_writable(&self, timeout: Duration) -> bool {
        socket::wait_writable(self.stream.get_ref().as_raw_fd(), timeout)
    }

    fn handle(&self) -> SocketHandle {
        self.stream.get_ref().as_raw_fd()
    }

    fn is_tls(&self) -> bool {
        true
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.stream.shutdown() {
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(error = %e, "close-notify failed");
                Err(io_error(e))
            }
        }
    }
}
