//! TCP layer of the RDP client
//!
//! This module owns the socket of the single live RDP connection and the
//! buffers all framing is done in.
//!
//! # Architecture
//!
//! The TCP layer uses the session operations abstraction so that the same
//! send/receive loop drives either the plain socket or the TLS session:
//!
//! - `SessionOps` defines the primitive operations (send, recv, pending, wait)
//! - `Transport` runs the blocking send/receive loops and holds the error latch
//! - `StreamPool` hands out the reusable `StreamBuffer`s
//! - `TcpLayer` resolves, caches and connects, owning the live `Connection`
//!
//! # Examples
//!
//! ```no_run
//! use rdp_transport::net::{TcpLayer, TransportConfig, DEFAULT_RDP_PORT};
//! use bytes::Buf;
//!
//! let mut tcp = TcpLayer::new(TransportConfig::default());
//! let conn = tcp.connect("rdp.example.com", DEFAULT_RDP_PORT).unwrap();
//!
//! // Write a packet into a pooled outbound buffer and send it
//! let mut out = conn.acquire_outbound(11).unwrap();
//! out.put_slice(&[0x03, 0x00, 0x00, 0x0b, 0x06, 0xe0, 0x00, 0x00, 0x00, 0x00, 0x00]);
//! conn.send(&out).unwrap();
//! drop(out);
//!
//! // Receive the 4 byte TPKT header into the shared inbound buffer
//! let mut header = conn.recv(4).unwrap();
//! assert_eq!(header.get_u8(), 3);
//! ```

pub mod config;
pub mod connection;
pub mod pool;
pub mod resolve;
pub mod session;
pub mod socket;
pub mod stream;
pub mod transport;

pub use config::{TransportConfig, TransportConfigBuilder};
pub use connection::{Connection, TcpLayer};
pub use pool::{StreamGuard, StreamPool};
pub use resolve::{AddressCache, CachedAddress, Resolver, SystemResolver};
pub use session::{CancelToken, PlainSession, ReadinessPoll, SessionOps};
pub use socket::SocketHandle;
pub use stream::StreamBuffer;
pub use transport::Transport;

use std::time::Duration;

/// Result type for TCP layer operations
pub type Result<T> = std::result::Result<T, Error>;

/// TCP layer errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unable to resolve host '{host}': {source}")]
    Resolution {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Network error: {0}")]
    Network(#[source] std::io::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Connection previously failed")]
    Latched,

    #[error("Receive cancelled")]
    Cancelled,

    #[error("Not connected")]
    NotConnected,

    #[error("A connection is already established")]
    AlreadyConnected,

    #[error("All {0} outbound streams are in flight")]
    PoolExhausted(usize),

    #[error("Inbound stream is still borrowed")]
    BufferBusy,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] crate::tls::TlsError),
}

impl Error {
    /// Returns true if a fresh connect attempt may succeed.
    ///
    /// Certificate and trust-store failures are never retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Resolution { .. }
            | Self::Connect { .. }
            | Self::Network(_)
            | Self::ConnectionClosed
            | Self::Latched
            | Self::Io(_) => true,
            Self::Tls(e) => !e.requires_exit(),
            _ => false,
        }
    }

    /// Returns true if this error should not be retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

/// Default RDP port
pub const DEFAULT_RDP_PORT: u16 = 3389;

/// Initial capacity of every pooled stream
pub const INITIAL_STREAM_CAPACITY: usize = 4096;

/// Floor applied to the socket receive buffer
pub const MIN_RECV_BUFFER: usize = 16 * 1024;

/// Outbound slots when smartcard redirection shares the pool
pub const SMARTCARD_POOL_SIZE: usize = 8;

/// Upper bound of a single wait for the socket to become writable
pub const WRITE_WAIT: Duration = Duration::from_millis(100);
