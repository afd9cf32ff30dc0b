//! TLS upgrade and trust-on-first-use certificate pinning
//!
//! RDP servers almost always present self-signed certificates, so no CA
//! validation is done. Instead the peer's public key is pinned per host on
//! first contact and compared on every later connection.
//!
//! # Architecture
//!
//! 1. `TlsConfig` holds the compatibility client profile
//! 2. `TlsSession` performs the handshake and implements `SessionOps`, so the
//!    transport loop runs over it unchanged
//! 3. `CertPolicy` decides whether to accept the peer certificate, backed by
//!    a `TrustDb` (normally the on-disk `FileTrustStore`) and a `TrustPrompt`
//!
//! # Examples
//!
//! ```no_run
//! use rdp_transport::net::{TcpLayer, TransportConfig, DEFAULT_RDP_PORT};
//! use rdp_transport::tls::{FileTrustStore, LinePrompt, TlsConfig};
//!
//! let mut tcp = TcpLayer::new(TransportConfig::default());
//! let conn = tcp.connect("rdp.example.com", DEFAULT_RDP_PORT).unwrap();
//!
//! let tls = TlsConfig::client().build().unwrap();
//! let trust = FileTrustStore::from_env("rdp-transport").unwrap();
//! let decision = conn.start_tls(&tls, &trust, &mut LinePrompt::stdio()).unwrap();
//! println!("certificate {:?}", decision);
//!
//! // Key handed to the network level authentication layer
//! let key = conn.server_public_key().unwrap();
//! ```

pub mod cert;
pub mod config;
pub mod handshake;
pub mod info;
pub mod policy;
pub mod session;
pub mod trust;

pub use cert::CertInfo;
pub use config::{ClientConfigBuilder, TlsConfig, TlsVersion};
pub use info::SessionInfo;
pub use policy::{Answer, CertPolicy, Decision, LinePrompt, TrustPrompt};
pub use session::TlsSession;
pub use trust::{djb2, FileTrustStore, TrustDb, TrustRecord, Verdict};

use std::path::PathBuf;

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Certificate verification failed: {0}")]
    Verification(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Unsupported public key type: {0}")]
    UnsupportedKey(String),

    #[error("Certificate for '{0}' rejected")]
    CertificateRejected(String),

    #[error("Trust store error at {}: {source}", path.display())]
    TrustStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No trust store available, HOME is not set")]
    NoTrustStore,
}

impl TlsError {
    /// Returns true if the certificate check failed in a way the client
    /// must not continue from.
    #[must_use]
    pub fn requires_exit(&self) -> bool {
        matches!(
            self,
            Self::CertificateRejected(_)
                | Self::TrustStore { .. }
                | Self::NoTrustStore
                | Self::Certificate(_)
        )
    }
}

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
