//! Negotiated session description
//!
//! Filled in once after a successful handshake and logged, so a trace shows
//! which protocol, cipher and certificate a connection ended up with.

use super::cert::CertInfo;
use openssl::ssl::SslRef;
use std::fmt;

/// Parameters of an established TLS session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Negotiated protocol version (e.g., "TLSv1.2")
    pub version: String,
    /// Negotiated cipher suite
    pub cipher: String,
    /// Peer certificate, when one was presented and could be parsed
    pub peer: Option<CertInfo>,
}

impl SessionInfo {
    /// Describe the session held by `ssl`
    pub fn from_ssl(ssl: &SslRef) -> Self {
        let cipher = ssl
            .current_cipher()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| "<undef>".to_string());

        let peer = ssl
            .peer_certificate()
            .and_then(|cert| CertInfo::from_x509(&cert).ok());

        SessionInfo {
            version: ssl.version_str().to_string(),
            cipher,
            peer,
        }
    }
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-({})", self.version, self.cipher)?;
        if let Some(ref peer) = self.peer {
            write!(f, " peer {}", peer.common_name.as_deref().unwrap_or("<undef>"))?;
        }
        Ok(())
    }
}
