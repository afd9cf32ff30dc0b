//! TLS client configuration
//!
//! The default profile is tuned for compatibility with older terminal
//! servers: TLS 1.0 floor, relaxed security level and the usual OpenSSL
//! interoperability workarounds. Peer verification is left to the pinning
//! policy.

use super::handshake::DEFAULT_HANDSHAKE_TIMEOUT_SECS;
use super::{Result, TlsError};
use openssl::ssl::{SslContext, SslContextBuilder, SslMethod, SslOptions, SslVerifyMode, SslVersion};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Cipher list of the compatibility profile
pub const COMPAT_CIPHER_LIST: &str = "DEFAULT:@SECLEVEL=0";

/// Protocol version bound of the client profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl From<TlsVersion> for SslVersion {
    fn from(version: TlsVersion) -> Self {
        match version {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minor = match self {
            TlsVersion::Tls10 => 0,
            TlsVersion::Tls11 => 1,
            TlsVersion::Tls12 => 2,
            TlsVersion::Tls13 => 3,
        };
        write!(f, "TLS 1.{}", minor)
    }
}

impl FromStr for TlsVersion {
    type Err = TlsError;

    /// Accepts `1.2`, `tls1.2`, `TLSv1.2` and `TLS 1.2`
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let number = lower
            .strip_prefix("tls")
            .map(|rest| rest.trim_start_matches(['v', ' ']))
            .unwrap_or(&lower);

        match number {
            "1" | "1.0" => Ok(TlsVersion::Tls10),
            "1.1" => Ok(TlsVersion::Tls11),
            "1.2" => Ok(TlsVersion::Tls12),
            "1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidConfig(format!("unsupported TLS version '{}'", s))),
        }
    }
}

/// TLS client configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: SslContext,
    pub(crate) servername: Option<String>,
    pub(crate) handshake_timeout: Duration,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// SNI server name sent in the client hello
    pub fn servername(&self) -> Option<&str> {
        self.servername.as_deref()
    }

    /// Upper bound for the whole handshake
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
}

/// Client configuration builder
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
    cipher_list: String,
    servername: Option<String>,
    handshake_timeout: Duration,
}

impl ClientConfigBuilder {
    fn new() -> Self {
        ClientConfigBuilder {
            min_version: Some(TlsVersion::Tls10),
            max_version: None,
            cipher_list: COMPAT_CIPHER_LIST.to_string(),
            servername: None,
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        }
    }

    /// Set TLS version (both min and max)
    pub fn version(mut self, version: TlsVersion) -> Self {
        self.min_version = Some(version);
        self.max_version = Some(version);
        self
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    /// Set cipher list (for TLS <= 1.2)
    pub fn cipher_list(mut self, ciphers: impl Into<String>) -> Self {
        self.cipher_list = ciphers.into();
        self
    }

    /// Set SNI servername
    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<TlsConfig> {
        if let (Some(min), Some(max)) = (self.min_version, self.max_version) {
            if min > max {
                return Err(TlsError::InvalidConfig(format!(
                    "minimum version {} above maximum {}",
                    min, max
                )));
            }
        }
        if self.handshake_timeout.is_zero() {
            return Err(TlsError::InvalidConfig(
                "handshake timeout must be non-zero".to_string(),
            ));
        }

        let mut ctx = SslContextBuilder::new(SslMethod::tls_client())?;
        ctx.set_options(SslOptions::ALL);
        ctx.set_verify(SslVerifyMode::NONE);
        ctx.set_cipher_list(&self.cipher_list)?;
        ctx.set_min_proto_version(self.min_version.map(SslVersion::from))?;
        ctx.set_max_proto_version(self.max_version.map(SslVersion::from))?;

        Ok(TlsConfig {
            ctx: ctx.build(),
            servername: self.servername,
            handshake_timeout: self.handshake_timeout,
        })
    }
}
