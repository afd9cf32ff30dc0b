//! Client handshake driver
//!
//! The handshake primitive is driven repeatedly until it reaches a
//! non-transient outcome. Socket timeouts turn a stalled peer into a
//! transient result, and the overall deadline bounds the retries.

use super::config::TlsConfig;
use super::{Result, TlsError};
use openssl::ssl::{HandshakeError, MidHandshakeSslStream, Ssl, SslStream};
use openssl::x509::X509VerifyResult;
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Default handshake timeout
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Run the client side of the handshake over `stream`
///
/// The stream is returned to blocking mode without timeouts on success.
pub(crate) fn client_handshake(
    stream: TcpStream,
    config: &TlsConfig,
) -> Result<SslStream<TcpStream>> {
    let mut ssl = Ssl::new(&config.ctx)?;
    if let Some(ref servername) = config.servername {
        ssl.set_hostname(servername)?;
    }

    let deadline = Instant::now() + config.handshake_timeout;
    set_timeouts(&stream, Some(config.handshake_timeout))?;

    let mut attempt = ssl.connect(stream);
    let stream = loop {
        match attempt {
            Ok(stream) => break stream,
            Err(HandshakeError::WouldBlock(mid)) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    error!("TLS handshake timed out");
                    return Err(TlsError::HandshakeFailed("timed out".to_string()));
                }
                set_timeouts(mid.get_ref(), Some(remaining))?;
                attempt = mid.handshake();
            }
            Err(HandshakeError::Failure(mid)) => return Err(failure(mid)),
            Err(HandshakeError::SetupFailure(stack)) => return Err(stack.into()),
        }
    };

    set_timeouts(stream.get_ref(), None)?;
    debug!(version = stream.ssl().version_str(), "TLS handshake complete");

    Ok(stream)
}

fn set_timeouts(stream: &TcpStream, timeout: Option<Duration>) -> Result<()> {
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    Ok(())
}

fn failure(mid: MidHandshakeSslStream<TcpStream>) -> TlsError {
    let reason = mid.error().to_string();
    let verify_failed = mid.error().ssl_error().is_some_and(|stack| {
        stack
            .errors()
            .iter()
            .any(|e| e.reason() == Some("certificate verify failed"))
    });

    let status = mid.ssl().verify_result();
    if verify_failed && status != X509VerifyResult::OK {
        error!(status = status.error_string(), "certificate verification failed");
        return TlsError::Verification(status.error_string().to_string());
    }

    error!(error = %reason, "TLS handshake failed");
    TlsError::HandshakeFailed(reason)
}
