//! Certificate acceptance policy
//!
//! The three-way trust decision taken once a handshake completed:
//!
//! - unknown host: pin the key and accept
//! - known host, same key: accept silently
//! - known host, different key: ask the user, re-pin on "yes"

use super::cert::{self, CertInfo};
use super::trust::{TrustDb, Verdict};
use super::{Result, TlsError};
use openssl::x509::X509Ref;
use std::io::{self, BufRead, StdinLock, Stdout, Write};
use tracing::{debug, error, info, warn};

/// Answer given to the trust prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

/// Interactive yes/no question shown on a key mismatch
///
/// `None` means no answer could be obtained and counts as a refusal.
pub trait TrustPrompt {
    fn choose(&mut self, message: &str) -> Option<Answer>;
}

impl<F: FnMut(&str) -> Option<Answer>> TrustPrompt for F {
    fn choose(&mut self, message: &str) -> Option<Answer> {
        self(message)
    }
}

/// Trust prompt on a line-oriented terminal
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl LinePrompt<StdinLock<'static>, Stdout> {
    /// Prompt on standard input and output
    pub fn stdio() -> Self {
        LinePrompt::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        LinePrompt { input, output }
    }

    fn ask(&mut self, text: &str) -> io::Result<Option<Answer>> {
        write!(self.output, "{}", text)?;
        self.output.flush()?;

        loop {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }

            match line.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" => return Ok(Some(Answer::Yes)),
                "no" | "n" => return Ok(Some(Answer::No)),
                _ => {
                    write!(self.output, "Please answer yes or no: ")?;
                    self.output.flush()?;
                }
            }
        }
    }
}

impl<R: BufRead, W: Write> TrustPrompt for LinePrompt<R, W> {
    fn choose(&mut self, message: &str) -> Option<Answer> {
        match self.ask(message) {
            Ok(answer) => answer,
            Err(e) => {
                debug!(error = %e, "trust prompt failed");
                None
            }
        }
    }
}

/// How a peer certificate was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First contact, the key is now pinned
    Pinned,
    /// The pinned key matched
    Known,
    /// The user accepted a changed key, which replaced the pinned one
    Replaced,
}

/// Applies the pinning rules against a trust database
pub struct CertPolicy<'a, D: ?Sized, P: ?Sized> {
    trust: &'a D,
    prompt: &'a mut P,
}

impl<'a, D, P> CertPolicy<'a, D, P>
where
    D: TrustDb + ?Sized,
    P: TrustPrompt + ?Sized,
{
    pub fn new(trust: &'a D, prompt: &'a mut P) -> Self {
        CertPolicy { trust, prompt }
    }

    /// Accept or reject the peer certificate
    ///
    /// Rejection and trust-store failures are errors that require the
    /// client to stop, see `TlsError::requires_exit`.
    pub fn evaluate(&mut self, cert: &X509Ref) -> Result<Decision> {
        let host = cert::common_name(cert).ok_or_else(|| {
            TlsError::Certificate("peer certificate has no subject common name".to_string())
        })?;
        let key = cert::pinned_key(cert)?;

        match self.trust.verify(&host, &key)? {
            Verdict::Unknown => {
                self.trust.store(&host, &key, cert::expiration(cert)?)?;
                info!(host = %host, "pinned certificate of new host");
                Ok(Decision::Pinned)
            }
            Verdict::Matches => {
                debug!(host = %host, "certificate matches pinned key");
                Ok(Decision::Known)
            }
            Verdict::Mismatch => {
                warn!(host = %host, "certificate does not match pinned key");
                match self.prompt.choose(&mismatch_message(&host, cert)) {
                    Some(Answer::Yes) => {
                        self.trust.store(&host, &key, cert::expiration(cert)?)?;
                        info!(host = %host, "pinned key replaced");
                        Ok(Decision::Replaced)
                    }
                    _ => {
                        error!(host = %host, "certificate rejected");
                        Err(TlsError::CertificateRejected(host))
                    }
                }
            }
        }
    }
}

/// Question shown when a known host presents another key
pub fn mismatch_message(host: &str, cert: &X509Ref) -> String {
    format!(
        "Host '{}' is known but has another key associated with it,\n\
         review the following certificate info:\n\n {}\n\n\
         Do you trust this certificate (yes/no)? ",
        host,
        certificate_summary(CertInfo::from_x509(cert))
    )
}

fn certificate_summary(info: Result<CertInfo>) -> String {
    match info {
        Ok(info) => info.one_line().replace(',', "\n"),
        Err(e) => {
            error!(error = %e, "failed to print the certificate");
            "The client failed to parse the certificate and therefore cannot \
             display its information for you to inspect the change."
                .to_string()
        }
    }
}
