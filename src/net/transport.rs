//! Blocking send/receive loops
//!
//! `Transport` moves whole buffers over the current session. Transient
//! conditions are absorbed here and never reach the caller; the first fatal
//! condition sets a sticky error latch after which every operation fails
//! without touching the socket.

use super::session::{CancelToken, ReadinessPoll, SessionOps};
use super::stream::StreamBuffer;
use super::{Error, Result};
use std::io;
use std::time::Duration;
use tracing::{debug, error};

/// Send/receive loop over a plain or TLS session
pub struct Transport {
    session: Option<Box<dyn SessionOps>>,
    failed: bool,
    poll: Option<Box<dyn ReadinessPoll>>,
    cancel: CancelToken,
    write_wait: Duration,
}

impl Transport {
    /// Create a transport over `session`
    ///
    /// `write_wait` bounds each wait for the socket to become writable.
    pub fn new(session: Box<dyn SessionOps>, write_wait: Duration) -> Self {
        Transport {
            session: Some(session),
            failed: false,
            poll: None,
            cancel: CancelToken::new(),
            write_wait,
        }
    }

    /// Whether the error latch is set
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Whether traffic currently goes through TLS
    pub fn is_tls(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_tls())
    }

    /// Install or remove the readiness poll run before socket reads
    pub fn set_readiness_poll(&mut self, poll: Option<Box<dyn ReadinessPoll>>) {
        self.poll = poll;
    }

    /// Replace the exit signal observed after readiness polls
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Switch all further traffic to `session`
    pub(crate) fn upgrade(&mut self, session: Box<dyn SessionOps>) {
        self.session = Some(session);
    }

    /// Set the error latch
    pub(crate) fn latch(&mut self) {
        self.failed = true;
    }

    /// Send the whole of `data`
    ///
    /// Either every byte is handed to the session or the latch is set.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.failed {
            return Err(Error::Latched);
        }
        let write_wait = self.write_wait;
        let session = self.session.as_mut().ok_or(Error::NotConnected)?;

        let mut total = 0;
        while total < data.len() {
            match session.send(&data[total..]) {
                Ok(0) => {
                    session.wait_writable(write_wait);
                }
                Ok(sent) => total += sent,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    session.wait_writable(write_wait);
                }
                Err(e) => {
                    error!(tls = session.is_tls(), sent = total, error = %e, "send failed");
                    self.failed = true;
                    return Err(Error::Network(e));
                }
            }
        }

        Ok(())
    }

    /// Append exactly `length` received bytes to `buf`
    ///
    /// Already buffered bytes and the read cursor are left untouched. Blocks
    /// until the bytes arrived, the exit signal is raised during a readiness
    /// poll, or a fatal error occurs.
    pub fn recv_into(&mut self, buf: &mut StreamBuffer, length: usize) -> Result<()> {
        let Transport {
            session,
            failed,
            poll,
            cancel,
            ..
        } = self;

        if *failed {
            return Err(Error::Latched);
        }
        let session = session.as_mut().ok_or(Error::NotConnected)?;

        buf.reserve(length);
        let mut remaining = length;

        while remaining > 0 {
            if session.pending() == 0 {
                if let Some(poll) = poll.as_mut() {
                    poll.wait(session.handle());
                    if cancel.is_cancelled() {
                        debug!(remaining, "receive cancelled");
                        return Err(Error::Cancelled);
                    }
                }
            }

            let received = match session.recv(buf.spare_mut(remaining)) {
                Ok(0) => {
                    error!(remaining, "connection closed by peer");
                    *failed = true;
                    return Err(Error::ConnectionClosed);
                }
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    0
                }
                Err(e) => {
                    error!(tls = session.is_tls(), error = %e, "recv failed");
                    *failed = true;
                    return Err(Error::Network(e));
                }
            };

            buf.commit(received);
            remaining -= received;
        }

        Ok(())
    }

    /// Close and drop the session
    ///
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                debug!(error = %e, "session close failed");
            }
        }
    }
}
