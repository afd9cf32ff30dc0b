//! Connection establishment and the live connection
//!
//! `TcpLayer` is the connection context of the client: it owns the address
//! cache and at most one live `Connection`. A `Connection` owns the socket,
//! the transport running over it (plain or TLS) and the stream pool.

use super::config::TransportConfig;
use super::pool::{StreamGuard, StreamPool};
use super::resolve::{AddressCache, CachedAddress, Resolver, SystemResolver};
use super::session::{CancelToken, PlainSession, ReadinessPoll};
use super::socket;
use super::stream::StreamBuffer;
use super::transport::Transport;
use super::{Error, Result};
use crate::tls::{self, CertPolicy, Decision, SessionInfo, TlsConfig, TlsError, TlsSession, TrustDb, TrustPrompt};
use bytes::Bytes;
use openssl::x509::X509;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use tracing::{debug, info};

/// Live connection to an RDP server
pub struct Connection {
    host: String,
    peer: SocketAddr,
    socket: Option<TcpStream>,
    transport: Transport,
    pool: Arc<StreamPool>,
    peer_cert: Option<X509>,
    tls_info: Option<SessionInfo>,
}

impl Connection {
    fn establish(
        host: &str,
        peer: SocketAddr,
        stream: TcpStream,
        config: &TransportConfig,
    ) -> Result<Self> {
        socket::apply_options(&stream, config.min_recv_buffer);
        let plain = PlainSession::new(stream.try_clone()?);

        Ok(Connection {
            host: host.to_string(),
            peer,
            socket: Some(stream),
            transport: Transport::new(Box::new(plain), config.write_wait),
            pool: Arc::new(StreamPool::new(config.pool_size, config.initial_capacity)),
            peer_cert: None,
            tls_info: None,
        })
    }

    /// Host name the connection was opened for
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address of the socket
    pub fn local_address(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Whether the socket still has a peer attached
    pub fn is_connected(&self) -> bool {
        self.socket.as_ref().is_some_and(|s| s.peer_addr().is_ok())
    }

    /// Whether a fatal condition latched the connection
    pub fn is_failed(&self) -> bool {
        self.transport.is_failed()
    }

    pub fn is_tls(&self) -> bool {
        self.transport.is_tls()
    }

    /// Stream pool backing this connection
    pub fn pool(&self) -> Arc<StreamPool> {
        Arc::clone(&self.pool)
    }

    /// Next outbound stream, see `StreamPool::acquire_outbound`
    pub fn acquire_outbound(&self, min_capacity: usize) -> Result<StreamGuard> {
        self.pool.acquire_outbound(min_capacity)
    }

    /// Send every written byte of `stream`
    pub fn send(&mut self, stream: &StreamBuffer) -> Result<()> {
        self.transport.send(stream.as_slice())
    }

    /// Receive exactly `length` bytes into the emptied inbound stream
    pub fn recv(&mut self, length: usize) -> Result<StreamGuard> {
        let mut inbound = self.pool.fresh_inbound(length)?;
        self.transport.recv_into(&mut inbound, length)?;
        Ok(inbound)
    }

    /// Append exactly `length` received bytes to `stream`
    ///
    /// Content and cursors already in `stream` are preserved.
    pub fn recv_append(&mut self, stream: &mut StreamBuffer, length: usize) -> Result<()> {
        self.transport.recv_into(stream, length)
    }

    /// Run `poll` before every socket read, or stop doing so with `None`
    pub fn set_readiness_poll(&mut self, poll: Option<Box<dyn ReadinessPoll>>) {
        self.transport.set_readiness_poll(poll);
    }

    /// Exit signal observed after readiness polls
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.transport.set_cancel_token(token);
    }

    /// Empty every pooled stream, e.g. before following a redirection
    pub fn reset_state(&self) {
        self.pool.reset_all();
    }

    /// Upgrade the connection to TLS and apply the pinning policy
    ///
    /// Any failure latches the connection. Errors for which
    /// `TlsError::requires_exit` holds must end the client.
    pub fn start_tls<D, P>(&mut self, config: &TlsConfig, trust: &D, prompt: &mut P) -> Result<Decision>
    where
        D: TrustDb + ?Sized,
        P: TrustPrompt + ?Sized,
    {
        if self.transport.is_failed() {
            return Err(Error::Latched);
        }
        if self.transport.is_tls() {
            return Err(TlsError::InvalidConfig("TLS is already active".to_string()).into());
        }

        match self.negotiate(config, trust, prompt) {
            Ok((session, cert, decision)) => {
                self.tls_info = Some(session.info());
                self.peer_cert = Some(cert);
                self.transport.upgrade(Box::new(session));
                Ok(decision)
            }
            Err(e) => {
                self.transport.latch();
                Err(e)
            }
        }
    }

    fn negotiate<D, P>(
        &self,
        config: &TlsConfig,
        trust: &D,
        prompt: &mut P,
    ) -> Result<(TlsSession, X509, Decision)>
    where
        D: TrustDb + ?Sized,
        P: TrustPrompt + ?Sized,
    {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;
        let session = TlsSession::connect(socket.try_clone()?, config)?;

        let cert = session
            .peer_certificate()
            .ok_or_else(|| TlsError::Certificate("server sent no certificate".to_string()))?;
        let decision = CertPolicy::new(trust, prompt).evaluate(&cert)?;
        info!(host = %self.host, ?decision, "server certificate accepted");

        Ok((session, cert, decision))
    }

    /// Server RSA public key as PKCS#1 DER, for network level authentication
    pub fn server_public_key(&self) -> Result<Bytes> {
        let cert = self
            .peer_cert
            .as_ref()
            .ok_or_else(|| TlsError::Certificate("no TLS session established".to_string()))?;
        Ok(tls::cert::rsa_public_key_pkcs1(cert)?)
    }

    /// Negotiated TLS parameters, once upgraded
    pub fn session_info(&self) -> Option<&SessionInfo> {
        self.tls_info.as_ref()
    }

    /// Tear the connection down
    ///
    /// Sends TLS close-notify and drops the session, closes the socket and
    /// frees the stream buffers. Safe to call more than once.
    pub fn disconnect(&mut self) {
        self.transport.close();
        self.tls_info = None;

        if let Some(socket) = self.socket.take() {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                debug!(host = %self.host, error = %e, "socket shutdown failed");
            }
            debug!(host = %self.host, addr = %self.peer, "disconnected");
        }

        self.pool.release();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Connection context: address cache plus the single live connection
pub struct TcpLayer<R: Resolver = SystemResolver> {
    config: TransportConfig,
    resolver: R,
    cache: AddressCache,
    live: Option<Connection>,
}

impl TcpLayer<SystemResolver> {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_resolver(config, SystemResolver)
    }
}

impl<R: Resolver> TcpLayer<R> {
    /// Create a connection context resolving names through `resolver`
    pub fn with_resolver(config: TransportConfig, resolver: R) -> Self {
        TcpLayer {
            config,
            resolver,
            cache: AddressCache::new(),
            live: None,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Connect to `host`
    ///
    /// The cached address is reused when `host` equals the previously
    /// connected name; otherwise the name is resolved and every candidate
    /// tried in order. The cache only changes once a candidate accepted.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<&mut Connection> {
        if self.live.as_ref().is_some_and(|conn| conn.socket.is_some()) {
            return Err(Error::AlreadyConnected);
        }
        // Possibly torn down through `Connection::disconnect`
        self.live = None;

        let candidates = match self.cache.lookup(host, port) {
            Some(addr) => {
                debug!(host, %addr, "using cached address");
                vec![addr]
            }
            None => self
                .resolver
                .resolve(host, port)
                .map_err(|source| Error::Resolution {
                    host: host.to_string(),
                    source,
                })?,
        };

        let mut last_error = None;
        for addr in candidates {
            debug!(host, %addr, "trying");
            match socket::connect(&addr, &self.config) {
                Ok(stream) => {
                    let conn = Connection::establish(host, addr, stream, &self.config)?;
                    self.cache.commit(host, addr);
                    info!(host, %addr, "connected");
                    return Ok(self.live.insert(conn));
                }
                Err(e) => {
                    debug!(host, %addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::Connect {
            host: host.to_string(),
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no candidate addresses")),
        })
    }

    /// The live connection, if any
    pub fn connection(&mut self) -> Option<&mut Connection> {
        self.live.as_mut()
    }

    pub fn is_connected(&self) -> bool {
        self.live.as_ref().is_some_and(Connection::is_connected)
    }

    /// Tear down the live connection; a no-op without one
    pub fn disconnect(&mut self) {
        if let Some(mut conn) = self.live.take() {
            conn.disconnect();
        }
    }

    /// Address reused for the next connect to the same host
    pub fn cached_address(&self) -> Option<&CachedAddress> {
        self.cache.get()
    }
}
