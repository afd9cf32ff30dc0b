//! TCP layer configuration
//!
//! This module provides the configuration builder for connections.

use super::{
    Error, Result, INITIAL_STREAM_CAPACITY, MIN_RECV_BUFFER, SMARTCARD_POOL_SIZE, WRITE_WAIT,
};
use std::time::Duration;

/// TCP layer configuration (immutable after building)
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub(crate) pool_size: usize,
    pub(crate) initial_capacity: usize,
    pub(crate) min_recv_buffer: usize,
    pub(crate) write_wait: Duration,
    pub(crate) connect_timeout: Option<Duration>,
}

impl TransportConfig {
    /// Create a new configuration builder
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::new()
    }

    /// Number of outbound stream slots
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Capacity every stream starts out with
    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    /// Floor applied to SO_RCVBUF
    pub fn min_recv_buffer(&self) -> usize {
        self.min_recv_buffer
    }

    /// Bound of a single wait for writability
    pub fn write_wait(&self) -> Duration {
        self.write_wait
    }

    /// Timeout of a single connect attempt
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            pool_size: 1,
            initial_capacity: INITIAL_STREAM_CAPACITY,
            min_recv_buffer: MIN_RECV_BUFFER,
            write_wait: WRITE_WAIT,
            connect_timeout: None,
        }
    }
}

/// Transport configuration builder
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    fn new() -> Self {
        TransportConfigBuilder {
            config: TransportConfig::default(),
        }
    }

    /// Set the number of outbound stream slots
    pub fn pool_size(mut self, slots: usize) -> Self {
        self.config.pool_size = slots;
        self
    }

    /// Size the outbound pool for smartcard redirection
    ///
    /// The smartcard channel allocates outbound streams interleaved with the
    /// main protocol path, so each producer needs its own slots.
    pub fn smartcard_redirection(mut self, enabled: bool) -> Self {
        self.config.pool_size = if enabled { SMARTCARD_POOL_SIZE } else { 1 };
        self
    }

    /// Set the initial capacity of every stream
    pub fn initial_capacity(mut self, bytes: usize) -> Self {
        self.config.initial_capacity = bytes;
        self
    }

    /// Set the receive buffer floor
    pub fn min_recv_buffer(mut self, bytes: usize) -> Self {
        self.config.min_recv_buffer = bytes;
        self
    }

    /// Set the bound of a single wait for writability
    pub fn write_wait(mut self, wait: Duration) -> Self {
        self.config.write_wait = wait;
        self
    }

    /// Set the timeout of a single connect attempt
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<TransportConfig> {
        if self.config.pool_size == 0 {
            return Err(Error::InvalidConfig(
                "outbound pool needs at least one slot".to_string(),
            ));
        }
        if self.config.write_wait.is_zero() {
            return Err(Error::InvalidConfig("write wait must be non-zero".to_string()));
        }
        Ok(self.config)
    }
}
