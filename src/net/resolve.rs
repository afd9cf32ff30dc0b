//! Address resolution and the reconnect address cache
//!
//! A terminal server farm name is usually a round-robin DNS entry. Looking
//! it up again on reconnect risks landing on a different farm member, so the
//! address that last accepted a connection is kept and reused for as long as
//! the client asks for the same name.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// Turns a host name into candidate socket addresses
pub trait Resolver {
    /// Resolve `host`, returning candidates in preference order
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the platform's name service
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {}", host),
            ));
        }
        Ok(addrs)
    }
}

/// Host name and the address that accepted the last connection to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAddress {
    pub host: String,
    pub addr: SocketAddr,
}

/// Single-entry cache of the last successfully connected address
#[derive(Debug, Default)]
pub struct AddressCache {
    entry: Option<CachedAddress>,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached address for `host` with `port` applied
    ///
    /// Only an exact string match of the host name hits.
    pub fn lookup(&self, host: &str, port: u16) -> Option<SocketAddr> {
        self.entry
            .as_ref()
            .filter(|entry| entry.host == host)
            .map(|entry| {
                let mut addr = entry.addr;
                addr.set_port(port);
                addr
            })
    }

    /// Replace the cached entry
    pub fn commit(&mut self, host: &str, addr: SocketAddr) {
        match &mut self.entry {
            Some(entry) if entry.host == host => entry.addr = addr,
            entry => {
                *entry = Some(CachedAddress {
                    host: host.to_string(),
                    addr,
                })
            }
        }
    }

    pub fn get(&self) -> Option<&CachedAddress> {
        self.entry.as_ref()
    }
}
