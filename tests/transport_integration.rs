//! TCP layer integration tests
//!
//! These tests drive `TcpLayer` against loopback servers:
//! - address resolution and the reconnect cache
//! - candidate fallback and connect failures
//! - large sends and chunked receives
//! - peer close mid-receive and the error latch
//! - readiness polls and cancellation

mod common;

use bytes::Buf;
use rdp_transport::net::{
    CancelToken, Error, Resolver, SocketHandle, TcpLayer, TransportConfig,
};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Resolver returning fixed candidates and counting lookups
#[derive(Clone)]
struct StubResolver {
    candidates: Vec<SocketAddr>,
    lookups: Arc<AtomicUsize>,
}

impl StubResolver {
    fn new(candidates: Vec<SocketAddr>) -> Self {
        StubResolver {
            candidates,
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Resolver for StubResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.candidates.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown host {}", host),
            ));
        }
        Ok(self
            .candidates
            .iter()
            .map(|addr| match addr.port() {
                0 => SocketAddr::new(addr.ip(), port),
                _ => *addr,
            })
            .collect())
    }
}

/// Port nobody listens on
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_same_host_resolved_once() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let resolver = StubResolver::new(vec!["127.0.0.1:0".parse().unwrap()]);
    let mut tcp = TcpLayer::with_resolver(TransportConfig::default(), resolver.clone());

    tcp.connect("farm", port).unwrap();
    tcp.disconnect();
    tcp.connect("farm", port).unwrap();
    tcp.disconnect();

    assert_eq!(resolver.lookups(), 1);
    let cached = tcp.cached_address().unwrap();
    assert_eq!(cached.host, "farm");
    assert_eq!(cached.addr, SocketAddr::new("127.0.0.1".parse().unwrap(), port));

    // Another name replaces the cache entry
    tcp.connect("farm.example.com", port).unwrap();
    tcp.disconnect();
    assert_eq!(resolver.lookups(), 2);
    assert_eq!(tcp.cached_address().unwrap().host, "farm.example.com");

    tcp.connect("farm", port).unwrap();
    assert_eq!(resolver.lookups(), 3);
}

#[test]
fn test_candidates_tried_in_order() {
    let dead = SocketAddr::new("127.0.0.1".parse().unwrap(), closed_port());
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let live = listener.local_addr().unwrap();

    let resolver = StubResolver::new(vec![dead, live]);
    let mut tcp = TcpLayer::with_resolver(TransportConfig::default(), resolver);

    let conn = tcp.connect("farm", live.port()).unwrap();
    assert_eq!(conn.peer_addr(), live);
    assert_eq!(tcp.cached_address().unwrap().addr, live);
}

#[test]
fn test_resolution_failure() {
    let resolver = StubResolver::new(Vec::new());
    let mut tcp = TcpLayer::with_resolver(TransportConfig::default(), resolver);

    let err = tcp.connect("nowhere", 3389).err().unwrap();
    assert!(matches!(err, Error::Resolution { ref host, .. } if host == "nowhere"));
    assert!(err.is_retryable());
    assert!(tcp.cached_address().is_none());
}

#[test]
fn test_connect_failure_names_host() {
    let port = closed_port();
    let resolver = StubResolver::new(vec!["127.0.0.1:0".parse().unwrap()]);
    let mut tcp = TcpLayer::with_resolver(TransportConfig::default(), resolver);

    let err = tcp.connect("farm", port).err().unwrap();
    assert!(matches!(err, Error::Connect { .. }));
    assert!(err.to_string().contains("farm"));
    assert!(tcp.cached_address().is_none());
    assert!(tcp.connection().is_none());
}

#[test]
fn test_large_send_completes() {
    const TOTAL: usize = 4 * 1024 * 1024;

    let (port, server) = common::spawn_server(|mut stream| {
        // Slow reader so the client hits a full socket buffer
        thread::sleep(Duration::from_millis(200));
        let mut received = 0usize;
        let mut checksum = 0u64;
        let mut buf = [0u8; 8192];
        while received < TOTAL {
            let n = stream.read(&mut buf).unwrap();
            assert!(n > 0);
            checksum += buf[..n].iter().map(|&b| b as u64).sum::<u64>();
            received += n;
        }
        stream.write_all(&checksum.to_be_bytes()).unwrap();
    });

    let mut tcp = TcpLayer::new(TransportConfig::default());
    let conn = tcp.connect("127.0.0.1", port).unwrap();

    let mut out = conn.acquire_outbound(TOTAL).unwrap();
    for i in 0..TOTAL {
        out.put_u8((i % 251) as u8);
    }
    let expected: u64 = out.as_slice().iter().map(|&b| b as u64).sum();
    conn.send(&out).unwrap();
    drop(out);

    let mut reply = conn.recv(8).unwrap();
    assert_eq!(reply.get_u64(), expected);

    drop(reply);
    tcp.disconnect();
    server.join().unwrap();
}

#[test]
fn test_chunked_receive() {
    let (port, server) = common::spawn_server(|mut stream| {
        for chunk in [&b"\x03\x00"[..], b"\x00\x0a", b"ab", b"cdef"] {
            stream.write_all(chunk).unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        common::drain(stream);
    });

    let mut tcp = TcpLayer::new(TransportConfig::default());
    let conn = tcp.connect("127.0.0.1", port).unwrap();

    let polls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&polls);
    conn.set_readiness_poll(Some(Box::new(move |_socket: SocketHandle| {
        counter.fetch_add(1, Ordering::SeqCst);
    })));

    let mut inbound = conn.recv(4).unwrap();
    assert_eq!(inbound.get_u16(), 0x0300);
    let length = inbound.get_u16() as usize;
    conn.recv_append(&mut inbound, length - 4).unwrap();

    assert_eq!(inbound.as_slice(), b"\x03\x00\x00\x0aabcdef");
    assert_eq!(inbound.unread(), b"abcdef");
    assert!(polls.load(Ordering::SeqCst) >= 2);

    drop(inbound);
    tcp.disconnect();
    server.join().unwrap();
}

#[test]
fn test_peer_close_mid_receive_latches() {
    let (port, server) = common::spawn_server(|mut stream| {
        stream.write_all(b"\x03\x00").unwrap();
    });

    let mut tcp = TcpLayer::new(TransportConfig::default());
    let conn = tcp.connect("127.0.0.1", port).unwrap();
    server.join().unwrap();

    let err = conn.recv(4).err().unwrap();
    assert!(matches!(err, Error::ConnectionClosed));
    assert!(conn.is_failed());

    // Latched: no further I/O is attempted
    assert!(matches!(conn.recv(1).err().unwrap(), Error::Latched));
    let mut out = conn.acquire_outbound(1).unwrap();
    out.put_u8(0);
    assert!(matches!(conn.send(&out), Err(Error::Latched)));
    drop(out);

    // A fresh connect clears the latch
    tcp.disconnect();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let conn = tcp
        .connect("127.0.0.1", listener.local_addr().unwrap().port())
        .unwrap();
    assert!(!conn.is_failed());
}

#[test]
fn test_cancel_from_readiness_poll() {
    let (port, server) = common::spawn_server(common::drain);

    let mut tcp = TcpLayer::new(TransportConfig::default());
    let conn = tcp.connect("127.0.0.1", port).unwrap();

    let token = CancelToken::new();
    conn.set_cancel_token(token.clone());
    conn.set_readiness_poll(Some(Box::new(move |_socket: SocketHandle| token.cancel())));

    let err = conn.recv(4).err().unwrap();
    assert!(matches!(err, Error::Cancelled));
    assert!(!conn.is_failed());

    // Sending is unaffected
    let mut out = conn.acquire_outbound(2).unwrap();
    out.put_u16_le(0xbeef);
    conn.send(&out).unwrap();
    drop(out);

    tcp.disconnect();
    server.join().unwrap();
}

#[test]
fn test_outbound_rotation_with_smartcard_pool() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = TransportConfig::builder()
        .smartcard_redirection(true)
        .build()
        .unwrap();
    let mut tcp = TcpLayer::new(config);
    let conn = tcp.connect("127.0.0.1", port).unwrap();

    let held: Vec<_> = (0..8).map(|_| conn.acquire_outbound(16).unwrap()).collect();
    assert!(matches!(conn.acquire_outbound(16), Err(Error::PoolExhausted(8))));
    drop(held);
    assert!(conn.acquire_outbound(16).is_ok());
}
