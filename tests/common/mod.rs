//! Shared helpers for the integration suites
#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::ssl::{SslAcceptor, SslMethod, SslStream};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::net::{TcpListener, TcpStream};
use std::thread;

/// Certificate expiration used by `server_identity`
pub const NOT_AFTER: i64 = 2_000_000_000;

/// Fresh RSA key and a self-signed certificate for `common_name`
pub fn server_identity(common_name: &str) -> (X509, PKey<Private>) {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(1_600_000_000).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(NOT_AFTER).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

pub fn acceptor(cert: &X509, key: &PKey<Private>) -> SslAcceptor {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server()).unwrap();
    acceptor.set_private_key(key).unwrap();
    acceptor.set_certificate(cert).unwrap();
    acceptor.build()
}

/// Accept one plain TCP connection and run `handler` on it
pub fn spawn_server<F>(handler: F) -> (u16, thread::JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        handler(stream);
    });

    (port, handle)
}

/// Accept one connection, complete the TLS handshake and run `handler`
///
/// Handshake failures on the server side end the thread quietly; the
/// client side reports them.
pub fn spawn_tls_server<F>(acceptor: SslAcceptor, handler: F) -> (u16, thread::JoinHandle<()>)
where
    F: FnOnce(SslStream<TcpStream>) + Send + 'static,
{
    spawn_server(move |stream| {
        if let Ok(tls) = acceptor.accept(stream) {
            handler(tls);
        }
    })
}

/// Read until the client goes away
pub fn drain<S: std::io::Read>(mut stream: S) {
    let mut sink = Vec::new();
    let _ = stream.read_to_end(&mut sink);
}
