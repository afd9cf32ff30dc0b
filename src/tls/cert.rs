//! Certificate inspection and public key extraction
//!
//! This module extracts what the trust policy needs from the peer
//! certificate: the host name it is filed under, the key that gets pinned,
//! the expiration stored beside it and a printable one-line summary.

use super::{Result, TlsError};
use bytes::Bytes;
use openssl::asn1::Asn1Time;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKeyRef, Public};
use openssl::x509::{X509NameRef, X509Ref};
use std::net::IpAddr;

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Full subject distinguished name
    pub subject: String,
    /// Subject common name, if present and non-empty
    pub common_name: Option<String>,
    /// Full issuer distinguished name
    pub issuer: String,
    /// Subject Alternative Names (DNS names and IP addresses)
    pub subject_alt_names: Vec<String>,
    /// Serial number in lowercase hex
    pub serial: String,
    /// Key algorithm and size, e.g. "RSA key 2048 bits"
    pub key: String,
    /// Signature algorithm long name
    pub signature: String,
    pub not_before: String,
    pub not_after: String,
    /// Expiration as UNIX seconds
    pub expiration: i64,
    /// Base64 SHA-256 of the subject public key info
    pub pin_sha256: String,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Result<Self> {
        let pkey = cert.public_key()?;
        let serial = cert.serial_number().to_bn()?.to_hex_str()?.to_lowercase();
        let signature = cert
            .signature_algorithm()
            .object()
            .nid()
            .long_name()
            .unwrap_or("unknown")
            .to_string();
        let pin = openssl::sha::sha256(&pkey.public_key_to_der()?);

        Ok(CertInfo {
            subject: distinguished_name(cert.subject_name()),
            common_name: common_name(cert),
            issuer: distinguished_name(cert.issuer_name()),
            subject_alt_names: subject_alt_names(cert),
            serial,
            key: describe_key(&pkey),
            signature,
            not_before: cert.not_before().to_string(),
            not_after: cert.not_after().to_string(),
            expiration: expiration(cert)?,
            pin_sha256: openssl::base64::encode_block(&pin),
        })
    }

    /// Printable one-line summary, fields separated by commas
    pub fn one_line(&self) -> String {
        format!(
            "subject `{}', issuer `{}', serial 0x{}, {}, signed using {}, activated `{}', expires `{}', pin-sha256=\"{}\"",
            self.subject,
            self.issuer,
            self.serial,
            self.key,
            self.signature,
            self.not_before,
            self.not_after,
            self.pin_sha256
        )
    }
}

/// Subject common name the certificate is filed under
pub fn common_name(cert: &X509Ref) -> Option<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().to_string().ok())
        .filter(|s| !s.is_empty())
}

/// Raw public key compared against the trust store (SubjectPublicKeyInfo DER)
pub fn pinned_key(cert: &X509Ref) -> Result<Vec<u8>> {
    Ok(cert.public_key()?.public_key_to_der()?)
}

/// Certificate expiration as UNIX seconds
pub fn expiration(cert: &X509Ref) -> Result<i64> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(cert.not_after())?;
    Ok(i64::from(diff.days) * 86_400 + i64::from(diff.secs))
}

/// Server RSA key as a PKCS#1 `RSAPublicKey` DER structure
///
/// This is the encoding the network level authentication layer binds its
/// credentials to. Only RSA keys are supported.
pub fn rsa_public_key_pkcs1(cert: &X509Ref) -> Result<Bytes> {
    let pkey = cert.public_key()?;
    if pkey.id() != Id::RSA {
        return Err(TlsError::UnsupportedKey(describe_key(&pkey)));
    }
    let der = pkey.rsa()?.public_key_to_der_pkcs1()?;
    Ok(Bytes::from(der))
}

fn describe_key(pkey: &PKeyRef<Public>) -> String {
    let kind = match pkey.id() {
        Id::RSA => "RSA",
        Id::DSA => "DSA",
        Id::EC => "EC/ECDSA",
        Id::ED25519 => "Ed25519",
        Id::ED448 => "Ed448",
        _ => "unknown",
    };
    format!("{} key {} bits", kind, pkey.bits())
}

fn distinguished_name(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let field = entry.object().nid().short_name().unwrap_or("?");
            let value = entry.data().to_string().unwrap_or_default();
            format!("{}={}", field, value)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn subject_alt_names(cert: &X509Ref) -> Vec<String> {
    let Some(names) = cert.subject_alt_names() else {
        return Vec::new();
    };

    names
        .iter()
        .filter_map(|name| {
            if let Some(dns) = name.dnsname() {
                return Some(format!("DNS:{}", dns));
            }
            let ip = match name.ipaddress()? {
                [a, b, c, d] => IpAddr::from([*a, *b, *c, *d]),
                bytes => IpAddr::from(<[u8; 16]>::try_from(bytes).ok()?),
            };
            Some(format!("IP:{}", ip))
        })
        .collect()
}
