//! rdp-transport - TCP/TLS transport layer for a Remote Desktop Protocol client
//!
//! This crate owns the raw TCP connection of an RDP session, upgrades it to
//! TLS on demand, moves framed byte buffers in and out, and pins server keys
//! with a trust-on-first-use certificate store.

pub mod net;
pub mod tls;
