//! Connect to an RDP server, upgrade to TLS and apply the pinning policy
//!
//! Only the TLS upgrade is exercised; servers that insist on the X.224
//! connection request first will drop the handshake.

use anyhow::{Context, Result};
use clap::Parser;
use rdp_transport::net::{self, TcpLayer, TransportConfig, DEFAULT_RDP_PORT};
use rdp_transport::tls::{FileTrustStore, LinePrompt, TlsConfig, TlsVersion};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rdp-tls-probe", version, about = "Check an RDP server certificate against the pinned keys")]
struct Args {
    /// Server host name
    server: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_RDP_PORT)]
    port: u16,

    /// Product name selecting the certificate directory
    #[arg(long, env = "RDP_TRANSPORT_PRODUCT", default_value = "rdp-transport")]
    product: String,

    /// Lowest TLS version to offer
    #[arg(long, default_value = "TLSv1.0")]
    tls_min: TlsVersion,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rdp_transport={},rdp_tls_probe={}", log_level, log_level).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn probe(args: &Args) -> std::result::Result<(), net::Error> {
    let config = TransportConfig::builder()
        .connect_timeout(Duration::from_secs(args.timeout))
        .build()?;
    let tls = TlsConfig::client()
        .version_range(args.tls_min, TlsVersion::Tls13)
        .servername(args.server.clone())
        .build()?;
    let trust = FileTrustStore::from_env(&args.product)?;
    info!(dir = %trust.dir().display(), "using certificate directory");

    let mut tcp = TcpLayer::new(config);
    let conn = tcp.connect(&args.server, args.port)?;
    let decision = conn.start_tls(&tls, &trust, &mut LinePrompt::stdio())?;

    if let Some(session) = conn.session_info() {
        println!("session: {}", session);
    }
    println!("certificate: {:?}", decision);

    match conn.server_public_key() {
        Ok(key) => println!("server key: {} bytes PKCS#1", key.len()),
        Err(e) => println!("server key: {}", e),
    }

    tcp.disconnect();
    Ok(())
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    match probe(&args) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(net::Error::Tls(e)) if e.requires_exit() => {
            error!(error = %e, "certificate check failed");
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e).with_context(|| format!("probe of {}:{} failed", args.server, args.port)),
    }
}
