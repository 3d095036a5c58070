//! memdproxy - scriptable man-in-the-middle proxy for the Couchbase
//! memcached binary protocol.
//!
//! Sits between a protocol client and server, reads framed packets in both
//! directions, and hands each one to a user-supplied Lua script that can
//! forward, rewrite, answer, or drop it.

use clap::Parser;
use memdproxy_script::ScriptHost;
use memdproxy_server::{Proxy, ProxyConfig};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memdproxy")]
#[command(about = "Scriptable man-in-the-middle proxy for the Couchbase memcached binary protocol")]
#[command(version)]
struct Cli {
    /// Backend host to proxy to
    #[arg(long, default_value = "127.0.0.1")]
    backend_host: String,

    /// Backend port to proxy to
    #[arg(long, default_value_t = 11210)]
    backend_port: u16,

    /// Port to listen on
    #[arg(long, default_value_t = 11210)]
    listen_port: u16,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Use the multi-line pretty log format
    #[arg(long)]
    log_pretty: bool,

    /// Path to the packet script
    script_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    if cli.log_pretty {
        tracing_subscriber::fmt().with_env_filter(filter).pretty().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let source = match std::fs::read_to_string(&cli.script_path) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("Failed to read script {}: {}", cli.script_path.display(), e);
            return Err(e.into());
        }
    };
    let script_name = cli
        .script_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.script_path.display().to_string());
    let script = match ScriptHost::load(script_name, source) {
        Ok(script) => script,
        Err(e) => {
            tracing::error!("Failed to load script: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Loaded script {}", script.name());

    if cli.backend_port == cli.listen_port && host_is_loopback(&cli.backend_host).await {
        tracing::warn!(
            "backend-port and listen-port are the same and backend-host is loopback - possible infinite routing loop"
        );
    }

    let config = ProxyConfig::new()
        .with_backend(cli.backend_host, cli.backend_port)
        .with_listen_port(cli.listen_port);
    let proxy = Arc::new(Proxy::bind(config, script).await?);

    let shutdown = proxy.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping proxy...");
        shutdown.shutdown();
    });

    proxy.run().await?;
    tracing::info!("Proxy stopped");
    Ok(())
}

/// Whether the host names this machine, resolving through DNS when it is
/// not a literal address.
async fn host_is_loopback(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback();
    }
    match tokio::net::lookup_host((host, 0u16)).await {
        Ok(mut addrs) => addrs.any(|addr| addr.ip().is_loopback()),
        Err(_) => false,
    }
}
