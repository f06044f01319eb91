//! Session-aware API gateway
//!
//! Terminates client HTTP traffic, keeps the session in cookies, guards
//! mutating calls with CSRF tokens and forwards everything else to the
//! backend API, refreshing expired credentials on the way.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request-id / trace / timeout / compression
//!                         → metrics → CORS → CSRF guard → defaults
//!                         → handler (captcha, cookies, redirects)
//!                         → forwarder ──▶ backend API
//!                                 │ 401
//!                                 └──▶ POST /auth/refresh → re-send once
//!
//!     Cross-cutting: config (TOML + env), Redis token store,
//!     tracing, Prometheus metrics, graceful shutdown
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::{load_config, GatewayConfig};
use api_gateway::http::{GatewayServer, ServerSettings};
use api_gateway::lifecycle::{spawn_signal_listener, startup::build_app_state, Shutdown};
use api_gateway::net::load_tls_config;
use api_gateway::observability::{init_logging, init_metrics, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "api-gateway", version, about = "Session-aware API gateway")]
struct Args {
    /// Optional TOML config file; environment variables override it
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_format)?;

    tracing::info!("api-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Invalid configuration");
            return Err(err.into());
        }
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        api_url = %config.backend.api_url,
        csrf_enabled = config.csrf.enabled,
        tls_enabled = config.listener.tls.enabled,
        compress = config.listener.compress,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(err) = init_metrics(addr) {
                    tracing::error!(error = %err, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = match build_app_state(&config).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "Startup failed");
            return Err(err.into());
        }
    };

    let server = GatewayServer::new(state, &ServerSettings::from_config(&config));

    let shutdown = Arc::new(Shutdown::new());
    let stopped = shutdown.wait();
    spawn_signal_listener(shutdown);

    let tls = &config.listener.tls;
    if tls.enabled {
        let addr: SocketAddr = config.listener.bind_address.parse()?;
        let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
        server.run_tls(addr, rustls, stopped).await?;
    } else {
        let listener = TcpListener::bind(&config.listener.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Listening for connections");
        server.run(listener, stopped).await?;
    }
    Ok(())
}
