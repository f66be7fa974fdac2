//! trace-proxy
//!
//! A forward HTTP proxy built with Tokio and Axum that records per-request
//! network phase timings and ships them as structured log events.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ net::transport ──▶ Upstream
//!                    │                 │ phase hooks
//!                    │                 ▼
//!                    │           trace::TraceContext
//!                    ▼
//!              event::LogEvent ──▶ pipeline::Dispatcher
//!                                      ├──▶ [buffer] ──▶ console sink (stdout)
//!                                      └──▶ [buffer] ──▶ queue sink (Kafka)
//!
//!     SIGINT/SIGTERM/SIGQUIT ──▶ ShutdownCoordinator
//!         drain + flush each sink in order ──▶ stop listener ──▶ exit
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;

use trace_proxy::config::{load_config, ConfigError, Overrides, ProxyConfig};
use trace_proxy::lifecycle::{signals, Shutdown};
use trace_proxy::net::tls::load_tls_config;
use trace_proxy::observability::{logging, metrics};
use trace_proxy::{Pipeline, ProxyServer};

#[derive(Debug, Parser)]
#[command(
    name = "trace-proxy",
    version,
    about = "Forward HTTP proxy that logs network phase latencies per request"
)]
struct Cli {
    /// Source name stamped on every log event.
    name: Option<String>,

    /// Proxy listen address, overrides `listener.bind_address` (`:3210` binds all interfaces).
    #[arg(long)]
    addr: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Make the operation more talkative.
    #[arg(short, long)]
    verbose: bool,
}

fn resolve_config(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let overrides = Overrides {
        name: cli.name.clone(),
        bind_address: cli.addr.clone(),
    };
    load_config(cli.config.as_deref(), &overrides)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => {
            logging::init_logging(&config.observability.log_level, cli.verbose);
            config
        }
        Err(e) => {
            logging::init_logging("info", cli.verbose);
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("trace-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        name = %config.name,
        bind_address = %config.listener.bind_address,
        buffer_capacity = config.pipeline.buffer_capacity,
        backpressure = ?config.pipeline.backpressure,
        "Configuration loaded"
    );

    let tls = match &config.listener.tls {
        Some(tls) => match load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await {
            Ok(tls) => Some(tls),
            Err(e) => {
                tracing::error!(error = %e, "Unable to load certificate");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let pipeline = match Pipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create queue sink");
            return ExitCode::FAILURE;
        }
    };

    let server = match ProxyServer::new(config.clone(), pipeline.dispatcher()) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create proxy server");
            return ExitCode::FAILURE;
        }
    };

    let listener = match TcpListener::bind(&config.listener.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %config.listener.bind_address, error = %e, "Failed to bind listener");
            return ExitCode::FAILURE;
        }
    };
    let sinks: Vec<&str> = pipeline.sinks().iter().map(|s| s.name()).collect();
    match listener.local_addr() {
        Ok(addr) => tracing::info!(address = %addr, sinks = ?sinks, "Listening for connections"),
        Err(e) => tracing::warn!(error = %e, "Listener has no local address"),
    }

    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, tls, shutdown.subscribe()));

    let mut failed = false;
    tokio::select! {
        _ = signals::wait_for_termination() => {}
        result = &mut server_task => {
            tracing::error!(result = ?result, "Proxy server stopped unexpectedly");
            failed = true;
        }
    }

    let report = pipeline.shutdown(&shutdown).await;

    if !failed {
        let grace = Duration::from_secs(config.timeouts.shutdown_secs);
        match tokio::time::timeout(grace, server_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                tracing::error!(error = %e, "Shutdown error");
                failed = true;
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Proxy server task panicked");
                failed = true;
            }
            Err(_) => {
                tracing::error!(timeout = ?grace, "Shutdown error: listener did not stop in time");
                failed = true;
            }
        }
    }

    tracing::info!(
        flushed = report.completed,
        failed = report.failed,
        "Shutdown complete"
    );
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
