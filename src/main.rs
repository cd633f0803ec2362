//! Showgate - Backend-for-Frontend gateway for the competition platform
//!
//! Validates inbound credentials, derives tenant context, enforces route
//! policies, performs per-service token exchange, and proxies to the
//! destination clusters.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use showgate::config::{LogFormat, LogTarget};
use showgate::gateway::claims::CredentialValidator;
use showgate::services::{discovery, ProxyCore, TokenExchangeClient};
use showgate::{build_router, AppConfig, AppState, GatewayPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("Showgate {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration first (before logging, so we know the log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must be kept alive for the duration of the program to ensure
    // log messages are flushed to files
    let _log_guard = init_logging(&config);

    info!("Showgate starting up");

    if config.auth.jwt_secret.is_some() {
        warn!("Validating tokens with a shared secret; use OIDC discovery in production");
    }

    // Resolve provider metadata (token endpoint, signing keys) once at startup
    let metadata = discovery::resolve(&config.identity_provider, &config.auth)
        .await
        .context("Failed to resolve identity provider metadata")?;

    let validator = CredentialValidator::new(metadata.keys, config.auth.expected_audience.clone());

    let any_exchange = config.clusters.values().any(|c| c.audience.is_some());
    let exchange = if any_exchange {
        let token_endpoint = metadata
            .token_endpoint
            .clone()
            .context("Token exchange is configured but no token endpoint could be resolved")?;
        info!("Token exchange enabled via {}", token_endpoint);
        Some(
            TokenExchangeClient::new(&config.identity_provider, token_endpoint)
                .context("Failed to initialize token exchange client")?,
        )
    } else {
        info!("No cluster configures token exchange; original credentials are forwarded");
        None
    };

    info!(
        "Initializing proxy core for {} cluster(s)",
        config.clusters.len()
    );
    let proxy = ProxyCore::new(&config.clusters).context("Failed to initialize proxy core")?;

    let pipeline = GatewayPipeline::new(&config, validator, exchange, proxy);

    let state = AppState {
        config: Arc::new(config),
        pipeline: Arc::new(pipeline),
    };

    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .context("Invalid server host/port")?;

    let router = build_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Showgate shut down");
    Ok(())
}

/// Wait for SIGTERM or ctrl-c
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Initialize logging based on configuration
fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let log_config = &config.logging;

    match log_config.target {
        LogTarget::Console => {
            let registry = tracing_subscriber::registry().with(env_filter);
            match log_config.format {
                LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
                LogFormat::Compact => registry
                    .with(fmt::layer().compact().with_target(false))
                    .init(),
                LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).init(),
            }
            None
        }
        LogTarget::File => {
            let (writer, guard) = file_writer(config);
            let registry = tracing_subscriber::registry().with(env_filter);
            match log_config.format {
                LogFormat::Json => registry
                    .with(fmt::layer().json().with_target(true).with_writer(writer))
                    .init(),
                LogFormat::Compact => registry
                    .with(
                        fmt::layer()
                            .compact()
                            .with_ansi(false)
                            .with_writer(writer),
                    )
                    .init(),
                LogFormat::Pretty => registry
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .init(),
            }
            Some(guard)
        }
        LogTarget::Both => {
            let (writer, guard) = file_writer(config);
            let registry = tracing_subscriber::registry().with(env_filter);
            match log_config.format {
                LogFormat::Json => registry
                    .with(fmt::layer().json().with_target(true))
                    .with(fmt::layer().json().with_target(true).with_writer(writer))
                    .init(),
                LogFormat::Compact => registry
                    .with(fmt::layer().compact().with_target(false))
                    .with(
                        fmt::layer()
                            .compact()
                            .with_ansi(false)
                            .with_writer(writer),
                    )
                    .init(),
                LogFormat::Pretty => registry
                    .with(fmt::layer().with_target(true))
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .init(),
            }
            Some(guard)
        }
    }
}

fn file_writer(
    config: &AppConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    let appender = tracing_appender::rolling::daily(&config.logging.directory, "showgate.log");
    tracing_appender::non_blocking(appender)
}

fn print_help() {
    println!("Showgate {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("    showgate [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -V, --version    Print version information");
    println!();
    println!("ENVIRONMENT:");
    println!("    SHOWGATE_CONFIG           Path to the configuration file");
    println!("    SHOWGATE_HOST             Listen address override");
    println!("    SHOWGATE_PORT             Listen port override");
    println!("    SHOWGATE_CLIENT_SECRET    Identity provider client secret");
    println!("    SHOWGATE_JWT_SECRET       Shared HS256 validation secret (development)");
    println!("    RUST_LOG                  Log level filter");
}
