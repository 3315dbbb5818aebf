use std::future::IntoFuture;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use darkroom_server::api::{AppState, router};
use darkroom_server::config::DarkroomConfig;

/// Darkroom media gateway HTTP server.
#[derive(Parser, Debug)]
#[command(name = "darkroom-server", about = "Authenticated gateway in front of a photo library")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "darkroom.toml")]
    config: PathBuf,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = DarkroomConfig::load(&cli.config)?;
    config.apply_env();

    // After config load so the OTLP settings are known, before any event.
    let telemetry_guard = darkroom_server::telemetry::init(&config.telemetry);

    if !cli.config.exists() {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    warn_on_missing_secrets(&config);

    let state = AppState::from_config(&config)?;
    let app = router(state);

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        address = %addr,
        upstream = %config.upstream.url,
        auth_mode = config.auth.mode.as_str(),
        "darkroom-server listening"
    );

    // In-flight requests get `shutdown_timeout_seconds` to finish once a
    // signal arrives.
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    tokio::select! {
        result = serve => result?,
        () = drain_deadline(shutdown_timeout) => {
            warn!(
                timeout_secs = config.server.shutdown_timeout_seconds,
                "shutdown timeout exceeded, dropping in-flight requests"
            );
        }
    }

    telemetry_guard.shutdown();

    info!("darkroom-server shut down");
    Ok(())
}

/// Secrets are optional at startup; each operation that needs one fails on
/// its own. Say so once here rather than at the first failing request.
fn warn_on_missing_secrets(config: &DarkroomConfig) {
    let gateway = config.gateway_config();
    if !config.token_codec().is_configured() {
        warn!("no signing secret set: share links and operator sessions are disabled");
    }
    if gateway.api_key().is_none() {
        warn!("no service API key set: uploads and api_key auth mode will fail");
    }
    if gateway.share_api_key().is_none() {
        warn!("no share API key set: token-gated share endpoints will fail");
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}

/// Resolves `timeout` after the first shutdown signal. Never resolves before.
async fn drain_deadline(timeout: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(timeout).await;
}
