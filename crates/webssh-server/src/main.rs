//! Web server with an xterm.js terminal bridged to a remote SSH shell.
//!
//! Run with: cargo run -p webssh-server -- --config webssh.toml
//!
//! Then open http://localhost:8088 in your browser.

mod config;
mod connector;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{Router, response::Html, routing::get};
use clap::Parser;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webssh_bridge::BridgeRegistry;
use webssh_transport::websocket::create_ws_router;

use crate::{config::ServerConfig, connector::SshConnector};

#[derive(Parser)]
#[command(name = "webssh", about = "Browser terminal bridged to a remote SSH shell")]
struct Args {
    /// Configuration file.
    #[arg(short, long, default_value = "webssh.toml")]
    config: PathBuf,

    /// Address to listen on, overriding the configuration file.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Password or key passphrase, overriding the configuration file.
    #[arg(long, env = "WEBSSH_SECRET", hide_env_values = true)]
    secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::load(&args.config)?;
    config.apply_overrides(args.listen, args.secret);

    let remote = config.remote_session()?;
    tracing::info!(
        host = %remote.host,
        port = remote.port,
        user = %remote.user,
        auth_mode = ?remote.auth_mode,
        "Remote target configured"
    );

    let registry = BridgeRegistry::new();
    let connector = Arc::new(SshConnector::new(remote));

    // Build router
    let app = Router::new()
        .route("/", get(index_handler))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .merge(create_ws_router(connector, registry.clone(), config.bridge))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    tracing::info!("Server listening on http://{}", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, after asking every live bridge to stop.
async fn shutdown_signal(registry: BridgeRegistry) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("Shutdown requested");
    registry.shutdown_all().await;
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = include_str!("index.html");
