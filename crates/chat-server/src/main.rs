//! chat-server: realtime group chat hub.
//!
//! Tracks joined participants, relays chat messages and typing state, and
//! publishes a live online count over WebSocket. A small HTTP side server
//! provides a health endpoint and the static client assets.

mod config;
mod http;
mod presence;
mod server;
mod session;
mod transport;

use clap::Parser;
use config::ServerConfig;
use server::ChatServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// chat-server — realtime group chat hub
#[derive(Parser, Debug)]
#[command(name = "chat-server", version, about = "Realtime group chat hub")]
struct Cli {
    /// HTTP listen port (health + static files)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// WebSocket listen port (defaults to HTTP port + 1)
    #[arg(long)]
    ws_port: Option<u16>,

    /// Listen address
    #[arg(long)]
    host: Option<String>,

    /// Directory with static client assets
    #[arg(long)]
    static_dir: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.chat-hub/server.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting chat-server");

    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        cli.host.as_deref(),
        cli.port,
        cli.ws_port,
        cli.static_dir.as_deref(),
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let chat_server = Arc::new(ChatServer::new(server_config));
    let mut running = tokio::spawn(chat_server.clone().run());

    tokio::select! {
        result = &mut running => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "server error");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!(error = %e, "server task failed");
                    std::process::exit(1);
                }
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
            chat_server.shutdown();
            let _ = running.await;
        }
    }

    info!("chat-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
