//! chat — terminal client for the chat hub.
//!
//! Joins the hub under a display name, sends each stdin line as a chat
//! message and prints what everyone else says.

mod client;
mod config;
mod render;

use clap::Parser;
use std::path::PathBuf;
use tracing::error;

/// chat — terminal client for the chat hub
#[derive(Parser)]
#[command(name = "chat", version, about = "Terminal client for the chat hub")]
struct Cli {
    /// Display name to join with
    #[arg(short, long)]
    name: Option<String>,

    /// Hub host
    #[arg(long)]
    host: Option<String>,

    /// Hub WebSocket port
    #[arg(short, long)]
    port: Option<u16>,

    /// Wire format (events or frames)
    #[arg(short = 't', long = "transport")]
    transport: Option<String>,

    /// Config file path
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("chat=debug,chat_cli=debug,chat_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("chat=warn,chat_cli=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("chat: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".chat-hub")
            .join("config.toml")
    });
    let cfg = config::Config::load(&config_path)?.default;

    // CLI overrides config.
    let host = cli.host.unwrap_or(cfg.host);
    let port = cli.port.unwrap_or(cfg.port);
    let format = config::parse_transport(cli.transport.as_deref().unwrap_or(&cfg.transport))?;
    let name = cli.name.unwrap_or(cfg.name);
    if name.trim().is_empty() {
        anyhow::bail!("no display name: pass --name or set `name` in {}", config_path.display());
    }

    client::run(&host, port, &name, format).await
}
