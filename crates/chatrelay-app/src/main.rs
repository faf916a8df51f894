//! ChatRelay command line
//!
//! `chatrelay serve` hosts the WebSocket relay; `chatrelay chat` opens a
//! console chat session against it.

use anyhow::{Context, Result};
use chatrelay_app::console::{ConsoleRenderer, QUIT_COMMAND};
use chatrelay_app::{RelayServer, WsConnector};
use chatrelay_core::{spawn_session, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "chatrelay", about = "Streaming chat relay between agents and clients", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the WebSocket relay server
    Serve {
        /// Override the bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Chat with the relay from the terminal
    Chat {
        /// Override the relay URL
        #[arg(long)]
        url: Option<String>,
        /// Override the session id
        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they do not interleave with the chat transcript.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(config).await
        }
        Command::Chat { url, session } => {
            if let Some(url) = url {
                config.client.url = url;
            }
            if let Some(session) = session {
                config.client.session_id = session;
            }
            chat(config).await
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    config
        .server
        .validate_environment()
        .context("environment validation failed")?;

    let server = RelayServer::from_config(&config.server)?;
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    tokio::select! {
        result = server.serve(listener) => result.context("server stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}

async fn chat(config: Config) -> Result<()> {
    let connector = Arc::new(WsConnector::new(config.client.url.clone()));
    let handle = spawn_session(&config.client, connector);
    let mut snapshots = handle.subscribe_snapshot();
    let mut notifications = handle.subscribe_notifications();
    let mut renderer = ConsoleRenderer::new(std::io::stdout());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("Connecting to {} as {}", config.client.url, config.client.session_id);
    handle.connect();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == QUIT_COMMAND {
                    break;
                }
                // Rejections are reported through the notification stream.
                if let Err(e) = handle.send(line).await {
                    warn!("Message not sent: {}", e);
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                renderer.render(&snapshot)?;
            }
            notification = notifications.recv() => match notification {
                Ok(notification) => renderer.notify(&notification)?,
                Err(RecvError::Lagged(n)) => warn!("Skipped {} notifications", n),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.disconnect();
    handle.shutdown();
    renderer.prompt()?;
    Ok(())
}
