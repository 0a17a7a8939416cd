//! Flow Relay - Main Entry Point
//!
//! Runs a node outside a flow engine: flow input comes from stdin, one message
//! per line, and forwarded messages are printed to stdout as JSON lines. The
//! relay keeps serving broker traffic after stdin closes, until SIGINT/SIGTERM.

use clap::{Parser, Subcommand};
use flow_relay::config::RelayConfig;
use flow_relay::flow::{FlowHost, StdoutHost};
use flow_relay::observability::{init_default_logging, metrics};
use flow_relay::protocol::FlowMessage;
use flow_relay::relay::RelayNode;
use flow_relay::storage::StorageWriteNode;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Capacity of the stdin to node channel
const INPUT_BUFFER: usize = 64;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["relay.toml", "config/relay.toml"];

/// Flow nodes for cloud device messaging and object storage
#[derive(Parser)]
#[command(name = "flow-relay")]
#[command(about = "Relay flow messages to cloud devices and object storage")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "FLOW_RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the message-hub relay, reading flow messages from stdin
    Run,
    /// Write a local file to object storage
    Write {
        /// File whose contents become the object body
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
        /// Target of the form gs://bucket/key; defaults to the configured filename
        #[arg(long, value_name = "URL")]
        to: Option<String>,
        /// Content type; defaults to the configured content type
        #[arg(long, value_name = "TYPE")]
        content_type: Option<String>,
    },
    /// Validate configuration
    Config {
        /// Print the parsed configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting flow-relay v{}", env!("CARGO_PKG_VERSION"));

    // A write needs only the [storage] section, which has defaults
    let config = match (&cli.command, load_configuration(cli.config.as_deref())) {
        (_, Ok(Some(config))) => config,
        (Commands::Write { .. }, Ok(None)) => match RelayConfig::from_toml_str("") {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to build default configuration: {}", e);
                process::exit(1);
            }
        },
        (_, Ok(None)) => {
            error!("No configuration file found. Please provide one with -c/--config or create relay.toml");
            process::exit(1);
        }
        (_, Err(e)) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_relay(config).await,
        Commands::Write {
            file,
            to,
            content_type,
        } => write_file(config, &file, to, content_type).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<Option<RelayConfig>, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(Some(RelayConfig::load_from_file(path)?));
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(Some(RelayConfig::load_from_file(&path)?));
        }
    }

    Ok(None)
}

async fn run_relay(config: RelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let host: Arc<dyn FlowHost> = Arc::new(StdoutHost);
    let node = RelayNode::from_config(&config, host)?;

    let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    if input_tx.send(FlowMessage::from_line(&line)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    });

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
        let _ = shutdown_tx.send(true);
    });

    node.run(input_rx, shutdown_rx).await;

    let snapshot = metrics().snapshot();
    info!(metrics = %serde_json::to_string(&snapshot)?, "Relay stopped");
    Ok(())
}

async fn write_file(
    config: RelayConfig,
    file: &Path,
    to: Option<String>,
    content_type: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = tokio::fs::read(file).await?;
    let msg = FlowMessage {
        filename: to,
        content_type,
        ..FlowMessage::new(payload)
    };

    let host: Arc<dyn FlowHost> = Arc::new(StdoutHost);
    let node = StorageWriteNode::from_config(&config, host)?;
    let target = node.resolve_target(&msg)?;
    node.write(&msg).await?;

    info!(object = %target.object, bytes = msg.payload.len(), "Object written");
    Ok(())
}

fn handle_config_command(
    config: RelayConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
