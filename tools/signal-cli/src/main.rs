//! signal-cli: talk to a rendezvous hub from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! # Print the address the hub assigns to this connection
//! signal-cli --url ws://localhost:8080 address
//!
//! # Claim a hostname, then resolve another one
//! signal-cli register alice
//! signal-cli lookup bob
//!
//! # Relay a payload to a peer and print everything relayed back
//! signal-cli forward peer-7 '{"offer":"..."}'
//! signal-cli listen
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use signal_client::adapters::websocket;
use signal_client::domain::config::humantime_serde;
use signal_client::telemetry::{init_logging, LoggingConfig};
use signal_client::{ClientConfig, EventFilter, HubClient};
use tokio_stream::StreamExt;
use tracing::info;

/// Rendezvous hub command-line client
#[derive(Parser, Debug)]
#[command(name = "signal-cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Hub WebSocket URL
    #[arg(long, default_value = "ws://localhost:8080")]
    url: String,

    /// Request timeout, e.g. `10s` or `500ms` (overrides SIGNAL_REQUEST_TIMEOUT)
    #[arg(long)]
    timeout: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the address assigned by the hub
    Address,
    /// Print the transport configuration from the binding
    Config,
    /// Claim a hostname
    Register { hostname: String },
    /// Resolve a hostname
    Lookup { hostname: String },
    /// Relay a JSON payload to a peer address
    Forward { to: String, data: String },
    /// Print push events until interrupted
    Listen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::from_env();
    logging.json |= args.json_logs;
    init_logging(&logging).context("Failed to initialize logging")?;

    let mut config = ClientConfig::from_env().context("Invalid client configuration")?;
    if let Some(timeout) = &args.timeout {
        let timeout = humantime_serde::parse_duration(timeout)
            .map_err(|e| anyhow::anyhow!("invalid --timeout {timeout:?}: {e}"))?;
        config.request_timeout = Some(timeout);
    }
    config.validate().context("Invalid client configuration")?;

    let (transport, receiver) = websocket::connect(&args.url)
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    let client = HubClient::connect(transport, receiver, config);

    let outcome = run(&client, args.command).await;
    client.close().await.context("Failed to close connection")?;
    outcome
}

async fn run(client: &HubClient, command: Command) -> Result<()> {
    match command {
        Command::Address => {
            println!("{}", client.address().await?);
        }
        Command::Config => {
            let configuration = client.configuration().await?;
            println!("{}", serde_json::to_string_pretty(&configuration)?);
        }
        Command::Register { hostname } => {
            let payload = client
                .register(&hostname)
                .await
                .with_context(|| format!("register {hostname:?} failed"))?;
            println!("{}", serde_json::to_string_pretty(&Value::Object(payload))?);
        }
        Command::Lookup { hostname } => {
            let payload = client
                .lookup(&hostname)
                .await
                .with_context(|| format!("lookup {hostname:?} failed"))?;
            println!("{}", serde_json::to_string_pretty(&Value::Object(payload))?);
        }
        Command::Forward { to, data } => {
            let data: Value = serde_json::from_str(&data).context("Payload is not valid JSON")?;
            client.forward(&to, data).await?;
            info!(to = %to, "Payload handed to hub");
        }
        Command::Listen => {
            let mut events = client.event_stream(EventFilter::all());
            loop {
                tokio::select! {
                    event = events.next() => match event {
                        Some(event) => println!("{}", serde_json::to_string(&event)?),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }
    Ok(())
}
