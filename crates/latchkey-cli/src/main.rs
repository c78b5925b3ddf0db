//! `latchkey`: command-line client for a smart-lock bridge.

mod config;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use config::AppConfig;
use latchkey_core::{LockAction, LockId, SigningKey, WebhookId};
use latchkey_network::{BridgeClient, WebhookListener};
use latchkey_protocol::CommandCodec;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "latchkey", version, about = "Control a smart lock through its local bridge")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "latchkey.toml")]
    config: PathBuf,

    /// Bridge address, overriding the config file
    #[arg(long)]
    address: Option<String>,

    /// Lock id, overriding the config file
    #[arg(long)]
    lock_id: Option<u8>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open the lock
    Open,
    /// Switch to day-lock (latch)
    Latch,
    /// Fully lock
    Lock,
    /// Trigger the electronic door opener
    OpenDoor,
    /// Print the bridge status as JSON
    Status,
    /// Manage bridge webhooks
    Webhooks {
        #[command(subcommand)]
        command: WebhookCommand,
    },
    /// Receive webhook events and print them as JSON lines
    Listen {
        /// Register the listener's callback URL before listening
        #[arg(long)]
        register: bool,
    },
    /// Print a signed command without sending it
    Sign {
        /// open, day_lock, lock or open_electronic_door
        action: LockAction,
    },
}

#[derive(Subcommand)]
enum WebhookCommand {
    /// List registered webhooks
    List,
    /// Register a callback URL for every event
    Register {
        /// Defaults to the configured callback host and listener port
        url: Option<String>,
    },
    /// Delete a webhook by id
    Delete { id: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(address) = cli.address {
        config.bridge.address = address;
    }
    if let Some(lock_id) = cli.lock_id {
        config.bridge.lock_id = lock_id;
    }

    run(cli.command, &config).await
}

async fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Open => client(config)?.open_lock().await?,
        Command::Latch => client(config)?.latch_lock().await?,
        Command::Lock => client(config)?.lock_lock().await?,
        Command::OpenDoor => client(config)?.open_electronic_door().await?,
        Command::Status => {
            let status = client(config)?.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Webhooks { command } => webhooks(command, config).await?,
        Command::Listen { register } => listen(register, config).await?,
        Command::Sign { action } => {
            let key = SigningKey::from_base64(&config.bridge.api_key).context("decoding api_key")?;
            let signed = CommandCodec::new().encode(action, LockId::new(config.bridge.lock_id), &key)?;
            println!("{signed}");
        }
    }
    Ok(())
}

fn client(config: &AppConfig) -> Result<BridgeClient> {
    BridgeClient::new(config.bridge_config()).context("creating bridge client")
}

async fn webhooks(command: WebhookCommand, config: &AppConfig) -> Result<()> {
    let client = client(config)?;

    match command {
        WebhookCommand::List => {
            for webhook in client.list_webhooks().await? {
                println!("{}\t{}", webhook.id, webhook.url);
            }
        }
        WebhookCommand::Register { url } => {
            let url = match url.or_else(|| config.callback_url()) {
                Some(url) => url,
                None => bail!("no URL given and no [listener] callback_host configured"),
            };
            client.register_webhook(&url).await?;
            println!("registered {url}");
        }
        WebhookCommand::Delete { id } => {
            client.delete_webhook(WebhookId::new(id)).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

async fn listen(register: bool, config: &AppConfig) -> Result<()> {
    let mut listener = WebhookListener::new(config.listener_config()?);
    let mut events = listener.subscribe();
    let addr = listener.start().await?;

    if register {
        let Some(url) = config.callback_url() else {
            listener.stop().await?;
            bail!("--register needs [listener] callback_host");
        };
        client(config)?.register_webhook(&url).await?;
        info!("Registered {} with bridge", url);
    }

    info!("Listening for bridge events on {} (Ctrl-C to stop)", addr);

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(skipped)) => warn!("Dropped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    listener.stop().await?;
    Ok(())
}
