//! Streamchat - Line-Based Terminal Client
//!
//! A thin surface over `streamchat-core`: stdin lines become turns, transcript
//! events become stdout text. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (http://localhost:3000, first configured bot)
//! streamchat
//!
//! # Another server and bot
//! streamchat --base-url https://chat.example.com --context x
//!
//! # With config file
//! streamchat --config ~/.config/streamchat/config.toml
//!
//! # Verbose logging
//! RUST_LOG=debug streamchat
//! ```

mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use streamchat_core::{
    load_config, ClientConfig, ConfigOverrides, FileStore, HttpBackend, MemoryStore, Persistence,
    TurnOrchestrator,
};

use repl::Repl;

/// Name of the durable store file inside the state directory
const STORE_FILE: &str = "store.json";

/// Streamchat - terminal client for streaming chat bots
#[derive(Parser, Debug)]
#[command(name = "streamchat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Chat service base URL
    #[arg(short = 'u', long, value_name = "URL")]
    base_url: Option<String>,

    /// Bot to start with
    #[arg(short = 'b', long, value_name = "KEY")]
    context: Option<String>,

    /// Directory for saved settings and the user id
    #[arg(long, env = "STREAMCHAT_STATE_DIR", value_name = "DIR")]
    state_dir: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref url) = self.base_url {
            overrides = overrides.with_base_url(url.clone());
        }
        if let Some(ref context) = self.context {
            overrides = overrides.with_context(context.as_str());
        }
        if let Some(ref dir) = self.state_dir {
            overrides = overrides.with_state_dir(dir.clone());
        }
        overrides
    }
}

/// Initialize logging to stderr
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("streamchat=warn,streamchat_core=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Session scope in memory, durable scope in `<state_dir>/store.json`
fn open_persistence(config: &ClientConfig) -> Result<Persistence> {
    let path = config.resolved_state_dir().join(STORE_FILE);
    let durable = FileStore::open(&path)
        .with_context(|| format!("Failed to open state store: {}", path.display()))?;
    info!(path = %path.display(), "Durable store opened");
    Ok(Persistence::new(Arc::new(MemoryStore::new()), Arc::new(durable)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    info!(version = env!("CARGO_PKG_VERSION"), "Streamchat starting");

    let mut config = load_config(args.config.clone()).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    if let Some(path) = config.config_file_path() {
        info!(path = %path.display(), source = %config.source(), "Configuration loaded");
    }

    let persistence = open_persistence(&config)?;
    let backend = Arc::new(HttpBackend::new(&config.base_url));
    let orchestrator = TurnOrchestrator::from_config(&config, backend, persistence)
        .context("Failed to start client")?;

    let registry = orchestrator.sessions().registry().clone();
    let context = config
        .startup_context(&registry)
        .context("Failed to pick a bot")?;

    let mut repl = Repl::new(orchestrator, context)?;
    repl.run().await?;

    info!("Streamchat stopped");
    Ok(())
}
