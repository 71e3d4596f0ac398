use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use attendance_bot::bot::{format_remaining, Bot};
use attendance_bot::channels::{run_dispatch, Channel, ConsoleChannel};
use attendance_bot::portal::{Portal, SimulatedPortal};
use attendance_bot::security::Cipher;
use attendance_bot::session::{JsonFileBackend, SessionStore};
use attendance_bot::Config;

/// Check portal attendance over chat, with encrypted time-limited sessions.
#[derive(Parser, Debug)]
#[command(name = "attendance-bot", version, about)]
struct Cli {
    /// Path to config.toml (default: ~/.attendance-bot/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bot on the console channel (`user: text` per line)
    Run,
    /// Generate a new session encryption key
    Keygen {
        /// Write the raw key bytes to this file instead of printing base64
        #[arg(long)]
        key_file: Option<PathBuf>,
    },
    /// List stored sessions and their remaining time
    Sessions,
    /// Evict every expired session now
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { key_file } => keygen(key_file.as_deref()),
        Commands::Run => {
            let (config, store) = setup(cli.config.as_deref())?;
            run(&config, store).await
        }
        Commands::Sessions => {
            let (_config, store) = setup(cli.config.as_deref())?;
            list_sessions(&store)
        }
        Commands::Purge => {
            let (_config, store) = setup(cli.config.as_deref())?;
            let purged = store.purge_expired()?;
            println!("Purged {purged} expired session(s); {} remaining.", store.len());
            Ok(())
        }
    }
}

/// Load config, start logging and open the session store.
fn setup(config_path: Option<&std::path::Path>) -> Result<(Config, Arc<SessionStore>)> {
    let config = Config::load(config_path)?;
    init_logging(&config.log_level);
    let store = Arc::new(open_store(&config)?);
    Ok((config, store))
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn keygen(key_file: Option<&std::path::Path>) -> Result<()> {
    match key_file {
        Some(path) => {
            Cipher::generate_key_file(path)
                .with_context(|| format!("Failed to write key file {}", path.display()))?;
            println!("Wrote new session key to {}", path.display());
            println!("Set `key_file = \"{}\"` in config.toml.", path.display());
        }
        None => {
            println!("{}", Cipher::generate_key());
        }
    }
    eprintln!("Keep this key safe: losing it invalidates every stored session.");
    Ok(())
}

fn open_store(config: &Config) -> Result<SessionStore> {
    let cipher = config.cipher()?;
    let backend = JsonFileBackend::new(config.resolved_store_path());
    tracing::info!(path = %backend.path().display(), "Opening session store");
    SessionStore::open(cipher, backend, config.session_timeout_secs)
}

async fn run(config: &Config, store: Arc<SessionStore>) -> Result<()> {
    let portal: Arc<dyn Portal> = Arc::new(
        SimulatedPortal::new(config.min_identifier_len, config.min_secret_len)
            .with_latency(Duration::from_millis(config.portal.latency_ms)),
    );
    let bot = Arc::new(Bot::new(store, portal, config.login_policy()));
    let channel: Arc<dyn Channel> = Arc::new(ConsoleChannel::new(&config.console.default_user));

    eprintln!("Attendance bot running. Type `user: /login` (Ctrl+D to quit).");

    tokio::select! {
        result = run_dispatch(bot, channel) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    }
}

fn list_sessions(store: &SessionStore) -> Result<()> {
    let keys = store.keys();
    if keys.is_empty() {
        println!("No stored sessions.");
        return Ok(());
    }

    for key in keys {
        let remaining = store.remaining_secs(&key)?;
        if remaining == 0 {
            println!("{key}\texpired (evicted)");
        } else {
            println!("{key}\t{}", format_remaining(remaining));
        }
    }
    Ok(())
}
