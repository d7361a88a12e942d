use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use docsession_core::config::{self, Config};
use docsession_core::document::open_store;
use docsession_core::service::GcSweeper;
use docsession_core::{DocumentSessionHandler, SessionHandler};

#[derive(Parser)]
#[command(
    name = "docsession",
    about = "Document-database session store maintenance",
    version = docsession_core::VERSION,
)]
struct Cli {
    /// Config file (defaults to ~/.docsession/config.json plus env overrides)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved configuration
    Status,
    /// Delete one batch of expired sessions
    Gc {
        /// Idle seconds after which a session is removed (default: session lifetime)
        #[arg(short, long)]
        lifetime: Option<u64>,
        /// Keep collecting while batches come back full
        #[arg(long)]
        drain: bool,
    },
    /// Run the GC sweeper until interrupted
    Sweep {
        /// Seconds between sweeps (default: from config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Print a session's payload
    Read {
        /// Session ID
        id: String,
    },
    /// Delete a session
    Destroy {
        /// Session ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docsession=info".parse()?)
                .add_directive("docsession_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let cfg = resolve_config(cli.config.as_deref());

    match cli.command {
        Commands::Status => cmd_status(&cfg, cli.config.as_deref())?,
        Commands::Gc { lifetime, drain } => cmd_gc(&cfg, lifetime, drain).await?,
        Commands::Sweep { interval } => cmd_sweep(cfg, interval).await?,
        Commands::Read { id } => cmd_read(&cfg, &id).await?,
        Commands::Destroy { id } => cmd_destroy(&cfg, &id).await?,
    }

    Ok(())
}

fn resolve_config(path: Option<&std::path::Path>) -> Config {
    match path {
        Some(path) => {
            let mut cfg = config::load_config(Some(path));
            config::apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
            cfg
        }
        None => config::load_config_from_env(),
    }
}

async fn build_handler(cfg: &Config) -> Result<DocumentSessionHandler> {
    let store = open_store(&cfg.backend).await?;
    let backend = store.name().to_string();
    let handler = DocumentSessionHandler::new(store, &cfg.session);
    tracing::debug!("Using {} backend, collection {}", backend, handler.collection());
    Ok(handler)
}

// ====== Commands ======

fn cmd_status(cfg: &Config, path: Option<&std::path::Path>) -> Result<()> {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config::get_config_path);
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗ (defaults)" }
    );
    println!("{}", serde_json::to_string_pretty(cfg)?);
    Ok(())
}

async fn cmd_gc(cfg: &Config, lifetime: Option<u64>, drain: bool) -> Result<()> {
    let lifetime = lifetime.unwrap_or_else(|| cfg.session.lifetime_secs());
    let handler = build_handler(cfg).await?;

    if drain {
        let sweeper = GcSweeper::new(Arc::new(handler), &cfg.sweeper).with_lifetime_secs(lifetime);
        let report = sweeper.sweep_once().await?;
        println!("{}", serde_json::to_string(&report)?);
    } else {
        let deleted = handler.gc(lifetime).await?;
        println!("Deleted {} session(s)", deleted);
    }
    Ok(())
}

async fn cmd_sweep(mut cfg: Config, interval: Option<u64>) -> Result<()> {
    if let Some(secs) = interval {
        cfg.sweeper.interval_secs = secs;
    }
    let handler = build_handler(&cfg).await?;
    let sweeper = GcSweeper::new(Arc::new(handler), &cfg.sweeper);

    sweeper
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}

async fn cmd_read(cfg: &Config, id: &str) -> Result<()> {
    let handler = build_handler(cfg).await?;
    let data = handler.read(id).await?;
    if !data.is_empty() {
        println!("{}", String::from_utf8_lossy(&data));
    }
    Ok(())
}

async fn cmd_destroy(cfg: &Config, id: &str) -> Result<()> {
    let handler = build_handler(cfg).await?;
    handler.destroy(id).await?;
    println!("Destroyed session {}", id);
    Ok(())
}
