//! offline-sync binary entry point.
//!
//! Usage: offline-sync [--base-dir <dir>] <command>
//!
//! Inspects and maintains the on-disk offline cache.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use client_core::{init_logging, ClientConfig, LogConfig, Paths};
use offline_cache::{CacheStats, LruEntry, PersistentCache, SqliteStore};
use serde::Serialize;
use session_sync::SyncConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// offline-sync: inspect the offline session cache.
#[derive(Parser, Debug)]
#[command(name = "offline-sync")]
#[command(about = "Inspect and maintain the offline session cache")]
struct Args {
    /// Client base directory (defaults to ~/.offline-sync).
    #[arg(long, env = "OFFLINE_SYNC_HOME")]
    base_dir: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cache size, sessions and queued operations
    Stats,
    /// Queued operations, oldest first
    Pending {
        /// Only this session
        #[arg(long)]
        session: Option<String>,
    },
    /// Cached message history of a session
    Messages {
        #[arg(long)]
        session: String,
    },
    /// Metadata snapshot of a session
    Metadata {
        #[arg(long)]
        session: String,
    },
    /// Remove cached data
    Clear {
        /// Clear a single session
        #[arg(long, conflicts_with = "all")]
        session: Option<String>,
        /// Clear everything
        #[arg(long)]
        all: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsReport {
    #[serde(flatten)]
    stats: CacheStats,
    max_total_cache_size_bytes: u64,
    sessions: Vec<LruEntry>,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_cache(paths: &Paths, config: &SyncConfig) -> anyhow::Result<PersistentCache> {
    let db_path = paths.cache_database_file();
    let store = SqliteStore::open(&db_path, &config.namespace)
        .with_context(|| format!("opening cache database {}", db_path.display()))?;
    Ok(PersistentCache::open(Arc::new(store), config.cache.clone())?)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let paths = match args.base_dir {
        Some(dir) => Paths::with_base_dir(dir),
        None => Paths::new()?,
    };
    let client_config = ClientConfig::load(&paths)?;

    init_logging(&LogConfig {
        service_name: "offline-sync".into(),
        default_level: args
            .log_level
            .unwrap_or_else(|| client_config.log_level.clone()),
        log_path: Some(paths.log_file()),
        also_stderr: false,
    })?;

    let config = SyncConfig::from_client_config(&client_config);
    let cache = open_cache(&paths, &config)?;

    match args.command {
        Command::Stats => print_json(&StatsReport {
            stats: cache.get_cache_stats(),
            max_total_cache_size_bytes: config.cache.max_total_cache_size_bytes,
            sessions: cache.lru_entries(),
        })?,
        Command::Pending { session } => {
            let operations = match session {
                Some(session_id) => cache.get_pending_operations(&session_id),
                None => cache.get_all_pending_operations(),
            };
            print_json(&operations)?;
        }
        Command::Messages { session } => print_json(&cache.get_cached_messages(&session))?,
        Command::Metadata { session } => match cache.get_cached_session_metadata(&session) {
            Some(metadata) => print_json(&metadata)?,
            None => bail!("no metadata cached for session {}", session),
        },
        Command::Clear { session, all } => match (session, all) {
            (Some(session_id), false) => {
                cache.clear_session_cache(&session_id)?;
                info!(session_id = %session_id, "Session cleared from CLI");
                println!("Cleared session {}", session_id);
            }
            (None, true) => {
                cache.clear_all_cache()?;
                info!("Cache cleared from CLI");
                println!("Cleared all cached data");
            }
            _ => bail!("pass either --session <id> or --all"),
        },
    }

    Ok(())
}
