//! CLI command definitions and dispatch.
//!
//! Each group of subcommands lives in its own submodule:
//! - `scan`: scanning and schema maintenance
//! - `query`: track/album queries, comparisons and ratings

mod query;
mod scan;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::db::identity::ConflictPolicy;

pub use query::{cmd_album, cmd_albums, cmd_compare, cmd_list, cmd_path, cmd_rate, cmd_tracks};
pub use scan::{cmd_scan, cmd_schema};

/// music-catalog CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Catalog database file (overrides the config file)
    #[arg(long, global = true, env = "MUSIC_CATALOG_DB")]
    pub db: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "MUSIC_CATALOG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Scan the media directory into the catalog
    Scan {
        /// Root of the media tree (overrides the config file)
        #[arg(long, env = "MUSIC_CATALOG_MEDIA_DIR")]
        media_dir: Option<PathBuf>,
        /// Re-read every file, even if unchanged since the last scan
        #[arg(long)]
        full: bool,
        /// How to resolve inconsistent legacy ids
        #[arg(long, value_enum)]
        on_conflict: Option<ConflictPolicy>,
        /// Number of files extracted in parallel
        #[arg(long)]
        workers: Option<usize>,
    },
    /// List every track as "title - path"
    List,
    /// Print tracks as JSON
    Tracks {
        /// Track ids (all tracks when omitted)
        ids: Vec<i64>,
        /// Comma-separated columns, e.g. title,album_name,artist_name
        #[arg(long)]
        columns: Option<String>,
    },
    /// List albums by rating
    Albums,
    /// Show one album with its tracks
    Album {
        id: i64,
    },
    /// Pick two random albums to compare
    Compare,
    /// Record a comparison: '{"winner_id": 1, "loser_id": 2}'
    Rate {
        json: String,
    },
    /// Print the file path of a track
    Path {
        id: i64,
    },
    /// Show schema status, optionally adding missing tables and columns
    Schema {
        #[arg(long)]
        sync: bool,
    },
}

/// Build the effective configuration: file first, then CLI flags.
pub(crate) fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load(),
    };
    if let Some(db) = &cli.db {
        config.library.database = db.clone();
    }
    Ok(config)
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let mut config = build_config(cli)?;

    match &cli.command {
        Commands::Scan {
            media_dir,
            full,
            on_conflict,
            workers,
        } => {
            if let Some(dir) = media_dir {
                config.library.media_dir = dir.clone();
            }
            if *full {
                config.scan.incremental = false;
            }
            if on_conflict.is_some() {
                config.scan.conflict_policy = *on_conflict;
            }
            if let Some(workers) = workers {
                anyhow::ensure!(*workers > 0, "--workers must be at least 1");
                config.scan.workers = *workers;
            }
            cmd_scan(&rt, config)
        }
        Commands::List => cmd_list(&rt, config),
        Commands::Tracks { ids, columns } => cmd_tracks(&rt, config, ids, columns.as_deref()),
        Commands::Albums => cmd_albums(&rt, config),
        Commands::Album { id } => cmd_album(&rt, config, *id),
        Commands::Compare => cmd_compare(&rt, config),
        Commands::Rate { json } => cmd_rate(&rt, config, json),
        Commands::Path { id } => cmd_path(&rt, config, *id),
        Commands::Schema { sync } => cmd_schema(&rt, config, *sync),
    }
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
