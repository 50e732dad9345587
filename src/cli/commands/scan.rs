//! Library scanning and schema commands.

use std::io::Write;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::db::{self, schema};
use crate::library::{Catalog, ScanEvent};

/// Scan the configured media directory.
pub fn cmd_scan(rt: &Runtime, config: Config) -> anyhow::Result<()> {
    rt.block_on(async {
        println!("Scanning directory: {}", config.library.media_dir.display());
        let catalog = Catalog::open(config).await?;

        let mut count = 0u64;
        let summary = catalog
            .scan(|event| match event {
                ScanEvent::Processed(_) | ScanEvent::Skipped(_) => {
                    count += 1;
                    if count % 100 == 0 {
                        print!("\rScanned {} files...", count);
                        let _ = std::io::stdout().flush();
                    }
                }
                ScanEvent::Error(p, e) => {
                    eprintln!("\nError processing {}: {}", p.display(), e);
                }
                ScanEvent::ArtAmbiguous { dir, candidates } => {
                    eprintln!(
                        "\nSkipping album art under {}: {} candidate images",
                        dir.display(),
                        candidates
                    );
                }
            })
            .await?;

        println!(
            "\nScan complete: {} written, {} unchanged, {} failed.",
            summary.scanned, summary.unchanged, summary.failed
        );
        println!(
            "Album art: {} resolved, {} ambiguous. Albums attributed: {} ({} Various Artists).",
            summary.art_resolved,
            summary.art_ambiguous,
            summary.links.albums,
            summary.links.various_artists
        );
        if summary.stale > 0 {
            println!("{} catalog tracks were not found on disk.", summary.stale);
        }
        for conflict in &summary.conflicts {
            eprintln!("Unresolved: {conflict}");
        }
        if !summary.conflicts.is_empty() {
            eprintln!("Re-run with --on-conflict keep|reset to choose a resolution.");
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// Report missing tables and columns; with `sync`, create them.
pub fn cmd_schema(rt: &Runtime, config: Config, sync: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let db_url = config.db_url();
        if sync {
            db::init_db(&db_url).await?;
            println!("Schema is up to date.");
            return Ok::<(), anyhow::Error>(());
        }

        let pool = db::connect_read_only(&db_url).await?;
        let mut complete = true;
        for table in schema::Table::ALL {
            if !schema::table_exists(&pool, table.name()).await? {
                println!("{}: missing", table.name());
                complete = false;
                continue;
            }
            let live = schema::introspect_table(&pool, table).await?;
            let missing = schema::missing_columns(table, &live);
            if missing.is_empty() {
                println!("{}: ok ({} columns)", table.name(), live.len());
            } else {
                complete = false;
                let names: Vec<&str> = missing.iter().map(|c| c.name).collect();
                println!("{}: missing columns {}", table.name(), names.join(", "));
            }
        }
        if !complete {
            println!("Run `schema --sync` to add what is missing.");
        }
        Ok(())
    })
}
