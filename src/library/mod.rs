//! The scan pipeline.
//!
//! A [`Catalog`] owns the database pool, the immutable configuration and the
//! tag reader. [`Catalog::scan`] runs one scan end to end:
//!
//! 1. bring the schema up to date and reconcile legacy inline ids
//! 2. walk the media root, extracting tags on blocking workers
//! 3. write each track in walk order through the identity store, resolving
//!    album art the first time an album without art is seen. Unchanged
//!    files are not re-read but still look for sidecar art.
//! 4. rebuild artist links
//!
//! Only one scan runs per catalog at a time.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use futures::StreamExt;
use parking_lot::Mutex;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::cover::{CoverResolver, EmbeddedPicture};
use crate::db::identity::{self, KeyType, SENTINEL_ID, get_or_create};
use crate::db::{self, NewTrack, StoredTrack, schema};
use crate::error::{Error, ExtractionError, Result, ResultExt};
use crate::linker::{self, LinkSummary};
use crate::metadata::{self, LoftyReader, TagReader, TrackAttributes};
use crate::scanner::{self, ListingCache};

/// Progress reported while a scan runs.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Processed(PathBuf),
    /// Unchanged since the last scan
    Skipped(PathBuf),
    Error(PathBuf, String),
    ArtAmbiguous { dir: PathBuf, candidates: usize },
}

/// Totals for one scan.
#[derive(Debug, Default)]
pub struct ScanSummary {
    pub scanned: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub art_resolved: u64,
    pub art_ambiguous: u64,
    /// Catalog rows whose file was not found by this walk. They are kept.
    pub stale: u64,
    pub added_columns: usize,
    /// Reconciliation conflicts left unresolved for lack of a policy
    pub conflicts: Vec<Error>,
    pub links: LinkSummary,
}

/// What a blocking worker hands back for one file.
enum Prepared {
    Unchanged { path: PathBuf, album_id: Option<i64> },
    Failed(ExtractionError),
    Extracted {
        path: PathBuf,
        attrs: TrackAttributes,
        picture: Option<EmbeddedPicture>,
        mtime: Option<i64>,
    },
}

/// A music catalog backed by one SQLite database.
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
    config: Arc<Config>,
    reader: Arc<dyn TagReader>,
    scan_lock: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    pub fn new(pool: SqlitePool, config: Arc<Config>, reader: Arc<dyn TagReader>) -> Self {
        Self {
            pool,
            config,
            reader,
            scan_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Open the configured database, creating and initializing it if
    /// needed, with the lofty tag reader.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::init_db(&config.db_url()).await?;
        Ok(Self::new(pool, Arc::new(config), Arc::new(LoftyReader)))
    }

    /// Open an already initialized catalog for reading.
    pub async fn open_existing(config: Config) -> Result<Self> {
        let pool = db::open_db(&config.db_url()).await?;
        Ok(Self::new(pool, Arc::new(config), Arc::new(LoftyReader)))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Scan the media directory into the catalog.
    ///
    /// Fails fast with [`Error::ScanInProgress`] if another scan holds the
    /// lock. Unreadable files and ambiguous art are reported through
    /// `on_event` and counted; database errors abort the scan, leaving
    /// already committed tracks in place.
    pub async fn scan(&self, mut on_event: impl FnMut(ScanEvent)) -> Result<ScanSummary> {
        let _guard = self
            .scan_lock
            .try_lock()
            .map_err(|_| Error::ScanInProgress)?;

        let root = self.config.library.media_dir.clone();
        let root_meta = std::fs::metadata(&root)
            .with_context(format!("media directory {}", root.display()))?;
        if !root_meta.is_dir() {
            return Err(Error::config(format!("{} is not a directory", root.display())));
        }

        let mut summary = ScanSummary::default();
        let started = std::time::Instant::now();
        info!(target: "scanner", root = %root.display(), "Starting scan");

        let added = schema::sync_all(&self.pool).await?;
        for (table, column) in &added {
            info!(target: "schema", table = table.name(), column, "Added column");
        }
        summary.added_columns = added.len();

        self.reconcile_inline_ids(&mut summary).await?;

        let stored = Arc::new(db::stored_tracks(&self.pool).await?);
        let incremental = self.config.scan.incremental;
        let listings = Arc::new(Mutex::new(ListingCache::default()));
        let scanned_at = chrono::Utc::now().to_rfc3339();
        let resolver = Arc::new(CoverResolver::new());
        let mut art_attempted: HashSet<i64> = HashSet::new();
        let mut sidecar_attempted: HashSet<i64> = HashSet::new();
        let mut seen: HashSet<String> = HashSet::new();

        let jobs = scanner::scan(root.clone())
            .map(|path| {
                let reader = Arc::clone(&self.reader);
                let stored = Arc::clone(&stored);
                let listings = Arc::clone(&listings);
                tokio::task::spawn_blocking(move || {
                    prepare_file(path, reader.as_ref(), &stored, incremental, &listings)
                })
            })
            .buffered(self.config.scan.workers.max(1));
        let mut jobs = pin!(jobs);

        while let Some(job) = jobs.next().await {
            let prepared = job.map_err(|e| Error::Io(std::io::Error::other(e)))?;
            match prepared {
                Prepared::Unchanged { path, album_id } => {
                    seen.insert(path.to_string_lossy().into_owned());
                    summary.unchanged += 1;

                    // a sidecar may have appeared since the last scan
                    let album_id = album_id.unwrap_or(SENTINEL_ID);
                    if album_id != SENTINEL_ID && sidecar_attempted.insert(album_id) {
                        self.resolve_art(album_id, &path, None, &resolver, &mut summary, &mut on_event)
                            .await?;
                    }
                    on_event(ScanEvent::Skipped(path));
                }
                Prepared::Failed(e) => {
                    let path = e.path().to_path_buf();
                    warn!(target: "scanner", path = %path.display(), "Skipping file: {}", e);
                    seen.insert(path.to_string_lossy().into_owned());
                    summary.failed += 1;
                    on_event(ScanEvent::Error(path, e.to_string()));
                }
                Prepared::Extracted {
                    path,
                    attrs,
                    picture,
                    mtime,
                } => {
                    let file_path = path.to_string_lossy().into_owned();
                    let album_id = self.write_track(&file_path, &path, &attrs, mtime, &scanned_at).await?;
                    seen.insert(file_path);
                    summary.scanned += 1;

                    if album_id != SENTINEL_ID && art_attempted.insert(album_id) {
                        self.resolve_art(album_id, &path, picture, &resolver, &mut summary, &mut on_event)
                            .await?;
                    }
                    on_event(ScanEvent::Processed(path));
                }
            }
        }

        summary.stale = stored.keys().filter(|p| !seen.contains(*p)).count() as u64;
        if summary.stale > 0 {
            info!(target: "scanner", stale = summary.stale, "Catalog has tracks whose files were not found");
        }

        summary.links = linker::link_all(&self.pool).await?;

        info!(
            target: "scanner",
            scanned = summary.scanned,
            unchanged = summary.unchanged,
            failed = summary.failed,
            art = summary.art_resolved,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan complete"
        );
        Ok(summary)
    }

    async fn reconcile_inline_ids(&self, summary: &mut ScanSummary) -> Result<()> {
        let policy = self.config.scan.conflict_policy;
        for key in KeyType::INLINE {
            match identity::reconcile(&self.pool, key, policy).await {
                Ok(report) => {
                    debug!(target: "identity", key = %key, ?report, "Reconciled");
                }
                Err(e @ Error::IdentityConflict { .. }) => {
                    warn!(target: "identity", key = %key, "Skipping reconciliation: {}", e);
                    summary.conflicts.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write one track and its dictionary entries in a single transaction.
    /// Returns the album id.
    async fn write_track(
        &self,
        file_path: &str,
        path: &Path,
        attrs: &TrackAttributes,
        mtime: Option<i64>,
        scanned_at: &str,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let album_id = get_or_create(&mut tx, KeyType::Album, Some(&attrs.album)).await?;
        let genre_id = get_or_create(&mut tx, KeyType::Genre, attrs.genre.as_deref()).await?;
        let organization_id =
            get_or_create(&mut tx, KeyType::Organization, attrs.organization.as_deref()).await?;

        let track = NewTrack {
            file_path: file_path.to_string(),
            title: attrs.title.clone(),
            artist: attrs.artist.clone(),
            album: attrs.album.clone(),
            album_id,
            genre: attrs.genre.clone(),
            genre_id,
            organization: attrs.organization.clone(),
            organization_id,
            duration: attrs.duration,
            track_number: attrs.track_number as i64,
            total_tracks: attrs.total_tracks as i64,
            disc_number: attrs.disc_number as i64,
            total_discs: attrs.total_discs as i64,
            album_artist: attrs.album_artist.clone(),
            composer: attrs.composer.clone(),
            date: attrs.date.clone(),
            mtime,
            scanned_at: scanned_at.to_string(),
        };
        let track_id = db::upsert_track(&mut tx, &track).await?;

        if let Some(dir) = path.parent() {
            db::set_album_path(&mut tx, album_id, &dir.to_string_lossy()).await?;
        }
        tx.commit().await?;

        debug!(target: "scanner", track_id, album_id, path = file_path, "Wrote track");
        Ok(album_id)
    }

    async fn resolve_art(
        &self,
        album_id: i64,
        path: &Path,
        picture: Option<EmbeddedPicture>,
        resolver: &Arc<CoverResolver>,
        summary: &mut ScanSummary,
        on_event: &mut impl FnMut(ScanEvent),
    ) -> Result<()> {
        if !db::album_needs_art(&self.pool, album_id).await? {
            return Ok(());
        }

        let resolver = Arc::clone(resolver);
        let audio_path = path.to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || resolver.resolve(&audio_path, picture))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        match outcome {
            Ok(Some(cover)) => {
                db::set_album_art(&self.pool, album_id, &cover.to_data_uri()).await?;
                summary.art_resolved += 1;
                debug!(target: "cover", album_id, source = ?cover.source, "Stored album art");
            }
            Ok(None) => {
                debug!(target: "cover", album_id, "No album art found");
            }
            Err(Error::ArtResolutionAmbiguous { dir, candidates }) => {
                warn!(
                    target: "cover",
                    album_id,
                    dir = %dir.display(),
                    candidates = candidates.len(),
                    "Ambiguous album art, storing none"
                );
                summary.art_ambiguous += 1;
                on_event(ScanEvent::ArtAmbiguous {
                    dir,
                    candidates: candidates.len(),
                });
            }
            Err(e) => {
                warn!(target: "cover", album_id, "Could not load album art: {}", e);
            }
        }
        Ok(())
    }
}

/// Modification time in whole seconds, if the filesystem reports one.
fn file_mtime(path: &Path) -> Option<i64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

/// Blocking per-file work: skip check, extraction and fallbacks.
fn prepare_file(
    path: PathBuf,
    reader: &dyn TagReader,
    stored: &HashMap<String, StoredTrack>,
    incremental: bool,
    listings: &Mutex<ListingCache>,
) -> Prepared {
    let mtime = file_mtime(&path);

    let previous = stored.get(&*path.to_string_lossy()).copied();
    if let Some(row) = previous.filter(|row| incremental && mtime.is_some() && row.mtime == mtime) {
        return Prepared::Unchanged {
            path,
            album_id: row.album_id,
        };
    }

    let (meta, picture) = match metadata::extract(reader, &path) {
        Ok(extracted) => extracted,
        Err(e) => return Prepared::Failed(e),
    };

    let listing = match path.parent() {
        Some(dir) => listings.lock().get(dir),
        None => Arc::default(),
    };
    let attrs = metadata::apply_fallbacks(&path, meta, &listing);

    Prepared::Extracted {
        path,
        attrs,
        picture,
        mtime,
    }
}
