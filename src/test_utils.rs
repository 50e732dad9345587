//! Test utilities and fixtures for catalog tests.
//!
//! Provides temporary databases, a fake [`TagReader`], and a builder for
//! on-disk media trees so scan tests run without real audio files.
//!
//! # Example
//!
//! ```ignore
//! use music_catalog::test_utils::{FakeTagReader, FixtureTree, temp_catalog};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let tree = FixtureTree::new().audio("Album/01.mp3");
//!     let (catalog, _dirs) = temp_catalog(&tree, FakeTagReader::new()).await;
//!     catalog.scan(|_| {}).await.unwrap();
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::config::Config;
use crate::db::NewTrack;
use crate::error::ExtractionError;
use crate::library::Catalog;
use crate::metadata::{RawTags, TagReader};

/// A connected database with no tables, for schema tests.
///
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_pool() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_url = format!("sqlite:{}", dir.path().join("test.db").display());

    let pool = crate::db::connect(&db_url, true)
        .await
        .expect("Failed to open test database");

    (pool, dir)
}

/// A database with the full catalog schema and sentinel rows.
///
/// The database is deleted when the returned `TempDir` is dropped.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_url = format!("sqlite:{}", dir.path().join("test.db").display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Insert `music` rows as older ingestion code wrote them: a genre text and
/// an inline genre id that never went through the dictionary.
pub async fn insert_legacy_genres(pool: &SqlitePool, rows: &[(&str, Option<&str>, Option<i64>)]) {
    for (path, genre, genre_id) in rows {
        sqlx::query("INSERT INTO music (file_path, genre, genre_id) VALUES (?, ?, ?)")
            .bind(path)
            .bind(genre)
            .bind(genre_id)
            .execute(pool)
            .await
            .expect("Failed to insert legacy row");
    }
}

/// Insert an album dictionary row with a fixed id.
pub async fn insert_album(pool: &SqlitePool, id: i64, name: &str) {
    sqlx::query("INSERT INTO albums (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .expect("Failed to insert album");
}

/// A track row with sensible defaults and no dictionary links.
///
/// Customize with field assignment:
///
/// ```ignore
/// let mut track = new_track("/m/a.mp3", "Title");
/// track.album_id = 1;
/// ```
pub fn new_track(path: &str, title: &str) -> NewTrack {
    NewTrack {
        file_path: path.to_string(),
        title: title.to_string(),
        artist: None,
        album: String::new(),
        album_id: 0,
        genre: None,
        genre_id: 0,
        organization: None,
        organization_id: 0,
        duration: 180.0,
        track_number: 1,
        total_tracks: 1,
        disc_number: 1,
        total_discs: 1,
        album_artist: None,
        composer: None,
        date: None,
        mtime: None,
        scanned_at: "2024-01-01T00:00:00+00:00".to_string(),
    }
}

/// Write a silent 16-bit mono PCM WAV file lasting `seconds`.
pub fn write_silent_wav(path: &Path, seconds: u32) {
    const SAMPLE_RATE: u32 = 8000;
    const BYTES_PER_SAMPLE: u16 = 2;
    let data_len = SAMPLE_RATE * seconds * BYTES_PER_SAMPLE as u32;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&(SAMPLE_RATE * BYTES_PER_SAMPLE as u32).to_le_bytes());
    bytes.extend_from_slice(&BYTES_PER_SAMPLE.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, 0);

    std::fs::write(path, bytes).expect("Failed to write wav fixture");
}

/// In-memory [`TagReader`] keyed by file name.
///
/// Files without an entry read as untagged. Clones share the read counter.
#[derive(Debug, Clone, Default)]
pub struct FakeTagReader {
    tags: HashMap<String, Option<RawTags>>,
    reads: Arc<AtomicUsize>,
}

impl FakeTagReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags returned for `file_name`.
    pub fn with(mut self, file_name: &str, tags: RawTags) -> Self {
        self.tags.insert(file_name.to_string(), Some(tags));
        self
    }

    /// Make `file_name` fail with a read error.
    pub fn failing(mut self, file_name: &str) -> Self {
        self.tags.insert(file_name.to_string(), None);
        self
    }

    /// Number of `read` calls so far, across clones.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl TagReader for FakeTagReader {
    fn read(&self, path: &Path) -> Result<RawTags, ExtractionError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.tags.get(&name) {
            Some(Some(tags)) => Ok(tags.clone()),
            Some(None) => Err(ExtractionError::ReadError {
                path: path.to_path_buf(),
                message: "corrupt fixture".to_string(),
            }),
            None => Ok(RawTags::default()),
        }
    }
}

/// Files to lay out under a media root.
#[derive(Debug, Clone, Default)]
pub struct FixtureTree {
    files: Vec<(String, Vec<u8>)>,
}

impl FixtureTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A placeholder audio file; its tags come from the fake reader.
    pub fn audio(self, relative: &str) -> Self {
        self.file(relative, b"not really audio")
    }

    pub fn file(mut self, relative: &str, contents: &[u8]) -> Self {
        self.files.push((relative.to_string(), contents.to_vec()));
        self
    }

    /// Write every file below `root`, creating directories as needed.
    pub fn write_to(&self, root: &Path) {
        for (relative, contents) in &self.files {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
            }
            std::fs::write(&path, contents).expect("Failed to write fixture file");
        }
    }
}

/// Temporary directories backing a test catalog.
pub struct TempDirs {
    pub media: TempDir,
    pub db: TempDir,
}

/// A catalog over a freshly written media tree, using `reader` for tags.
pub async fn temp_catalog(tree: &FixtureTree, reader: FakeTagReader) -> (Catalog, TempDirs) {
    let media = tempfile::tempdir().expect("Failed to create media directory");
    tree.write_to(media.path());

    let (pool, db) = temp_db().await;
    let mut config = Config::default();
    config.library.media_dir = media.path().to_path_buf();
    config.library.database = db.path().join("test.db");
    config.scan.workers = 2;

    let catalog = Catalog::new(pool, Arc::new(config), Arc::new(reader));
    (catalog, TempDirs { media, db })
}
