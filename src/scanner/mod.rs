//! Media tree traversal.
//!
//! The walk runs on a blocking thread and feeds paths through a channel that
//! is exposed as a [`Stream`]. Entries are visited in sorted order, and hidden
//! files and directories (leading `.`) are skipped.

use futures::stream::Stream;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use walkdir::{DirEntry, WalkDir};

/// Extensions the catalog reads, matched case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a"];

/// True when the extension is one of [`SUPPORTED_EXTENSIONS`].
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// True for names starting with `.`.
pub fn is_hidden(name: &OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

fn is_visible_entry(entry: &DirEntry) -> bool {
    // depth 0 is the root itself, which may legitimately be a dot-directory
    entry.depth() == 0 || !is_hidden(entry.file_name())
}

/// Scans the given root directory recursively for audio files.
///
/// Returns a Stream of PathBufs in sorted traversal order.
pub fn scan(root: PathBuf) -> impl Stream<Item = PathBuf> {
    let (tx, rx) = mpsc::channel(100);

    tokio::task::spawn_blocking(move || {
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(is_visible_entry);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {:?}: {}", root, e);
                    continue;
                }
            };
            if entry.file_type().is_file() && is_audio_file(entry.path()) {
                // The receiver is gone once the scan is cancelled.
                if tx.blocking_send(entry.into_path()).is_err() {
                    break;
                }
            }
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|path| (path, rx))
    })
}

/// Sorted names of the supported, non-hidden files in one directory.
///
/// Used to derive track numbers and totals for untagged files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryListing {
    names: Vec<String>,
}

impl DirectoryListing {
    /// List `dir`; an unreadable directory yields an empty listing.
    pub fn read(dir: &Path) -> Self {
        let names = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_audio_file(p))
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .filter(|n| !n.starts_with('.'))
                .collect(),
            Err(e) => {
                tracing::debug!("Could not list {:?}: {}", dir, e);
                Vec::new()
            }
        };
        Self::from_names(names)
    }

    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        Self { names }
    }

    /// 0-based index of `name` in sorted order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).ok()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Directory listings computed once per directory during a scan.
#[derive(Debug, Default)]
pub struct ListingCache {
    listings: HashMap<PathBuf, std::sync::Arc<DirectoryListing>>,
}

impl ListingCache {
    pub fn get(&mut self, dir: &Path) -> std::sync::Arc<DirectoryListing> {
        self.listings
            .entry(dir.to_path_buf())
            .or_insert_with(|| std::sync::Arc::new(DirectoryListing::read(dir)))
            .clone()
    }
}
