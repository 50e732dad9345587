//! Cover art resolver - one entry point over embedded and sidecar sources.
//!
//! A resolver lives for one scan. Sidecar outcomes are cached per directory
//! so an album with many tracks walks its folder once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::sidecar::{SidecarOutcome, find_sidecar};
use super::{CoverArt, CoverSource, EmbeddedPicture, mime_for_path};
use crate::error::{Error, Result, ResultExt};

/// Per-scan cover art resolver.
#[derive(Debug, Default)]
pub struct CoverResolver {
    sidecars: Mutex<HashMap<PathBuf, SidecarOutcome>>,
}

impl CoverResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve art for an audio file.
    ///
    /// `embedded` is the picture the tag reader found, if any; it wins over
    /// anything on disk. Otherwise the sidecar search runs from the file's
    /// directory. An ambiguous search is reported as
    /// [`Error::ArtResolutionAmbiguous`] so the caller can log it and store
    /// no art.
    pub fn resolve(
        &self,
        audio_path: &Path,
        embedded: Option<EmbeddedPicture>,
    ) -> Result<Option<CoverArt>> {
        if let Some(picture) = embedded {
            return Ok(Some(picture.into()));
        }

        let Some(dir) = audio_path.parent() else {
            return Ok(None);
        };

        match self.sidecar_outcome(dir) {
            SidecarOutcome::Found(path) => {
                let data = std::fs::read(&path)
                    .with_context(format!("reading cover image {}", path.display()))?;
                Ok(Some(CoverArt {
                    data,
                    mime_type: mime_for_path(&path).to_string(),
                    source: CoverSource::Sidecar(path),
                }))
            }
            SidecarOutcome::Ambiguous(candidates) => Err(Error::ArtResolutionAmbiguous {
                dir: dir.to_path_buf(),
                candidates,
            }),
            SidecarOutcome::None => Ok(None),
        }
    }

    fn sidecar_outcome(&self, dir: &Path) -> SidecarOutcome {
        if let Some(outcome) = self.sidecars.lock().get(dir) {
            return outcome.clone();
        }
        // searched outside the lock; a concurrent duplicate search is harmless
        let outcome = find_sidecar(dir);
        self.sidecars
            .lock()
            .insert(dir.to_path_buf(), outcome.clone());
        outcome
    }

    /// Number of directories searched so far.
    #[cfg(test)]
    pub fn cached_directories(&self) -> usize {
        self.sidecars.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_embedded_wins_over_sidecar() {
        let temp = TempDir::new().unwrap();
        let audio_path = temp.path().join("track.mp3");
        std::fs::write(temp.path().join("cover.jpg"), b"sidecar").unwrap();

        let resolver = CoverResolver::new();
        let cover = resolver
            .resolve(
                &audio_path,
                Some(EmbeddedPicture {
                    data: b"embedded".to_vec(),
                    mime_type: "image/png".to_string(),
                }),
            )
            .unwrap()
            .unwrap();

        assert_eq!(cover.source, CoverSource::Embedded);
        assert_eq!(cover.data, b"embedded");
        assert_eq!(resolver.cached_directories(), 0);
    }

    #[test]
    fn test_resolve_sidecar() {
        let temp = TempDir::new().unwrap();
        let audio_path = temp.path().join("track.mp3");
        std::fs::write(temp.path().join("folder.png"), b"png bytes").unwrap();

        let resolver = CoverResolver::new();
        let cover = resolver.resolve(&audio_path, None).unwrap().unwrap();

        assert!(matches!(cover.source, CoverSource::Sidecar(_)));
        assert_eq!(cover.mime_type, "image/png");
        assert!(cover.to_data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_ambiguous_is_an_error() {
        let temp = TempDir::new().unwrap();
        let audio_path = temp.path().join("track.mp3");
        std::fs::write(temp.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(temp.path().join("b.jpg"), b"b").unwrap();

        let resolver = CoverResolver::new();
        let err = resolver.resolve(&audio_path, None).unwrap_err();
        match err {
            Error::ArtResolutionAmbiguous { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sidecar_outcome_is_cached_per_directory() {
        let temp = TempDir::new().unwrap();
        let resolver = CoverResolver::new();

        assert!(resolver.resolve(&temp.path().join("1.mp3"), None).unwrap().is_none());

        // An image added after the first lookup is not seen within the same scan.
        std::fs::write(temp.path().join("late.jpg"), b"late").unwrap();
        assert!(resolver.resolve(&temp.path().join("2.mp3"), None).unwrap().is_none());
        assert_eq!(resolver.cached_directories(), 1);
    }
}
