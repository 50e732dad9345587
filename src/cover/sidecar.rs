//! Image files stored next to the audio.
//!
//! Any jpg/jpeg/png file counts as a candidate, whatever its name. The search
//! starts in the audio file's directory and descends into subdirectories only
//! while nothing has been found, so a `Scans/` folder is used when the album
//! directory itself has no image. Two or more candidates make the result
//! ambiguous and nothing is picked.

use std::path::{Path, PathBuf};

use crate::scanner::is_hidden;

/// Image extensions accepted as sidecar art (lowercase for matching)
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Result of a sidecar search rooted at one directory.
#[derive(Debug, Clone, PartialEq)]
pub enum SidecarOutcome {
    Found(PathBuf),
    Ambiguous(Vec<PathBuf>),
    None,
}

/// True when the file extension is one of [`IMAGE_EXTENSIONS`].
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files and subdirectories of one directory, both sorted.
fn read_directory(dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut images = Vec::new();
    let mut subdirs = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(target: "cover", "Could not read {:?}: {}", dir, e);
            return (images, subdirs);
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        if is_hidden(&entry.file_name()) {
            continue;
        }
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            subdirs.push(path);
        } else if file_type.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }

    images.sort();
    subdirs.sort();
    (images, subdirs)
}

/// Search `start` and, while nothing is found, its subdirectories depth-first.
///
/// Candidates accumulate across the searched directories. The search stops
/// after the first directory that brings the running total to one or more.
pub fn find_sidecar(start: &Path) -> SidecarOutcome {
    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut worklist: Vec<PathBuf> = vec![start.to_path_buf()];

    while let Some(dir) = worklist.pop() {
        let (images, subdirs) = read_directory(&dir);
        candidates.extend(images);

        match candidates.len() {
            0 => {
                // reversed so the smallest name pops first
                worklist.extend(subdirs.into_iter().rev());
            }
            1 => return SidecarOutcome::Found(candidates.remove(0)),
            _ => return SidecarOutcome::Ambiguous(candidates),
        }
    }

    SidecarOutcome::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_single_image_in_directory() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("track.mp3"));
        touch(&temp.path().join("whatever.JPG"));

        assert_eq!(
            find_sidecar(temp.path()),
            SidecarOutcome::Found(temp.path().join("whatever.JPG"))
        );
    }

    #[test]
    fn test_two_images_is_ambiguous() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("front.jpg"));
        touch(&temp.path().join("back.png"));

        match find_sidecar(temp.path()) {
            SidecarOutcome::Ambiguous(candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_descends_into_subdirectory_when_empty() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("track.flac"));
        touch(&temp.path().join("Scans").join("cover.png"));

        assert_eq!(
            find_sidecar(temp.path()),
            SidecarOutcome::Found(temp.path().join("Scans").join("cover.png"))
        );
    }

    #[test]
    fn test_subtree_images_accumulate() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("Scans").join("a.jpg"));
        touch(&temp.path().join("Scans").join("b.jpg"));

        assert!(matches!(
            find_sidecar(temp.path()),
            SidecarOutcome::Ambiguous(_)
        ));
    }

    #[test]
    fn test_stops_at_first_subdirectory_with_one_image() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("A").join("one.jpg"));
        touch(&temp.path().join("B").join("two.jpg"));

        assert_eq!(
            find_sidecar(temp.path()),
            SidecarOutcome::Found(temp.path().join("A").join("one.jpg"))
        );
    }

    #[test]
    fn test_hidden_entries_are_ignored() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join(".thumb.jpg"));
        touch(&temp.path().join(".cache").join("art.jpg"));

        assert_eq!(find_sidecar(temp.path()), SidecarOutcome::None);
    }

    #[test]
    fn test_no_images() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("track.mp3"));
        touch(&temp.path().join("notes.txt"));

        assert_eq!(find_sidecar(temp.path()), SidecarOutcome::None);
    }
}
