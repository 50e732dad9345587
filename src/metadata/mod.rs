//! Audio file tag extraction.
//!
//! Uses the lofty crate for format-independent tag access. Reading is behind
//! the [`TagReader`] trait so the scan pipeline can be driven by a fake
//! reader in tests.
//!
//! Extraction produces a [`TrackMetadata`] holding only what the file says.
//! The caller then applies [`apply_fallbacks`] with the file's directory
//! listing to obtain a complete [`TrackAttributes`].

use std::collections::BTreeMap;
use std::path::Path;

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};

use crate::cover::embedded::{EmbeddedPicture, pick_picture};
use crate::error::ExtractionError;
use crate::scanner::{DirectoryListing, is_audio_file};

/// Canonical attribute keys produced by a [`TagReader`].
pub mod keys {
    pub const TITLE: &str = "title";
    pub const ARTIST: &str = "artist";
    pub const ALBUM: &str = "album";
    pub const GENRE: &str = "genre";
    pub const ORGANIZATION: &str = "organization";
    pub const TRACKNUMBER: &str = "tracknumber";
    pub const TOTALTRACKS: &str = "totaltracks";
    pub const DISCNUMBER: &str = "discnumber";
    pub const TOTALDISCS: &str = "totaldiscs";
    pub const ALBUMARTIST: &str = "albumartist";
    pub const COMPOSER: &str = "composer";
    pub const DATE: &str = "date";
}

/// Raw output of one probe: the tag map, the duration, and any embedded
/// picture.
#[derive(Debug, Clone, Default)]
pub struct RawTags {
    pub fields: BTreeMap<&'static str, String>,
    /// Duration in seconds
    pub duration: f64,
    pub picture: Option<EmbeddedPicture>,
}

impl RawTags {
    /// Builder-style insert used by readers and test fixtures.
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.fields.insert(key, value.into());
        self
    }
}

/// Per-format tag access.
pub trait TagReader: Send + Sync {
    /// Read tags, duration, and embedded picture from one file.
    fn read(&self, path: &Path) -> Result<RawTags, ExtractionError>;
}

/// Production [`TagReader`] backed by lofty.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyReader;

impl TagReader for LoftyReader {
    fn read(&self, path: &Path) -> Result<RawTags, ExtractionError> {
        let read_error = |e: lofty::error::LoftyError| ExtractionError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let tagged_file = Probe::open(path)
            .map_err(read_error)?
            .read()
            .map_err(read_error)?;

        let mut raw = RawTags {
            duration: tagged_file.properties().duration().as_secs_f64(),
            ..RawTags::default()
        };

        if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            collect_fields(tag, &mut raw.fields);
        }

        raw.picture = tagged_file
            .tags()
            .iter()
            .find_map(|tag| pick_picture(tag.pictures()));

        Ok(raw)
    }
}

/// Map a lofty tag onto the canonical keys.
fn collect_fields(tag: &Tag, fields: &mut BTreeMap<&'static str, String>) {
    let mut put = |key: &'static str, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            fields.insert(key, value);
        }
    };

    put(keys::TITLE, tag.title().map(|s| s.to_string()));

    let artists: Vec<&str> = tag.get_strings(&ItemKey::TrackArtist).collect();
    put(keys::ARTIST, (!artists.is_empty()).then(|| artists.join(", ")));

    put(keys::ALBUM, tag.album().map(|s| s.to_string()));
    put(keys::GENRE, tag.genre().map(|s| s.to_string()));
    put(
        keys::ORGANIZATION,
        tag.get_string(&ItemKey::Label)
            .or_else(|| tag.get_string(&ItemKey::Publisher))
            .map(str::to_string),
    );
    put(keys::TRACKNUMBER, tag.track().map(|n| n.to_string()));
    put(keys::TOTALTRACKS, tag.track_total().map(|n| n.to_string()));
    put(keys::DISCNUMBER, tag.disk().map(|n| n.to_string()));
    put(keys::TOTALDISCS, tag.disk_total().map(|n| n.to_string()));
    put(
        keys::ALBUMARTIST,
        tag.get_string(&ItemKey::AlbumArtist).map(str::to_string),
    );
    put(
        keys::COMPOSER,
        tag.get_string(&ItemKey::Composer).map(str::to_string),
    );
    put(
        keys::DATE,
        tag.get_string(&ItemKey::RecordingDate)
            .map(str::to_string)
            .or_else(|| tag.year().map(|y| y.to_string())),
    );
}

/// What the file itself says, before fallbacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    /// Comma-joined artist text
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub organization: Option<String>,
    /// Seconds
    pub duration: f64,
    pub track_number: Option<u32>,
    pub total_tracks: Option<u32>,
    pub disc_number: Option<u32>,
    pub total_discs: Option<u32>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub date: Option<String>,
}

impl TrackMetadata {
    /// Interpret a canonical tag map.
    ///
    /// Number fields accept `"3"` as well as `"3/12"`; the part after the
    /// slash fills the matching total when that is not tagged separately.
    pub fn from_raw(raw: &RawTags) -> Self {
        let text = |key: &str| {
            raw.fields
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let (track_number, track_total_inline) = parse_position(raw.fields.get(keys::TRACKNUMBER));
        let (disc_number, disc_total_inline) = parse_position(raw.fields.get(keys::DISCNUMBER));

        Self {
            title: text(keys::TITLE),
            artist: text(keys::ARTIST),
            album: text(keys::ALBUM),
            genre: text(keys::GENRE),
            organization: text(keys::ORGANIZATION),
            duration: raw.duration,
            track_number,
            total_tracks: parse_position(raw.fields.get(keys::TOTALTRACKS)).0.or(track_total_inline),
            disc_number,
            total_discs: parse_position(raw.fields.get(keys::TOTALDISCS)).0.or(disc_total_inline),
            album_artist: text(keys::ALBUMARTIST),
            composer: text(keys::COMPOSER),
            date: text(keys::DATE),
        }
    }
}

/// Parse `"n"` or `"n/total"`; zero counts as missing.
fn parse_position(value: Option<&String>) -> (Option<u32>, Option<u32>) {
    let Some(value) = value else {
        return (None, None);
    };
    let mut parts = value.splitn(2, '/');
    let parse = |s: Option<&str>| {
        s.and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
    };
    (parse(parts.next()), parse(parts.next()))
}

/// Read a supported file through `reader`.
///
/// Unsupported extensions fail with [`ExtractionError::UnsupportedFormat`]
/// before the file is opened.
pub fn extract(reader: &dyn TagReader, path: &Path) -> Result<(TrackMetadata, Option<EmbeddedPicture>), ExtractionError> {
    if !is_audio_file(path) {
        return Err(ExtractionError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }
    let raw = reader.read(path)?;
    let metadata = TrackMetadata::from_raw(&raw);
    Ok((metadata, raw.picture))
}

/// A track's attributes after fallbacks; every positional field is set.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackAttributes {
    pub title: String,
    pub artist: Option<String>,
    pub album: String,
    pub genre: Option<String>,
    pub organization: Option<String>,
    pub duration: f64,
    pub track_number: u32,
    pub total_tracks: u32,
    pub disc_number: u32,
    pub total_discs: u32,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub date: Option<String>,
}

/// Fill gaps from the file's location.
///
/// In order: title from the file stem, album from the enclosing directory
/// name, track number from the file's 1-based position in `listing`, total
/// tracks from the listing length, album artist from the track artist, and
/// disc number/total default to 1.
pub fn apply_fallbacks(path: &Path, meta: TrackMetadata, listing: &DirectoryListing) -> TrackAttributes {
    let title = meta.title.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let album = meta.album.unwrap_or_else(|| {
        path.parent()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let track_number = meta
        .track_number
        .or_else(|| listing.position(&file_name).map(|i| i as u32 + 1))
        .unwrap_or(1);
    let total_tracks = meta
        .total_tracks
        .unwrap_or_else(|| (listing.len() as u32).max(1));
    let album_artist = meta.album_artist.or_else(|| meta.artist.clone());

    TrackAttributes {
        title,
        artist: meta.artist,
        album,
        genre: meta.genre,
        organization: meta.organization,
        duration: meta.duration,
        track_number,
        total_tracks,
        disc_number: meta.disc_number.unwrap_or(1),
        total_discs: meta.total_discs.unwrap_or(1),
        album_artist,
        composer: meta.composer,
        date: meta.date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_silent_wav;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn listing(names: &[&str]) -> DirectoryListing {
        DirectoryListing::from_names(names.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_read_non_audio_file_returns_error() {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        writeln!(file, "This is just some text, not music.").unwrap();

        let result = extract(&LoftyReader, file.path());
        assert!(matches!(result, Err(ExtractionError::ReadError { .. })));
    }

    #[test]
    fn test_unsupported_extension_is_rejected_before_reading() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().with_extension("ogg");

        let result = extract(&LoftyReader, &path);
        assert!(matches!(result, Err(ExtractionError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_read_untagged_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_silent_wav(&path, 1);

        let (meta, picture) = extract(&LoftyReader, &path).unwrap();
        assert!(meta.title.is_none());
        assert!(picture.is_none());
        assert!((meta.duration - 1.0).abs() < 0.1, "duration was {}", meta.duration);
    }

    #[test]
    fn test_from_raw_parses_positions() {
        let raw = RawTags::default()
            .with(keys::TRACKNUMBER, "3/12")
            .with(keys::DISCNUMBER, "2")
            .with(keys::TOTALDISCS, "2")
            .with(keys::TITLE, "  ");

        let meta = TrackMetadata::from_raw(&raw);
        assert_eq!(meta.track_number, Some(3));
        assert_eq!(meta.total_tracks, Some(12));
        assert_eq!(meta.disc_number, Some(2));
        assert_eq!(meta.total_discs, Some(2));
        assert_eq!(meta.title, None, "blank text counts as missing");
    }

    #[test]
    fn test_explicit_total_wins_over_inline_total() {
        let raw = RawTags::default()
            .with(keys::TRACKNUMBER, "3/12")
            .with(keys::TOTALTRACKS, "10");
        assert_eq!(TrackMetadata::from_raw(&raw).total_tracks, Some(10));
    }

    #[test]
    fn test_fallbacks_from_location() {
        let path = PathBuf::from("/music/Kind of Blue/02 Freddie.flac");
        let meta = TrackMetadata {
            artist: Some("Miles Davis".to_string()),
            duration: 570.0,
            ..TrackMetadata::default()
        };

        let attrs = apply_fallbacks(
            &path,
            meta,
            &listing(&["01 So What.flac", "02 Freddie.flac", "03 Blue.flac"]),
        );

        assert_eq!(attrs.title, "02 Freddie");
        assert_eq!(attrs.album, "Kind of Blue");
        assert_eq!(attrs.track_number, 2);
        assert_eq!(attrs.total_tracks, 3);
        assert_eq!(attrs.album_artist.as_deref(), Some("Miles Davis"));
        assert_eq!(attrs.disc_number, 1);
        assert_eq!(attrs.total_discs, 1);
    }

    #[test]
    fn test_tagged_values_win_over_fallbacks() {
        let path = PathBuf::from("/music/dir/a.mp3");
        let meta = TrackMetadata {
            title: Some("Real Title".to_string()),
            album: Some("Real Album".to_string()),
            track_number: Some(9),
            total_tracks: Some(11),
            album_artist: Some("Band".to_string()),
            artist: Some("Singer".to_string()),
            ..TrackMetadata::default()
        };

        let attrs = apply_fallbacks(&path, meta, &listing(&["a.mp3"]));
        assert_eq!(attrs.title, "Real Title");
        assert_eq!(attrs.album, "Real Album");
        assert_eq!(attrs.track_number, 9);
        assert_eq!(attrs.total_tracks, 11);
        assert_eq!(attrs.album_artist.as_deref(), Some("Band"));
    }
}
