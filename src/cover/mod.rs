//! Album cover art resolution.
//!
//! Sources, in priority order:
//!
//! 1. **Embedded tags** - a picture stored in the audio file
//! 2. **Sidecar files** - a single image found next to the audio, or below it
//!
//! Resolved art is stored inline on the album row as a base64 data URI.

pub mod embedded;
pub mod resolver;
pub mod sidecar;

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub use embedded::EmbeddedPicture;
pub use resolver::CoverResolver;
pub use sidecar::SidecarOutcome;

/// Where the cover art came from
#[derive(Debug, Clone, PartialEq)]
pub enum CoverSource {
    /// Embedded in the audio file's tags
    Embedded,
    /// From an image file on disk
    Sidecar(PathBuf),
}

/// Cover art ready to be stored
#[derive(Debug, Clone)]
pub struct CoverArt {
    /// Raw image data
    pub data: Vec<u8>,
    /// MIME type (image/jpeg, image/png)
    pub mime_type: String,
    pub source: CoverSource,
}

impl CoverArt {
    /// Encode as `data:<mime>;base64,<payload>`.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            STANDARD.encode(&self.data)
        )
    }
}

impl From<EmbeddedPicture> for CoverArt {
    fn from(picture: EmbeddedPicture) -> Self {
        Self {
            data: picture.data,
            mime_type: picture.mime_type,
            source: CoverSource::Embedded,
        }
    }
}

/// MIME type for an image file extension.
pub fn mime_for_path(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_data_uri() {
        let cover = CoverArt {
            data: b"hello".to_vec(),
            mime_type: "image/jpeg".to_string(),
            source: CoverSource::Embedded,
        };
        assert_eq!(cover.to_data_uri(), "data:image/jpeg;base64,aGVsbG8=");
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("a/cover.JPEG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("a/cover.jpg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("a/Cover.PNG")), "image/png");
    }
}
