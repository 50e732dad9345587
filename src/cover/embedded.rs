//! Pictures embedded in audio file tags.
//!
//! The tag reader hands over every picture of a tag; this module picks the
//! one the catalog uses: the front cover, else the first picture.

use lofty::picture::{MimeType, Picture, PictureType};

/// Raw embedded image bytes with their declared MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPicture {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Choose the picture to use from one tag.
///
/// Returns None for an empty slice or a picture with no data.
pub fn pick_picture(pictures: &[Picture]) -> Option<EmbeddedPicture> {
    let picture = pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())?;

    if picture.data().is_empty() {
        return None;
    }

    let mime_type = match picture.mime_type() {
        Some(MimeType::Jpeg) => "image/jpeg",
        Some(MimeType::Png) => "image/png",
        Some(MimeType::Gif) => "image/gif",
        Some(MimeType::Bmp) => "image/bmp",
        Some(MimeType::Tiff) => "image/tiff",
        _ => "image/jpeg",
    };

    Some(EmbeddedPicture {
        data: picture.data().to_vec(),
        mime_type: mime_type.to_string(),
    })
}
