//! Core data models for the catalog.
//!
//! These map rows of the `music` table through SQLx's `FromRow`. Column names follow the table layout, which is why the
//! numeric track fields are spelled `tracknumber`, `discnumber` and so on.

use serde::Serialize;
use sqlx::FromRow;

/// A track (audio file) in the catalog.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Track {
    pub id: i64,
    /// Absolute file path (unique identifier)
    pub file_path: String,
    pub title: Option<String>,
    /// Comma-joined artist text as tagged
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_id: Option<i64>,
    pub genre: Option<String>,
    pub genre_id: Option<i64>,
    pub organization: Option<String>,
    pub organization_id: Option<i64>,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub tracknumber: Option<i64>,
    pub totaltracks: Option<i64>,
    pub discnumber: Option<i64>,
    pub totaldiscs: Option<i64>,
    pub albumartist: Option<String>,
    pub composer: Option<String>,
    pub date: Option<String>,
    /// File modification time (seconds since the epoch) at the last scan
    pub mtime: Option<i64>,
    pub scanned_at: Option<String>,
}
