//! music-catalog - a self-hosted music catalog.
//!
//! Scans a media directory, extracts tags, resolves stable ids for albums,
//! artists, genres and organizations, attributes albums to artists, stores
//! album art inline, and ranks albums by pairwise comparison.

pub mod cli;
pub mod config;
pub mod cover;
pub mod db;
pub mod error;
pub mod library;
pub mod linker;
pub mod metadata;
pub mod model;
pub mod rating;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;

pub use error::{Error, Result};
pub use library::{Catalog, ScanEvent, ScanSummary};
