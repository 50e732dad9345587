//! Catalog-wide error types.
//!
//! Library modules return [`Result`] with the [`Error`] enum defined here;
//! the CLI and `main` wrap these in `anyhow` for convenient propagation.
//!
//! # Propagation
//!
//! - [`ExtractionError`] and [`Error::ArtResolutionAmbiguous`] are per-file:
//!   the scan pipeline logs them, counts them, and moves on.
//! - [`Error::IdentityConflict`] stops reconciliation for one key type only.
//! - [`Error::SchemaMissingTable`] aborts the current scan.
//! - [`Error::NotFound`] and [`Error::BadRequest`] are query-boundary results
//!   that a transport layer maps to 404 / 400.

use std::path::PathBuf;

use crate::db::identity::KeyType;

/// Catalog-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single file could not be turned into a canonical attribute map.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// Extension outside the supported set.
    #[error("Unsupported format for {path}: extension must be one of mp3, flac, wav, m4a")]
    UnsupportedFormat { path: PathBuf },

    /// The file could not be opened or its container could not be parsed.
    #[error("Failed to read {path}: {message}")]
    ReadError { path: PathBuf, message: String },
}

impl ExtractionError {
    /// Path of the file that failed.
    pub fn path(&self) -> &std::path::Path {
        match self {
            ExtractionError::UnsupportedFormat { path } => path,
            ExtractionError::ReadError { path, .. } => path,
        }
    }
}

/// Top-level catalog error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Tag extraction failed for one file
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// More than one cover art candidate was found for a directory subtree
    #[error("Ambiguous album art under {dir}: {} candidates", candidates.len())]
    ArtResolutionAmbiguous {
        dir: PathBuf,
        candidates: Vec<PathBuf>,
    },

    /// A value/ID pairing violates the one-value-one-ID rule
    #[error(
        "Identity conflict for {key}: values with several ids {duplicate_values:?}, ids with several values {duplicate_ids:?}"
    )]
    IdentityConflict {
        key: KeyType,
        duplicate_values: Vec<String>,
        duplicate_ids: Vec<i64>,
    },

    /// The catalog was never initialized
    #[error("Table {0} does not exist; the catalog has not been initialized")]
    SchemaMissingTable(&'static str),

    /// Unknown track or album id
    #[error("{entity} not found: {ids:?}")]
    NotFound { entity: &'static str, ids: Vec<i64> },

    /// Malformed request at the query boundary
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Another scan holds the scan lock
    #[error("A scan is already running against this catalog")]
    ScanInProgress,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not found error for a single id.
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound {
            entity,
            ids: vec![id],
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// True for errors a transport layer should report as "not found".
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}
