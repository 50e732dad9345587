//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-catalog\config.toml
//! - macOS: ~/Library/Application Support/music-catalog/config.toml
//! - Linux: ~/.config/music-catalog/config.toml
//!
//! The file is read once at start-up, CLI flags are layered on top, and the
//! resulting [`Config`] is handed to [`crate::library::Catalog::new`]. Nothing
//! mutates it afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::identity::ConflictPolicy;

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "media.db";

/// Default media directory (relative to the working directory).
pub const DEFAULT_MEDIA_DIR: &str = "media";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the music lives and where the catalog is stored
    pub library: LibraryConfig,

    /// Scan behaviour
    pub scan: ScanConfig,
}

/// Library location settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root of the media tree to scan
    pub media_dir: PathBuf,

    /// SQLite database file
    pub database: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
            database: PathBuf::from(DEFAULT_DB_NAME),
        }
    }
}

/// Scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of files extracted concurrently on blocking workers
    pub workers: usize,

    /// Skip files whose modification time is unchanged since the last scan
    pub incremental: bool,

    /// What to do when reconciliation finds a non-bijective id mapping.
    /// `None` reports the conflict and leaves that key untouched.
    pub conflict_policy: Option<ConflictPolicy>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            incremental: true,
            conflict_policy: None,
        }
    }
}

impl Config {
    /// SQLite connection URL for the configured database file.
    pub fn db_url(&self) -> String {
        format!("sqlite:{}", self.library.database.display())
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-catalog"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::debug!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => {
            tracing::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            tracing::error!("Failed to load config file {:?}: {}", path, e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit path, failing on any error.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
    parse(&contents)
}

/// Parse configuration from TOML text.
pub fn parse(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(contents).map_err(ConfigError::Parse)?;
    if config.scan.workers == 0 {
        return Err(ConfigError::Invalid("scan.workers must be at least 1".into()));
    }
    Ok(config)
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        crate::error::Error::config(e.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
