//! Command-line interface for music-catalog.
//!
//! Scans a media directory into the catalog and exposes the read queries and
//! the rating update as subcommands that print JSON.

mod commands;

pub use commands::{Cli, Commands, run_command};
