//! music-catalog command-line entry point.

use clap::Parser;
use music_catalog::cli;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// `target:` names used by the library's log events.
const LOG_TARGETS: &[&str] = &["scanner", "schema", "identity", "linker", "cover", "rating"];

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // RUST_LOG wins; otherwise info for the crate and its log targets
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let mut filter = EnvFilter::new("warn").add_directive("music_catalog=info".parse()?);
            for target in LOG_TARGETS {
                filter = filter.add_directive(format!("{target}=info").parse()?);
            }
            filter
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
