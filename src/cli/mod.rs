//! cli
//!
//! Command-line interface layer for sitestore.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the tracing subscriber
//! - Build the configured store and services, then delegate to handlers
//! - Map engine outcomes to exit codes
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to the
//! [`crate::engine`] services. All repository state changes flow through
//! the engine's commit coordinator.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::engine::EngineError;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    let ctx = commands::Context::from_cli(&cli)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(commands::dispatch(cli.command, &ctx))
}

/// Install the global subscriber: `RUST_LOG` wins, else `warn` (`debug` with `--debug`).
fn init_logging(debug: bool) {
    let default = if debug { "sitestore=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Ignore a second install (tests may run `run` more than once).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Process exit code for an error returned by [`run`].
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::NotFound(_)) => 2,
        Some(EngineError::Conflict(_)) => 3,
        Some(EngineError::Locked { .. }) => 4,
        Some(EngineError::NeedsRollback { .. }) => 5,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        let err = anyhow::Error::new(EngineError::NotFound("a.md".into()));
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::Error::new(EngineError::Locked {
            repo: "site".into(),
        })
        .context("rmdir failed");
        assert_eq!(exit_code(&err), 4);

        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
