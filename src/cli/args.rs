//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Use this site repository instead of the current directory
//! - `--branch <name>`: Target branch (overrides config)
//! - `--backend <local|github>`: Object store backend (overrides config)
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | success |
//! | 1 | any other error |
//! | 2 | not found |
//! | 3 | conflict |
//! | 4 | repository locked |
//! | 5 | needs rollback (run `sitestore repair`) |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::config::BackendKind;

/// sitestore - a git repository as a virtual file store for static sites
#[derive(Parser, Debug)]
#[command(name = "sitestore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use this site repository instead of the current directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Target branch (default from config, else `staging`)
    #[arg(long, global = true)]
    pub branch: Option<String>,

    /// Object store backend
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendArg>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Backend selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Local,
    Github,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Local => BackendKind::Local,
            BackendArg::Github => BackendKind::Github,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a file's content
    Read {
        /// Repository-relative path
        path: String,

        /// Print the blob hash instead of the content
        #[arg(long)]
        hash: bool,
    },

    /// Create or update a file
    #[command(after_help = "\
EXAMPLES:
    # Create or overwrite from stdin
    echo '# About' | sitestore write pages/about.md

    # Only update if nobody changed it since you read hash 3f2a...
    sitestore write pages/about.md --content '# About' --expect 3f2a...")]
    Write {
        /// Repository-relative path
        path: String,

        /// Content to write (read from stdin when omitted)
        #[arg(long)]
        content: Option<String>,

        /// Fail unless the file's current hash is this
        #[arg(long, value_name = "HASH")]
        expect: Option<String>,
    },

    /// Delete a file
    Rm {
        path: String,

        /// Fail unless the file's current hash is this
        #[arg(long, value_name = "HASH")]
        expect: Option<String>,
    },

    /// Rename a file in a single commit
    Mv {
        old: String,
        new: String,

        /// Fail unless the file's current hash is this
        #[arg(long, value_name = "HASH")]
        expect: Option<String>,
    },

    /// List a directory's direct children
    Ls {
        /// Directory (repository root when omitted)
        dir: Option<String>,
    },

    /// Delete a directory and everything below it
    Rmdir { dir: String },

    /// Rename a directory without rewriting its contents
    Mvdir { old: String, new: String },

    /// Inspect or edit a collection's display order
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },

    /// Reset a local clone after a commit that was applied but not published
    Repair,

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Ordered index subcommands.
#[derive(Subcommand, Debug)]
pub enum OrderAction {
    /// Print the order, one item per line
    Show { collection: String },

    /// Insert an item
    Add {
        collection: String,
        item: String,

        /// Insert at this position instead of the default placement
        #[arg(long)]
        index: Option<usize>,
    },

    /// Remove an item (no-op if absent)
    Remove { collection: String, item: String },

    /// Rename a subfolder prefix
    RenameSubfolder {
        collection: String,
        old: String,
        new: String,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}
