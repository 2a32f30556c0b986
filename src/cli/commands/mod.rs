//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Calls an engine service
//! 3. Formats and displays output
//!
//! Handlers do NOT touch the object store directly, except `repair`, which
//! only exists for the local backend.

mod config_cmd;
mod dirs;
mod files;
mod order;
mod repair;

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use super::args::{Cli, Command, ConfigAction, OrderAction};
use crate::core::config::{BackendKind, Config, StoreConfig};
use crate::core::types::{BranchName, RepoPath};
use crate::engine::{DirectoryService, FileService, Locker, OrderService};
use crate::lock::open_lock_store;
use crate::store::open_store;

/// Per-invocation settings resolved from flags and config files.
#[derive(Debug)]
pub struct Context {
    /// Site repository root.
    pub cwd: PathBuf,
    pub quiet: bool,
    pub config: Config,
}

impl Context {
    /// Resolve the working directory and load config with flag overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let cwd = match &cli.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let overrides = StoreConfig {
            branch: cli.branch.clone(),
            backend: cli.backend.map(BackendKind::from),
            ..Default::default()
        };
        let config = Config::load(Some(&cwd))
            .context("Failed to load config")?
            .with_overrides(overrides)
            .context("Invalid command-line override")?;
        Ok(Self {
            cwd,
            quiet: cli.quiet,
            config,
        })
    }

    pub fn branch(&self) -> Result<BranchName> {
        Ok(BranchName::new(self.config.branch())?)
    }

    /// Key the repository lock is taken under.
    pub fn lock_key(&self) -> String {
        match self.config.backend() {
            BackendKind::Github => format!(
                "github:{}/{}",
                self.config.github_owner().unwrap_or_default(),
                self.config.github_repo().unwrap_or_default()
            ),
            BackendKind::Local => {
                let root = self.cwd.canonicalize().unwrap_or_else(|_| self.cwd.clone());
                format!("local:{}", root.display())
            }
        }
    }

    /// Build the services for this invocation.
    pub fn session(&self) -> Result<Session> {
        let store = open_store(&self.config, &self.cwd).context("Failed to open store")?;
        let branch = self.branch()?;
        let locker = Locker::new(
            open_lock_store(&self.config),
            self.lock_key(),
            self.config.lock_ttl(),
        );
        let files = FileService::new(store.clone(), branch.clone());
        Ok(Session {
            directories: DirectoryService::new(store.clone(), branch, locker),
            orders: OrderService::new(files.clone(), self.config.layout()),
            files,
        })
    }
}

/// Services wired to the configured store.
pub struct Session {
    pub files: FileService,
    pub directories: DirectoryService,
    pub orders: OrderService,
}

/// Parse a repository-relative path argument.
pub(crate) fn repo_path(arg: &str) -> Result<RepoPath> {
    RepoPath::new(arg).with_context(|| format!("Invalid path '{}'", arg))
}

/// Run one command.
pub async fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Read { path, hash } => files::read(ctx, &path, hash).await,
        Command::Write {
            path,
            content,
            expect,
        } => files::write(ctx, &path, content, expect.as_deref()).await,
        Command::Rm { path, expect } => files::rm(ctx, &path, expect.as_deref()).await,
        Command::Mv { old, new, expect } => files::mv(ctx, &old, &new, expect.as_deref()).await,

        Command::Ls { dir } => dirs::ls(ctx, dir.as_deref()).await,
        Command::Rmdir { dir } => dirs::rmdir(ctx, &dir).await,
        Command::Mvdir { old, new } => dirs::mvdir(ctx, &old, &new).await,

        Command::Order { action } => match action {
            OrderAction::Show { collection } => order::show(ctx, &collection).await,
            OrderAction::Add {
                collection,
                item,
                index,
            } => order::add(ctx, &collection, &item, index).await,
            OrderAction::Remove { collection, item } => {
                order::remove(ctx, &collection, &item).await
            }
            OrderAction::RenameSubfolder {
                collection,
                old,
                new,
            } => order::rename_subfolder(ctx, &collection, &old, &new).await,
        },

        Command::Repair => repair::repair(ctx).await,
        Command::Config { action } => match action {
            ConfigAction::Show => config_cmd::show(ctx),
        },
    }
}
