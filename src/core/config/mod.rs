//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! sitestore has two configuration scopes:
//! - **Global**: operator-level settings (tokens, lock directory, identity)
//! - **Site**: per-repository overrides kept in the site itself
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Site config file
//! 4. CLI flags (applied through [`Config::with_overrides`])
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$SITESTORE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/sitestore/config.toml`
//! 3. `~/.sitestore/config.toml`
//!
//! # Site Config Location
//!
//! `<repo>/.sitestore.toml`
//!
//! # Example
//!
//! ```no_run
//! use sitestore::core::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Some(Path::new("/srv/sites/my-site"))).unwrap();
//! println!("branch: {}", config.branch());
//! println!("backend: {}", config.backend().as_str());
//! ```

pub mod schema;

pub use schema::{
    BackendKind, CommitConfig, GithubConfig, LayoutConfig, LocalConfig, LockBackendKind,
    LockConfig, StoreConfig,
};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::paths::SiteLayout;

/// Default branch mutations target.
pub const DEFAULT_BRANCH: &str = "staging";

/// Default lease lifetime.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60);

/// Default GitHub API base URL.
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// File name of the per-site config.
pub const SITE_CONFIG_FILE: &str = ".sitestore.toml";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("missing required config value: {0}")]
    Missing(&'static str),
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence automatically: overrides, then the site
/// file, then the global file, then built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration.
    pub global: StoreConfig,
    /// Site configuration (if a site file was found).
    pub site: Option<StoreConfig>,
    /// Values supplied on the command line.
    pub overrides: StoreConfig,
    global_path: Option<PathBuf>,
    site_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `site_root` is provided, also loads `<site_root>/.sitestore.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or
    /// contain invalid values. Missing files are not an error.
    pub fn load(site_root: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(Self::find_global(), site_root)
    }

    /// Load configuration from an explicit global file path.
    pub fn load_with(
        global_path: Option<PathBuf>,
        site_root: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let global = match &global_path {
            Some(path) => Self::read_config(path)?,
            None => StoreConfig::default(),
        };

        let site_path = site_root
            .map(|root| root.join(SITE_CONFIG_FILE))
            .filter(|p| p.exists());
        let site = match &site_path {
            Some(path) => Some(Self::read_config(path)?),
            None => None,
        };

        global.validate()?;
        if let Some(ref s) = site {
            s.validate()?;
        }

        Ok(Config {
            global,
            site,
            overrides: StoreConfig::default(),
            global_path,
            site_path,
        })
    }

    /// Apply command-line overrides on top of the loaded files.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if an override is invalid.
    pub fn with_overrides(mut self, overrides: StoreConfig) -> Result<Self, ConfigError> {
        overrides.validate()?;
        self.overrides = overrides;
        Ok(self)
    }

    /// Locate the global config file, if one exists.
    fn find_global() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SITESTORE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("sitestore/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".sitestore/config.toml"))
            .filter(|p| p.exists())
    }

    fn read_config(path: &Path) -> Result<StoreConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// First value found walking overrides, site, global.
    fn pick<T>(&self, f: impl Fn(&StoreConfig) -> Option<T>) -> Option<T> {
        f(&self.overrides)
            .or_else(|| self.site.as_ref().and_then(&f))
            .or_else(|| f(&self.global))
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Branch mutations target. Defaults to `staging`.
    pub fn branch(&self) -> String {
        self.pick(|c| c.branch.clone())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
    }

    /// Object store backend. Defaults to `local`.
    pub fn backend(&self) -> BackendKind {
        self.pick(|c| c.backend).unwrap_or(BackendKind::Local)
    }

    /// Remote the local backend publishes to, if any.
    pub fn local_remote(&self) -> Option<String> {
        self.pick(|c| c.local.as_ref().and_then(|l| l.remote.clone()))
    }

    /// GitHub repository owner.
    pub fn github_owner(&self) -> Option<String> {
        self.pick(|c| c.github.as_ref().and_then(|g| g.owner.clone()))
    }

    /// GitHub repository name.
    pub fn github_repo(&self) -> Option<String> {
        self.pick(|c| c.github.as_ref().and_then(|g| g.repo.clone()))
    }

    /// GitHub API base URL. Defaults to `https://api.github.com`.
    pub fn github_api_base(&self) -> String {
        self.pick(|c| c.github.as_ref().and_then(|g| g.api_base.clone()))
            .unwrap_or_else(|| DEFAULT_GITHUB_API.to_string())
    }

    /// Environment variable carrying the GitHub token. Defaults to `GITHUB_TOKEN`.
    pub fn github_token_env(&self) -> String {
        self.pick(|c| c.github.as_ref().and_then(|g| g.token_env.clone()))
            .unwrap_or_else(|| "GITHUB_TOKEN".to_string())
    }

    /// Lock table backend. Defaults to `memory`.
    pub fn lock_backend(&self) -> LockBackendKind {
        self.pick(|c| c.lock.as_ref().and_then(|l| l.backend))
            .unwrap_or(LockBackendKind::Memory)
    }

    /// Directory for the file lock table. Defaults to `<tmp>/sitestore-locks`.
    pub fn lock_dir(&self) -> PathBuf {
        self.pick(|c| c.lock.as_ref().and_then(|l| l.dir.clone()))
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("sitestore-locks"))
    }

    /// Lease lifetime. Defaults to 60 seconds.
    pub fn lock_ttl(&self) -> Duration {
        self.pick(|c| c.lock.as_ref().and_then(|l| l.ttl_secs))
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LOCK_TTL)
    }

    /// Site layout with configured overrides applied.
    pub fn layout(&self) -> SiteLayout {
        let pages = self
            .pick(|c| c.layout.as_ref().and_then(|l| l.pages_dir.clone()))
            .unwrap_or_else(|| "pages".to_string());
        let room = self.pick(|c| c.layout.as_ref().and_then(|l| l.resource_room.clone()));
        SiteLayout::new(pages, room)
    }

    /// Commit author name. Defaults to `sitestore`.
    pub fn author_name(&self) -> String {
        self.pick(|c| c.commit.as_ref().and_then(|m| m.author_name.clone()))
            .unwrap_or_else(|| "sitestore".to_string())
    }

    /// Commit author email. Defaults to `sitestore@localhost`.
    pub fn author_email(&self) -> String {
        self.pick(|c| c.commit.as_ref().and_then(|m| m.author_email.clone()))
            .unwrap_or_else(|| "sitestore@localhost".to_string())
    }

    /// The fully resolved configuration, as it would be written to a file.
    pub fn effective(&self) -> StoreConfig {
        StoreConfig {
            branch: Some(self.branch()),
            backend: Some(self.backend()),
            local: Some(LocalConfig {
                remote: self.local_remote(),
            }),
            github: Some(GithubConfig {
                owner: self.github_owner(),
                repo: self.github_repo(),
                api_base: Some(self.github_api_base()),
                token_env: Some(self.github_token_env()),
            }),
            lock: Some(LockConfig {
                backend: Some(self.lock_backend()),
                dir: Some(self.lock_dir().display().to_string()),
                ttl_secs: Some(self.lock_ttl().as_secs()),
            }),
            layout: Some(LayoutConfig {
                pages_dir: self.layout().pages_dir().ok().map(String::from),
                resource_room: self
                    .layout()
                    .resource_room()
                    .and_then(|r| r.ok())
                    .map(String::from),
            }),
            commit: Some(CommitConfig {
                author_name: Some(self.author_name()),
                author_email: Some(self.author_email()),
            }),
        }
    }

    /// Path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Path to the loaded site config file.
    pub fn site_config_loaded_from(&self) -> Option<&Path> {
        self.site_path.as_deref()
    }
}
