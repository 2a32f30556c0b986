//! core::config::schema
//!
//! Configuration schema types.
//!
//! The same schema is used for the global file and the per-site
//! `.sitestore.toml`; the site file wins key by key.
//!
//! # Validation
//!
//! Config values are validated after parsing: branch names must be valid
//! refnames and names must be non-empty. Whether the GitHub backend has an
//! owner and repository is only known after the scopes are merged, so that
//! check happens when the store is opened.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::{BranchName, RepoPath};

/// Object store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A git repository on local disk.
    Local,
    /// The GitHub git-data REST API.
    Github,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Github => "github",
        }
    }
}

/// Lock table backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackendKind {
    /// Process-local table; fine for a single instance.
    Memory,
    /// Lease files in a shared directory.
    File,
}

/// Store configuration, shared by the global and site scopes.
///
/// # Example
///
/// ```toml
/// branch = "staging"
/// backend = "github"
///
/// [local]
/// remote = "origin"
///
/// [github]
/// owner = "acme"
/// repo = "my-site"
/// token_env = "GITHUB_TOKEN"
///
/// [lock]
/// backend = "file"
/// dir = "/var/run/sitestore"
/// ttl_secs = 60
///
/// [layout]
/// pages_dir = "pages"
/// resource_room = "resources"
///
/// [commit]
/// author_name = "Site Bot"
/// author_email = "bot@example.com"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Branch that mutations target.
    pub branch: Option<String>,

    /// Which object store backend to use.
    pub backend: Option<BackendKind>,

    /// Local backend settings.
    pub local: Option<LocalConfig>,

    /// GitHub backend settings.
    pub github: Option<GithubConfig>,

    /// Repository lock settings.
    pub lock: Option<LockConfig>,

    /// Site layout overrides.
    pub layout: Option<LayoutConfig>,

    /// Commit identity.
    pub commit: Option<CommitConfig>,
}

impl StoreConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(branch) = &self.branch {
            BranchName::new(branch).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid branch name: {}", e))
            })?;
        }
        if let Some(local) = &self.local {
            local.validate()?;
        }
        if let Some(github) = &self.github {
            github.validate()?;
        }
        if let Some(lock) = &self.lock {
            lock.validate()?;
        }
        if let Some(layout) = &self.layout {
            layout.validate()?;
        }
        if let Some(commit) = &self.commit {
            commit.validate()?;
        }
        Ok(())
    }
}

/// Local backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LocalConfig {
    /// Remote every advanced branch is pushed to. Unset means no publishing.
    pub remote: Option<String>,
}

impl LocalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.as_deref() == Some("") {
            return Err(ConfigError::InvalidValue(
                "local.remote cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// GitHub backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GithubConfig {
    /// Repository owner or organization.
    pub owner: Option<String>,

    /// Repository name.
    pub repo: Option<String>,

    /// API base URL (default: `https://api.github.com`).
    pub api_base: Option<String>,

    /// Environment variable holding the access token (default: `GITHUB_TOKEN`).
    pub token_env: Option<String>,
}

impl GithubConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("github.owner", &self.owner),
            ("github.repo", &self.repo),
            ("github.token_env", &self.token_env),
        ] {
            if let Some(v) = value {
                if v.is_empty() || v.contains('/') {
                    return Err(ConfigError::InvalidValue(format!(
                        "{key} must be a non-empty name without '/'"
                    )));
                }
            }
        }
        if let Some(base) = &self.api_base {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "github.api_base must be an http(s) URL, got '{base}'"
                )));
            }
        }
        Ok(())
    }
}

/// Repository lock settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    /// Which lock table to use.
    pub backend: Option<LockBackendKind>,

    /// Shared directory for the file lock table.
    pub dir: Option<String>,

    /// Lease lifetime in seconds.
    pub ttl_secs: Option<u64>,
}

impl LockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "lock.ttl_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(dir) = &self.dir {
            if dir.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "lock.dir cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Site layout overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Directory holding standalone pages (default: `pages`).
    pub pages_dir: Option<String>,

    /// Top-level resource room directory.
    pub resource_room: Option<String>,
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("layout.pages_dir", &self.pages_dir),
            ("layout.resource_room", &self.resource_room),
        ] {
            if let Some(v) = value {
                RepoPath::new(v.clone())
                    .map_err(|e| ConfigError::InvalidValue(format!("{key}: {e}")))?;
            }
        }
        Ok(())
    }
}

/// Commit identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CommitConfig {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl CommitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(email) = &self.author_email {
            if !email.contains('@') {
                return Err(ConfigError::InvalidValue(format!(
                    "commit.author_email is not an email address: '{email}'"
                )));
            }
        }
        if self.author_name.as_deref() == Some("") {
            return Err(ConfigError::InvalidValue(
                "commit.author_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert!(config.branch.is_none());
        assert!(config.backend.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_example() {
        let toml = r#"
            branch = "staging"
            backend = "github"

            [github]
            owner = "acme"
            repo = "my-site"

            [lock]
            backend = "file"
            dir = "/tmp/locks"
            ttl_secs = 30

            [layout]
            resource_room = "resources"
        "#;
        let config: StoreConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.backend, Some(BackendKind::Github));
        assert_eq!(
            config.lock.as_ref().unwrap().backend,
            Some(LockBackendKind::File)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_branch() {
        let config = StoreConfig {
            branch: Some("invalid..name".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_rejected_at_parse() {
        let result: Result<StoreConfig, _> = toml::from_str("backend = \"svn\"");
        assert!(result.is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let toml = r#"
            branch = "main"
            unknown_field = true
        "#;
        let result: Result<StoreConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn zero_ttl_rejected() {
        let config = StoreConfig {
            lock: Some(LockConfig {
                ttl_secs: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn github_names_validated() {
        let config = GithubConfig {
            owner: Some("org/evil".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GithubConfig {
            api_base: Some("ftp://nope".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn layout_paths_validated() {
        let config = LayoutConfig {
            pages_dir: Some("../outside".to_string()),
            resource_room: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn commit_email_validated() {
        let config = CommitConfig {
            author_name: Some("Bot".to_string()),
            author_email: Some("not-an-email".to_string()),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn roundtrip() {
        let config = StoreConfig {
            branch: Some("main".to_string()),
            backend: Some(BackendKind::Local),
            local: Some(LocalConfig {
                remote: Some("origin".to_string()),
            }),
            github: None,
            lock: Some(LockConfig {
                backend: Some(LockBackendKind::Memory),
                dir: None,
                ttl_secs: Some(60),
            }),
            layout: None,
            commit: Some(CommitConfig {
                author_name: Some("Bot".to_string()),
                author_email: Some("bot@example.com".to_string()),
            }),
        };
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: StoreConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config, parsed);
    }
}
