//! store::factory
//!
//! Construct the configured object store.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::github::GitHubStore;
use super::local::{GitRemoteUpstream, LocalStore};
use super::traits::{ObjectStore, StoreError};
use crate::core::config::{BackendKind, Config};
use crate::core::types::BranchName;
use crate::git::Identity;

/// Build the object store selected by `config`.
///
/// The local backend opens the repository at `site_root`; the GitHub backend
/// reads its token from the environment variable named in the config.
///
/// # Errors
///
/// - [`StoreError::Backend`] if `site_root` is not a git repository, or the
///   GitHub backend is selected without an owner and repository
pub fn open_store(config: &Config, site_root: &Path) -> Result<Arc<dyn ObjectStore>, StoreError> {
    let identity = identity(config);

    match config.backend() {
        BackendKind::Local => Ok(Arc::new(open_local_store(config, site_root)?)),
        BackendKind::Github => {
            let (owner, repo) = match (config.github_owner(), config.github_repo()) {
                (Some(owner), Some(repo)) => (owner, repo),
                _ => {
                    return Err(StoreError::Backend(
                        "github backend requires github.owner and github.repo".to_string(),
                    ))
                }
            };
            let token = std::env::var(config.github_token_env()).ok();
            if token.is_none() {
                debug!(env = %config.github_token_env(), "no GitHub token in environment");
            }
            let store = GitHubStore::new(token, owner, repo)
                .with_api_base(config.github_api_base())
                .with_identity(identity);
            Ok(Arc::new(store))
        }
    }
}

/// Open the local repository at `site_root` with its configured upstream.
///
/// # Errors
///
/// - [`StoreError::Backend`] if `site_root` is not a git repository
pub fn open_local_store(config: &Config, site_root: &Path) -> Result<LocalStore, StoreError> {
    let mut store = LocalStore::open(site_root)?.with_identity(identity(config));
    if let Some(remote) = config.local_remote() {
        debug!(%remote, "publishing to upstream");
        store = store.with_upstream(Arc::new(GitRemoteUpstream::open(site_root, remote)?));
    }
    if let Ok(branch) = BranchName::new(config.branch()) {
        if store.checks_out(&branch) {
            warn!(
                %branch,
                "branch is checked out here; its index and working tree will not follow new commits"
            );
        }
    }
    Ok(store)
}

fn identity(config: &Config) -> Identity {
    Identity {
        name: config.author_name(),
        email: config.author_email(),
    }
}
