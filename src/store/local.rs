//! store::local
//!
//! Object store backed by a git repository on local disk.
//!
//! # Architecture
//!
//! `LocalStore` talks to the repository exclusively through [`Git`]. The
//! repository handle sits behind a mutex; no lock guard is held across an
//! `.await`.
//!
//! A local clone may publish every ref advance to an [`Upstream`]. The
//! upstream is authoritative: resolving a branch first fetches it and
//! fast-forwards the local ref, and an advance is refused with
//! [`StoreError::Conflict`] when the upstream tip is not the one the caller
//! built on. Publishing happens after the local ref moved, so a failed
//! publish leaves the clone ahead of its remote. That state is recorded in a
//! needs-repair marker at `<git_dir>/sitestore/needs-repair.json` (and in
//! memory, should the marker fail to write) and reported as
//! [`StoreError::PartiallyApplied`].
//!
//! The store moves refs only. In a repository with a working directory, the
//! index and files of a checked-out branch are not updated, so the branch
//! served should not be the one checked out; a bare clone is the usual
//! setup.
//!
//! # Invariants
//!
//! - Every ref move is a fast-forward CAS from the caller's expected tip
//! - While a repair is pending, every operation fails with
//!   [`StoreError::NeedsRepair`]
//! - [`LocalStore::repair`] resets the branch to the upstream's current tip
//!   (or, without a reachable upstream, the recorded pre-operation tip) and
//!   only then clears the marker
//!
//! # Example
//!
//! ```ignore
//! use sitestore::store::local::{GitRemoteUpstream, LocalStore};
//! use std::sync::Arc;
//!
//! let upstream = Arc::new(GitRemoteUpstream::open(path, "origin")?);
//! let store = LocalStore::open(path)?.with_upstream(upstream);
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::traits::{ObjectStore, StoreError};
use crate::core::paths::StorePaths;
use crate::core::tree::{build_tree, walk_tree};
use crate::core::types::{BranchName, Entry, EntryMode, File, Oid, RepoPath, Tree};
use crate::git::{Git, GitError, Identity};

impl From<GitError> for StoreError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::RefNotFound { refname } => StoreError::NotFound(refname),
            GitError::ObjectNotFound { oid } => StoreError::NotFound(oid),
            e @ (GitError::CasFailed { .. } | GitError::NotFastForward { .. }) => {
                StoreError::Conflict(e.to_string())
            }
            GitError::PushRejected { .. } | GitError::FetchFailed { .. } => {
                StoreError::Network(err.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Where a local clone publishes its branch after every advance.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Make `tip` the published value of `branch`.
    async fn publish(&self, branch: &BranchName, tip: &Oid) -> Result<(), StoreError>;

    /// Bring the upstream's `branch` into the local object database.
    ///
    /// Returns the published tip, or `None` if the upstream has no such
    /// branch.
    async fn fetch(&self, branch: &BranchName) -> Result<Option<Oid>, StoreError>;
}

/// Publishes by pushing the branch to a git remote of the same repository.
pub struct GitRemoteUpstream {
    git: Mutex<Git>,
    remote: String,
}

impl GitRemoteUpstream {
    /// Open the repository at `path` and push to its remote named `remote`.
    pub fn open(path: &Path, remote: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            git: Mutex::new(Git::open(path)?),
            remote: remote.into(),
        })
    }
}

#[async_trait]
impl Upstream for GitRemoteUpstream {
    fn name(&self) -> &str {
        &self.remote
    }

    async fn publish(&self, branch: &BranchName, tip: &Oid) -> Result<(), StoreError> {
        debug!(remote = %self.remote, %branch, tip = %tip.short(7), "pushing");
        let git = self.git.lock().unwrap_or_else(|e| e.into_inner());
        git.push_ref(&self.remote, &branch.ref_name())
            .map_err(StoreError::from)
    }

    async fn fetch(&self, branch: &BranchName) -> Result<Option<Oid>, StoreError> {
        let git = self.git.lock().unwrap_or_else(|e| e.into_inner());
        let tip = git.fetch_ref(&self.remote, &branch.ref_name())?;
        debug!(remote = %self.remote, %branch, tip = ?tip.as_ref().map(|t| t.short(7)), "fetched");
        Ok(tip)
    }
}

/// Record of a commit that advanced locally but was never published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairMarker {
    /// Branch that was advanced.
    pub branch: BranchName,
    /// Tip before the operation.
    pub previous: Oid,
    /// Tip the branch was moved to locally.
    pub attempted: Oid,
    /// Why publishing failed.
    pub error: String,
    /// When the marker was written.
    pub recorded_at: DateTime<Utc>,
}

impl RepairMarker {
    /// Read the marker, if it exists.
    pub fn read(paths: &StorePaths) -> Result<Option<Self>, StoreError> {
        let path = paths.needs_repair_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| StoreError::Backend(format!("{}: {}", path.display(), e)))?;
        let marker = serde_json::from_str(&content)
            .map_err(|e| StoreError::Backend(format!("{}: {}", path.display(), e)))?;
        Ok(Some(marker))
    }

    /// Write the marker to disk.
    pub fn write(&self, paths: &StorePaths) -> Result<(), StoreError> {
        let io = |e: std::io::Error| StoreError::Backend(e.to_string());
        fs::create_dir_all(paths.store_dir()).map_err(io)?;

        let content =
            serde_json::to_string_pretty(self).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(paths.needs_repair_path())
            .map_err(io)?;
        file.write_all(content.as_bytes()).map_err(io)?;
        file.sync_all().map_err(io)?;
        Ok(())
    }

    /// Remove the marker.
    pub fn remove(paths: &StorePaths) -> Result<(), StoreError> {
        let path = paths.needs_repair_path();
        if path.exists() {
            fs::remove_file(&path).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}

/// A repair that [`LocalStore::repair`] carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub marker: RepairMarker,
    /// Tip the branch was reset to.
    pub restored: Oid,
}

/// Object store over a local git repository.
pub struct LocalStore {
    git: Arc<Mutex<Git>>,
    paths: StorePaths,
    identity: Identity,
    upstream: Option<Arc<dyn Upstream>>,
    pending: Mutex<Option<RepairMarker>>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("paths", &self.paths)
            .field("identity", &self.identity)
            .field("upstream", &self.upstream.as_ref().map(|u| u.name().to_string()))
            .finish()
    }
}

impl LocalStore {
    /// Open the repository at `path` (bare or with a working directory).
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let git = Git::open(path)?;
        let paths = StorePaths::new(git.git_dir().to_path_buf());
        Ok(Self {
            git: Arc::new(Mutex::new(git)),
            paths,
            identity: Identity::default(),
            upstream: None,
            pending: Mutex::new(None),
        })
    }

    /// Use `identity` as author and committer of new commits.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Publish every ref advance to `upstream`.
    pub fn with_upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Use `paths` for on-disk bookkeeping instead of `<git_dir>/sitestore`.
    pub fn with_paths(mut self, paths: StorePaths) -> Self {
        self.paths = paths;
        self
    }

    /// On-disk bookkeeping locations.
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Whether `branch` is checked out in this repository's working directory.
    pub fn checks_out(&self, branch: &BranchName) -> bool {
        self.git().checked_out_ref().as_deref() == Some(branch.ref_name().as_str())
    }

    /// The pending repair, if any.
    pub fn needs_repair(&self) -> Result<Option<RepairMarker>, StoreError> {
        if let Some(marker) = self.pending().clone() {
            return Ok(Some(marker));
        }
        RepairMarker::read(&self.paths)
    }

    /// Undo a partially applied commit.
    ///
    /// Resets the branch to the upstream's current tip, which keeps the
    /// commit if the publish did land and picks up whatever other writers
    /// published meanwhile. Without an upstream, or when it cannot be
    /// reached, the branch goes back to the tip recorded before the failed
    /// operation. Returns `None` if there was nothing to repair.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] if the branch moved since the marker was
    ///   written; the marker is kept
    pub async fn repair(&self) -> Result<Option<Repaired>, StoreError> {
        let Some(marker) = self.needs_repair()? else {
            return Ok(None);
        };

        let published = match &self.upstream {
            Some(upstream) => match upstream.fetch(&marker.branch).await {
                Ok(tip) => tip,
                Err(e) => {
                    warn!(upstream = upstream.name(), error = %e, "upstream unreachable, rewinding to previous tip");
                    None
                }
            },
            None => None,
        };
        let restored = published.unwrap_or_else(|| marker.previous.clone());

        {
            let git = self.git();
            git.rewind_ref_cas(
                &marker.branch.ref_name(),
                &restored,
                &marker.attempted,
                "sitestore: repair partially applied commit",
            )?;
        }
        RepairMarker::remove(&self.paths)?;
        *self.pending() = None;

        info!(
            branch = %marker.branch,
            restored = %restored.short(7),
            discarded = %marker.attempted.short(7),
            "repaired partially applied commit"
        );
        Ok(Some(Repaired { marker, restored }))
    }

    fn git(&self) -> MutexGuard<'_, Git> {
        self.git.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pending(&self) -> MutexGuard<'_, Option<RepairMarker>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_healthy(&self) -> Result<(), StoreError> {
        match self.needs_repair()? {
            Some(marker) => Err(StoreError::NeedsRepair(format!(
                "{} was advanced to {} but never published: {}",
                marker.branch,
                marker.attempted.short(7),
                marker.error
            ))),
            None => Ok(()),
        }
    }

    /// Fast-forward the local branch to the upstream's tip.
    ///
    /// A local branch that is ahead of or diverged from the upstream is left
    /// alone; [`ObjectStore::advance_ref`] refuses to build on it.
    async fn sync_from(&self, upstream: &dyn Upstream, branch: &BranchName) -> Result<(), StoreError> {
        let Some(published) = upstream.fetch(branch).await? else {
            return Ok(());
        };
        let refname = branch.ref_name();
        let git = self.git();
        match git.try_resolve_ref(&refname)? {
            None => git.create_ref(&refname, &published, "sitestore: sync from upstream")?,
            Some(local) if local == published => {}
            Some(local) if git.is_ancestor(&local, &published)? => {
                git.update_ref_cas(&refname, &published, &local, "sitestore: sync from upstream")?;
                debug!(%branch, from = %local.short(7), to = %published.short(7), "fast-forwarded from upstream");
            }
            Some(local) => {
                warn!(%branch, local = %local.short(7), upstream = %published.short(7), "local branch is not behind upstream, not syncing");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn resolve_ref(&self, branch: &BranchName) -> Result<Oid, StoreError> {
        self.ensure_healthy()?;
        if let Some(upstream) = &self.upstream {
            // A stale read is refused later by the upstream check in advance_ref
            if let Err(e) = self.sync_from(upstream.as_ref(), branch).await {
                warn!(%branch, upstream = upstream.name(), error = %e, "could not sync from upstream, using local tip");
            }
        }
        let git = self.git();
        let oid = git.resolve_ref(&branch.ref_name())?;
        debug!(%branch, tip = %oid.short(7), "resolved ref");
        Ok(oid)
    }

    async fn get_blob(&self, at_commit: &Oid, path: &RepoPath) -> Result<File, StoreError> {
        self.ensure_healthy()?;
        let git = self.git();
        let root = git.commit_tree(at_commit)?;
        let oid = match git.tree_entry(&root, path)? {
            Some((mode, oid)) if mode != EntryMode::Directory => oid,
            _ => return Err(StoreError::NotFound(path.to_string())),
        };
        let content = git.read_blob(&oid)?;
        debug!(%path, oid = %oid.short(7), bytes = content.len(), "read blob");
        Ok(File {
            path: path.clone(),
            content,
            oid,
        })
    }

    async fn put_blob(&self, path: &RepoPath, content: &[u8]) -> Result<Oid, StoreError> {
        self.ensure_healthy()?;
        let oid = self.git().write_blob(content)?;
        debug!(%path, oid = %oid.short(7), "wrote blob");
        Ok(oid)
    }

    async fn get_tree(&self, commit: &Oid, recursive: bool) -> Result<Tree, StoreError> {
        self.ensure_healthy()?;
        let mut git = self.git();
        let root = git.commit_tree(commit)?;
        let entries = walk_tree(&mut *git, &root, recursive)?
            .into_iter()
            .map(|(path, mode, oid)| -> Result<Entry, StoreError> {
                Ok(Entry {
                    path: RepoPath::new(path)?,
                    mode,
                    oid,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(commit = %commit.short(7), entries = entries.len(), "read tree");
        Ok(Tree::new(commit.clone(), root, entries))
    }

    async fn put_tree(&self, entries: &[Entry]) -> Result<Oid, StoreError> {
        self.ensure_healthy()?;
        let mut git = self.git();
        let oid = build_tree(&mut *git, entries)?;
        debug!(tree = %oid.short(7), entries = entries.len(), "wrote tree");
        Ok(oid)
    }

    async fn create_commit(
        &self,
        tree: &Oid,
        parent: Option<&Oid>,
        message: &str,
    ) -> Result<Oid, StoreError> {
        self.ensure_healthy()?;
        let oid = self
            .git()
            .create_commit(tree, parent, message, &self.identity)?;
        debug!(commit = %oid.short(7), "created commit");
        Ok(oid)
    }

    async fn advance_ref(
        &self,
        branch: &BranchName,
        new: &Oid,
        expected_old: &Oid,
    ) -> Result<(), StoreError> {
        self.ensure_healthy()?;
        if let Some(upstream) = &self.upstream {
            if let Some(published) = upstream.fetch(branch).await? {
                if !self.git().is_ancestor(&published, expected_old)? {
                    warn!(%branch, upstream = upstream.name(), published = %published.short(7), "upstream moved, not advancing");
                    return Err(StoreError::Conflict(format!(
                        "{} is at {} on {}, expected {}",
                        branch,
                        published.short(7),
                        upstream.name(),
                        expected_old.short(7)
                    )));
                }
            }
        }
        {
            let git = self.git();
            if let Err(e) = git.update_ref_cas(
                &branch.ref_name(),
                new,
                expected_old,
                "sitestore: advance",
            ) {
                let err = StoreError::from(e);
                if matches!(err, StoreError::Conflict(_)) {
                    warn!(%branch, expected = %expected_old.short(7), "ref moved, not advancing");
                }
                return Err(err);
            }
        }
        info!(%branch, from = %expected_old.short(7), to = %new.short(7), "advanced ref");

        let Some(upstream) = &self.upstream else {
            return Ok(());
        };

        if let Err(e) = upstream.publish(branch, new).await {
            let marker = RepairMarker {
                branch: branch.clone(),
                previous: expected_old.clone(),
                attempted: new.clone(),
                error: e.to_string(),
                recorded_at: Utc::now(),
            };
            if let Err(write_err) = marker.write(&self.paths) {
                error!(error = %write_err, "failed to record needs-repair marker, holding it in memory");
            }
            *self.pending() = Some(marker);
            error!(
                %branch,
                upstream = upstream.name(),
                error = %e,
                "advanced locally but publishing failed"
            );
            return Err(StoreError::PartiallyApplied {
                attempted: new.to_string(),
                message: e.to_string(),
            });
        }
        info!(%branch, upstream = upstream.name(), "published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn marker() -> RepairMarker {
        RepairMarker {
            branch: BranchName::new("staging").unwrap(),
            previous: Oid::new("a".repeat(40)).unwrap(),
            attempted: Oid::new("b".repeat(40)).unwrap(),
            error: "push rejected".to_string(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn marker_roundtrip() {
        let temp = TempDir::new().unwrap();
        let paths = StorePaths::new(temp.path().to_path_buf());

        assert!(RepairMarker::read(&paths).unwrap().is_none());

        let m = marker();
        m.write(&paths).unwrap();
        assert_eq!(RepairMarker::read(&paths).unwrap(), Some(m));

        RepairMarker::remove(&paths).unwrap();
        assert!(RepairMarker::read(&paths).unwrap().is_none());
        // Removing twice is fine
        RepairMarker::remove(&paths).unwrap();
    }

    #[test]
    fn git_errors_map_to_store_errors() {
        let err: StoreError = GitError::RefNotFound {
            refname: "refs/heads/x".into(),
        }
        .into();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err: StoreError = GitError::CasFailed {
            refname: "refs/heads/x".into(),
            expected: "a".into(),
            actual: "b".into(),
        }
        .into();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err: StoreError = GitError::FetchFailed {
            remote: "origin".into(),
            message: "unreachable".into(),
        }
        .into();
        assert!(matches!(err, StoreError::Network(_)));

        let err: StoreError = GitError::Internal {
            message: "boom".into(),
        }
        .into();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn open_rejects_non_repo() {
        let temp = TempDir::new().unwrap();
        assert!(LocalStore::open(temp.path()).is_err());
    }
}
