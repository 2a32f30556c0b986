//! engine::directories
//!
//! Directory listing, delete and rename as whole-tree rewrites.
//!
//! # Design
//!
//! Git trees cannot be edited in place, so a directory operation reads the
//! recursive listing, builds a new flat entry list and commits it. Directory
//! entries are never carried over: they are re-derived from the blob paths,
//! except for the one subtree a rename re-points at its new path by hash,
//! which leaves every descendant blob untouched.
//!
//! Prefix matching is segment-aware: deleting `docs` never touches
//! `docs-old/`.
//!
//! Both mutations hold the repository lock for the whole cycle and fail fast
//! with [`EngineError::Locked`] if it is taken.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::coordinator::CommitCoordinator;
use super::files::ensure_vacant;
use super::EngineError;
use crate::core::types::{BranchName, DirEntry, Entry, RepoPath};
use crate::lock::{LockStore, RepoLock};
use crate::store::ObjectStore;

/// Acquires the repository lock for one repository.
#[derive(Clone)]
pub struct Locker {
    locks: Arc<dyn LockStore>,
    repo: String,
    ttl: Duration,
}

impl std::fmt::Debug for Locker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locker")
            .field("locks", &self.locks.name())
            .field("repo", &self.repo)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Locker {
    pub fn new(locks: Arc<dyn LockStore>, repo: impl Into<String>, ttl: Duration) -> Self {
        Self {
            locks,
            repo: repo.into(),
            ttl,
        }
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Take the repository lock, failing fast if it is held.
    pub fn acquire(&self) -> Result<RepoLock, EngineError> {
        Ok(RepoLock::acquire(self.locks.clone(), &self.repo, self.ttl)?)
    }
}

/// Directory operations on one branch.
#[derive(Debug, Clone)]
pub struct DirectoryService {
    coordinator: CommitCoordinator,
    branch: BranchName,
    locker: Locker,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn ObjectStore>, branch: BranchName, locker: Locker) -> Self {
        Self {
            coordinator: CommitCoordinator::new(store),
            branch,
            locker,
        }
    }

    /// Direct children of `dir` (the repository root when `None`), sorted by name.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if `dir` is not a directory
    pub async fn list(&self, dir: Option<&RepoPath>) -> Result<Vec<DirEntry>, EngineError> {
        let snapshot = self.coordinator.snapshot(&self.branch).await?;
        if let Some(dir) = dir {
            if !snapshot.tree.get(dir).is_some_and(|e| e.is_tree()) {
                return Err(EngineError::NotFound(dir.to_string()));
            }
        }

        let children: Vec<DirEntry> = snapshot
            .tree
            .entries
            .iter()
            .filter(|e| e.path.parent().as_ref() == dir)
            .map(|e| DirEntry {
                name: e.path.file_name().to_string(),
                path: e.path.clone(),
                kind: e.kind(),
                oid: e.oid.clone(),
            })
            .collect();
        debug!(dir = ?dir.map(|d| d.as_str()), children = children.len(), "listed directory");
        Ok(children)
    }

    /// Delete `dir` and everything below it, in one commit.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Locked`] if the repository lock is held
    /// - [`EngineError::NotFound`] if nothing lives below `dir`
    pub async fn delete(&self, dir: &RepoPath) -> Result<(), EngineError> {
        let _lock = self.locker.acquire()?;
        let snapshot = self.coordinator.snapshot(&self.branch).await?;
        if !snapshot.tree.has_children(dir) {
            return Err(EngineError::NotFound(dir.to_string()));
        }

        let entries = delete_entries(&snapshot.tree.entries, dir);
        self.coordinator
            .commit(&snapshot, &entries, &format!("Delete directory: {}", dir))
            .await?;
        Ok(())
    }

    /// Move `old` to `new` by re-pointing its subtree, in one commit.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Locked`] if the repository lock is held
    /// - [`EngineError::NotFound`] if `old` is not a directory
    /// - [`EngineError::Conflict`] if something exists at `new`, or one of
    ///   its parents is a file
    pub async fn rename(&self, old: &RepoPath, new: &RepoPath) -> Result<(), EngineError> {
        let _lock = self.locker.acquire()?;
        let snapshot = self.coordinator.snapshot(&self.branch).await?;
        let subtree = match snapshot.tree.get(old) {
            Some(e) if e.is_tree() => e.clone(),
            _ => return Err(EngineError::NotFound(old.to_string())),
        };
        ensure_vacant(&snapshot, new)?;

        let entries = rename_entries(&snapshot.tree.entries, &subtree, new);
        self.coordinator
            .commit(
                &snapshot,
                &entries,
                &format!("Rename directory: {} -> {}", old, new),
            )
            .await?;
        Ok(())
    }
}

/// Entries left after deleting `dir`: blobs outside it.
fn delete_entries(entries: &[Entry], dir: &RepoPath) -> Vec<Entry> {
    entries
        .iter()
        .filter(|e| e.is_blob() && !e.path.is_within(dir))
        .cloned()
        .collect()
}

/// Entries after moving `subtree` to `new`.
///
/// The subtree itself is re-emitted at `new` with its hash; anything at or
/// below its old path and every other directory entry is dropped.
fn rename_entries(entries: &[Entry], subtree: &Entry, new: &RepoPath) -> Vec<Entry> {
    let mut out: Vec<Entry> = entries
        .iter()
        .filter(|e| e.is_blob() && !e.path.is_at_or_within(&subtree.path))
        .cloned()
        .collect();
    out.push(Entry::tree(new.clone(), subtree.oid.clone()));
    out
}
