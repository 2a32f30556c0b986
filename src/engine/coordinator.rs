//! engine::coordinator
//!
//! The fetch-mutate-commit-advance cycle shared by every mutation.
//!
//! # Design
//!
//! A [`Snapshot`] pins the branch tip and its recursive tree. Callers run
//! their checks against the snapshot, compute the new entry list, and hand
//! both back to [`CommitCoordinator::commit`], which writes the tree, creates
//! a commit whose parent is the snapshot's commit, and advances the branch
//! from that commit. If anything moved the branch in between, the advance
//! fails and the caller gets [`EngineError::Conflict`]; it must start over
//! from a fresh snapshot.
//!
//! # Failure classes
//!
//! | Step | Failure | Result |
//! |---|---|---|
//! | `put_tree` / `create_commit` | any | mapped store error, nothing moved |
//! | `advance_ref` | ref moved | `Conflict` |
//! | `advance_ref` | anything else | `NeedsRollback` |

use std::sync::Arc;

use tracing::{error, info, warn};

use super::EngineError;
use crate::core::types::{BranchName, Entry, Oid, RepoPath, Tree};
use crate::store::{ObjectStore, StoreError};

/// A pinned view of a branch: its tip commit and full recursive tree.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub branch: BranchName,
    pub commit: Oid,
    pub tree: Tree,
}

impl Snapshot {
    /// Blob-kind entries, the flat form every rewrite starts from.
    pub fn blob_entries(&self) -> Vec<Entry> {
        self.tree.blobs().cloned().collect()
    }
}

/// One edit to a flat entry list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Insert the entry, replacing any entry at the same path.
    Upsert(Entry),
    /// Drop the entry at this exact path.
    Remove(RepoPath),
}

/// Apply `changes` to `entries` in order.
pub fn merge_changes(mut entries: Vec<Entry>, changes: &[Change]) -> Vec<Entry> {
    for change in changes {
        match change {
            Change::Upsert(entry) => {
                entries.retain(|e| e.path != entry.path);
                entries.push(entry.clone());
            }
            Change::Remove(path) => entries.retain(|e| &e.path != path),
        }
    }
    entries
}

/// Drives commits against one object store.
#[derive(Clone)]
pub struct CommitCoordinator {
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for CommitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitCoordinator")
            .field("store", &self.store.name())
            .finish()
    }
}

impl CommitCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Pin the current tip of `branch` and read its recursive tree.
    pub async fn snapshot(&self, branch: &BranchName) -> Result<Snapshot, EngineError> {
        let commit = self.store.resolve_ref(branch).await?;
        let tree = self.store.get_tree(&commit, true).await?;
        Ok(Snapshot {
            branch: branch.clone(),
            commit,
            tree,
        })
    }

    /// Commit exactly `entries` on top of `snapshot` and advance its branch.
    ///
    /// Returns the new commit.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Conflict`] if the branch moved since the snapshot
    /// - [`EngineError::NeedsRollback`] if the commit exists but the branch
    ///   could not be advanced cleanly
    pub async fn commit(
        &self,
        snapshot: &Snapshot,
        entries: &[Entry],
        message: &str,
    ) -> Result<Oid, EngineError> {
        let branch = &snapshot.branch;
        let tree = self.store.put_tree(entries).await?;
        let commit = self
            .store
            .create_commit(&tree, Some(&snapshot.commit), message)
            .await?;

        match self.store.advance_ref(branch, &commit, &snapshot.commit).await {
            Ok(()) => {
                info!(%branch, commit = %commit.short(7), %message, "committed");
                Ok(commit)
            }
            Err(StoreError::Conflict(why)) => {
                warn!(%branch, base = %snapshot.commit.short(7), "lost ref race");
                Err(EngineError::Conflict(format!(
                    "{} moved while committing: {}",
                    branch, why
                )))
            }
            Err(e) => {
                let (attempted, message) = match e {
                    StoreError::PartiallyApplied { attempted, message } => (attempted, message),
                    other => (commit.to_string(), other.to_string()),
                };
                error!(
                    %branch,
                    %attempted,
                    base = %snapshot.commit.short(7),
                    error = %message,
                    "commit needs rollback"
                );
                Err(EngineError::NeedsRollback { attempted, message })
            }
        }
    }

    /// Apply `changes` on top of `snapshot`'s blobs and commit the result.
    pub async fn commit_changes(
        &self,
        snapshot: &Snapshot,
        changes: &[Change],
        message: &str,
    ) -> Result<Oid, EngineError> {
        let entries = merge_changes(snapshot.blob_entries(), changes);
        self.commit(snapshot, &entries, message).await
    }

    /// Snapshot `branch`, apply `changes`, and commit.
    pub async fn apply(
        &self,
        branch: &BranchName,
        changes: &[Change],
        message: &str,
    ) -> Result<Oid, EngineError> {
        let snapshot = self.snapshot(branch).await?;
        self.commit_changes(&snapshot, changes, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FailOn, MemoryStore};

    fn staging() -> BranchName {
        BranchName::new("staging").unwrap()
    }

    fn path(p: &str) -> RepoPath {
        RepoPath::new(p).unwrap()
    }

    fn coordinator(store: &MemoryStore) -> CommitCoordinator {
        CommitCoordinator::new(Arc::new(store.clone()))
    }

    // =========================================================================
    // merge_changes
    // =========================================================================

    mod merge {
        use super::*;

        fn oid(c: char) -> Oid {
            Oid::new(c.to_string().repeat(40)).unwrap()
        }

        #[test]
        fn upsert_replaces_same_path() {
            let entries = vec![Entry::blob(path("a.md"), oid('a'))];
            let merged = merge_changes(entries, &[Change::Upsert(Entry::blob(path("a.md"), oid('b')))]);
            assert_eq!(merged, vec![Entry::blob(path("a.md"), oid('b'))]);
        }

        #[test]
        fn remove_drops_exact_path_only() {
            let entries = vec![
                Entry::blob(path("a.md"), oid('a')),
                Entry::blob(path("a.md.bak"), oid('b')),
            ];
            let merged = merge_changes(entries, &[Change::Remove(path("a.md"))]);
            assert_eq!(merged, vec![Entry::blob(path("a.md.bak"), oid('b'))]);
        }
    }

    // =========================================================================
    // Commit cycle
    // =========================================================================

    mod cycle {
        use super::*;

        #[tokio::test]
        async fn apply_commits_on_tip() {
            let store = MemoryStore::with_files(&staging(), [("a.md", "A")]).unwrap();
            let blob = store.put_blob(&path("b.md"), b"B").await.unwrap();

            let commit = coordinator(&store)
                .apply(&staging(), &[Change::Upsert(Entry::blob(path("b.md"), blob))], "add b")
                .await
                .unwrap();

            assert_eq!(store.tip(&staging()), Some(commit));
            assert_eq!(store.file_at_tip(&staging(), "a.md"), Some(b"A".to_vec()));
            assert_eq!(store.file_at_tip(&staging(), "b.md"), Some(b"B".to_vec()));
            assert_eq!(store.history(&staging()), vec!["add b", "initial"]);
        }

        #[tokio::test]
        async fn lost_race_is_conflict_without_retry() {
            let store = MemoryStore::with_files(&staging(), [("a.md", "A")]).unwrap();
            let coordinator = coordinator(&store);
            let snapshot = coordinator.snapshot(&staging()).await.unwrap();

            store.interleave_commit([("other.md", "O")]).unwrap();
            store.clear_operations();
            let err = coordinator
                .commit_changes(&snapshot, &[Change::Remove(path("a.md"))], "remove a")
                .await
                .unwrap_err();

            assert!(matches!(err, EngineError::Conflict(_)));
            let advances = store
                .operations()
                .iter()
                .filter(|op| matches!(op, crate::store::StoreOperation::AdvanceRef { .. }))
                .count();
            assert_eq!(advances, 1);
            assert_eq!(store.file_at_tip(&staging(), "a.md"), Some(b"A".to_vec()));
        }

        #[tokio::test]
        async fn failed_advance_needs_rollback() {
            let store = MemoryStore::with_files(&staging(), [("a.md", "A")])
                .unwrap()
                .fail_on(FailOn::AdvanceRef(StoreError::Network("reset".into())));

            let err = coordinator(&store)
                .apply(&staging(), &[Change::Remove(path("a.md"))], "remove a")
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::NeedsRollback { .. }));
        }

        #[tokio::test]
        async fn partially_applied_needs_rollback() {
            let store = MemoryStore::with_files(&staging(), [("a.md", "A")])
                .unwrap()
                .fail_on(FailOn::AdvanceRef(StoreError::PartiallyApplied {
                    attempted: "abc".into(),
                    message: "push rejected".into(),
                }));

            let err = coordinator(&store)
                .apply(&staging(), &[Change::Remove(path("a.md"))], "remove a")
                .await
                .unwrap_err();
            match err {
                EngineError::NeedsRollback { attempted, .. } => assert_eq!(attempted, "abc"),
                other => panic!("expected NeedsRollback, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn failure_before_commit_is_store_error() {
            let store = MemoryStore::with_files(&staging(), [("a.md", "A")])
                .unwrap()
                .fail_on(FailOn::PutTree(StoreError::RateLimited));

            let err = coordinator(&store)
                .apply(&staging(), &[Change::Remove(path("a.md"))], "remove a")
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Store(StoreError::RateLimited)));
        }
    }
}
