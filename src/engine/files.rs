//! engine::files
//!
//! Single-file operations with optimistic concurrency tokens.
//!
//! # Design
//!
//! Each mutation is one commit built on one snapshot. The blob hash a caller
//! read is its concurrency token: `update`, `delete` and `rename` accept an
//! optional expected hash and fail with `Conflict` if the file changed since.
//! Callers that pass `None` overwrite unconditionally. Even then, a write
//! racing another commit fails at the ref advance rather than clobbering it.
//!
//! No file operation takes the repository lock.

use std::sync::Arc;

use tracing::debug;

use super::coordinator::{Change, CommitCoordinator, Snapshot};
use super::EngineError;
use crate::core::types::{BranchName, Entry, File, Oid, RepoPath};
use crate::store::ObjectStore;

/// Single-file create/read/update/delete/rename on one branch.
#[derive(Debug, Clone)]
pub struct FileService {
    coordinator: CommitCoordinator,
    branch: BranchName,
}

impl FileService {
    pub fn new(store: Arc<dyn ObjectStore>, branch: BranchName) -> Self {
        Self {
            coordinator: CommitCoordinator::new(store),
            branch,
        }
    }

    pub fn branch(&self) -> &BranchName {
        &self.branch
    }

    pub fn coordinator(&self) -> &CommitCoordinator {
        &self.coordinator
    }

    /// Create a file. Returns the new blob hash.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Conflict`] if anything already exists at `path`, or
    ///   one of its parents is a file
    pub async fn create(&self, path: &RepoPath, content: &[u8]) -> Result<Oid, EngineError> {
        let snapshot = self.coordinator.snapshot(&self.branch).await?;
        ensure_vacant(&snapshot, path)?;

        let oid = self.coordinator.store().put_blob(path, content).await?;
        self.coordinator
            .commit_changes(
                &snapshot,
                &[Change::Upsert(Entry::blob(path.clone(), oid.clone()))],
                &format!("Create file: {}", path),
            )
            .await?;
        Ok(oid)
    }

    /// Read a file and its current blob hash.
    pub async fn read(&self, path: &RepoPath) -> Result<File, EngineError> {
        let tip = self.coordinator.store().resolve_ref(&self.branch).await?;
        let file = self.coordinator.store().get_blob(&tip, path).await?;
        debug!(%path, oid = %file.oid.short(7), "read file");
        Ok(file)
    }

    /// Replace a file's content, keeping its mode. Returns the new blob hash.
    ///
    /// Writing identical content creates no commit.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if no file exists at `path`
    /// - [`EngineError::Conflict`] if `expected` is given and stale
    pub async fn update(
        &self,
        path: &RepoPath,
        content: &[u8],
        expected: Option<&Oid>,
    ) -> Result<Oid, EngineError> {
        let snapshot = self.coordinator.snapshot(&self.branch).await?;
        let current = existing_file(&snapshot, path, expected)?;

        let oid = self.coordinator.store().put_blob(path, content).await?;
        if oid == current.oid {
            debug!(%path, "content unchanged, nothing to commit");
            return Ok(oid);
        }
        let entry = Entry {
            path: path.clone(),
            mode: current.mode,
            oid: oid.clone(),
        };
        self.coordinator
            .commit_changes(
                &snapshot,
                &[Change::Upsert(entry)],
                &format!("Update file: {}", path),
            )
            .await?;
        Ok(oid)
    }

    /// Delete a file.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if no file exists at `path`
    /// - [`EngineError::Conflict`] if `expected` is given and stale
    pub async fn delete(&self, path: &RepoPath, expected: Option<&Oid>) -> Result<(), EngineError> {
        let snapshot = self.coordinator.snapshot(&self.branch).await?;
        existing_file(&snapshot, path, expected)?;

        self.coordinator
            .commit_changes(
                &snapshot,
                &[Change::Remove(path.clone())],
                &format!("Delete file: {}", path),
            )
            .await?;
        Ok(())
    }

    /// Move a file to `new` with `content`, in a single commit.
    ///
    /// Returns the blob hash at `new`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if no file exists at `old`
    /// - [`EngineError::Conflict`] if something exists at `new`, or
    ///   `expected` is given and stale
    pub async fn rename(
        &self,
        old: &RepoPath,
        new: &RepoPath,
        content: &[u8],
        expected: Option<&Oid>,
    ) -> Result<Oid, EngineError> {
        let snapshot = self.coordinator.snapshot(&self.branch).await?;
        let current = existing_file(&snapshot, old, expected)?;
        ensure_vacant(&snapshot, new)?;

        let oid = self.coordinator.store().put_blob(new, content).await?;
        let entry = Entry {
            path: new.clone(),
            mode: current.mode,
            oid: oid.clone(),
        };
        self.coordinator
            .commit_changes(
                &snapshot,
                &[Change::Remove(old.clone()), Change::Upsert(entry)],
                &format!("Rename file: {} -> {}", old, new),
            )
            .await?;
        Ok(oid)
    }
}

/// The blob entry at `path`, checked against the caller's token.
fn existing_file(
    snapshot: &Snapshot,
    path: &RepoPath,
    expected: Option<&Oid>,
) -> Result<Entry, EngineError> {
    let current = snapshot
        .tree
        .blob(path)
        .cloned()
        .ok_or_else(|| EngineError::NotFound(path.to_string()))?;
    if let Some(expected) = expected {
        if expected != &current.oid {
            return Err(EngineError::Conflict(format!(
                "{} changed since it was read (expected {}, found {})",
                path,
                expected.short(7),
                current.oid.short(7)
            )));
        }
    }
    Ok(current)
}

/// Fail unless `path` is free and no parent of it is a file.
pub(crate) fn ensure_vacant(snapshot: &Snapshot, path: &RepoPath) -> Result<(), EngineError> {
    if snapshot.tree.occupies(path) {
        return Err(EngineError::Conflict(format!("{} already exists", path)));
    }
    let mut parent = path.parent();
    while let Some(dir) = parent {
        if snapshot.tree.blob(&dir).is_some() {
            return Err(EngineError::Conflict(format!("{} is a file", dir)));
        }
        parent = dir.parent();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreOperation};

    fn staging() -> BranchName {
        BranchName::new("staging").unwrap()
    }

    fn path(p: &str) -> RepoPath {
        RepoPath::new(p).unwrap()
    }

    fn service(store: &MemoryStore) -> FileService {
        FileService::new(Arc::new(store.clone()), staging())
    }

    fn seeded() -> MemoryStore {
        MemoryStore::with_files(
            &staging(),
            [("pages/about.md", "about"), ("_posts/a.md", "post")],
        )
        .unwrap()
    }

    // =========================================================================
    // create / read
    // =========================================================================

    mod create {
        use super::*;

        #[tokio::test]
        async fn round_trip_with_stable_hash() {
            let store = seeded();
            let files = service(&store);

            let oid = files.create(&path("pages/new.md"), b"hello").await.unwrap();
            let first = files.read(&path("pages/new.md")).await.unwrap();
            let second = files.read(&path("pages/new.md")).await.unwrap();

            assert_eq!(first.content, b"hello");
            assert_eq!(first.oid, oid);
            assert_eq!(second.oid, oid);
        }

        #[tokio::test]
        async fn existing_file_conflicts() {
            let store = seeded();
            let err = service(&store)
                .create(&path("pages/about.md"), b"x")
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Conflict(_)));
        }

        #[tokio::test]
        async fn existing_directory_conflicts() {
            let store = seeded();
            let err = service(&store).create(&path("pages"), b"x").await.unwrap_err();
            assert!(matches!(err, EngineError::Conflict(_)));
        }

        #[tokio::test]
        async fn file_as_parent_conflicts() {
            let store = seeded();
            let err = service(&store)
                .create(&path("pages/about.md/child.md"), b"x")
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Conflict(_)));
        }

        #[tokio::test]
        async fn read_missing_is_not_found() {
            let store = seeded();
            let err = service(&store).read(&path("nope.md")).await.unwrap_err();
            assert!(matches!(err, EngineError::NotFound(_)));
        }

        #[tokio::test]
        async fn create_is_one_commit() {
            let store = seeded();
            service(&store).create(&path("b.md"), b"b").await.unwrap();
            assert_eq!(store.history(&staging()).len(), 2);
        }
    }

    // =========================================================================
    // update / delete
    // =========================================================================

    mod update {
        use super::*;

        #[tokio::test]
        async fn update_with_current_token() {
            let store = seeded();
            let files = service(&store);
            let read = files.read(&path("pages/about.md")).await.unwrap();

            let oid = files
                .update(&path("pages/about.md"), b"new", Some(&read.oid))
                .await
                .unwrap();
            assert_ne!(oid, read.oid);
            assert_eq!(
                store.file_at_tip(&staging(), "pages/about.md"),
                Some(b"new".to_vec())
            );
        }

        #[tokio::test]
        async fn stale_token_conflicts() {
            let store = seeded();
            let files = service(&store);
            let read = files.read(&path("pages/about.md")).await.unwrap();
            files
                .update(&path("pages/about.md"), b"first", None)
                .await
                .unwrap();

            let err = files
                .update(&path("pages/about.md"), b"second", Some(&read.oid))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Conflict(_)));
            assert_eq!(
                store.file_at_tip(&staging(), "pages/about.md"),
                Some(b"first".to_vec())
            );
        }

        #[tokio::test]
        async fn update_without_token_overwrites() {
            let store = seeded();
            service(&store)
                .update(&path("_posts/a.md"), b"forced", None)
                .await
                .unwrap();
            assert_eq!(
                store.file_at_tip(&staging(), "_posts/a.md"),
                Some(b"forced".to_vec())
            );
        }

        #[tokio::test]
        async fn update_missing_is_not_found() {
            let store = seeded();
            let err = service(&store)
                .update(&path("missing.md"), b"x", None)
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::NotFound(_)));
        }

        #[tokio::test]
        async fn identical_content_skips_commit() {
            let store = seeded();
            store.clear_operations();
            service(&store)
                .update(&path("pages/about.md"), b"about", None)
                .await
                .unwrap();
            assert!(!store
                .operations()
                .iter()
                .any(|op| matches!(op, StoreOperation::CreateCommit { .. })));
        }

        #[tokio::test]
        async fn delete_removes_file() {
            let store = seeded();
            let files = service(&store);
            files.delete(&path("_posts/a.md"), None).await.unwrap();

            assert_eq!(store.file_at_tip(&staging(), "_posts/a.md"), None);
            let err = files.read(&path("_posts/a.md")).await.unwrap_err();
            assert!(matches!(err, EngineError::NotFound(_)));
        }

        #[tokio::test]
        async fn delete_missing_is_not_found() {
            let store = seeded();
            let err = service(&store)
                .delete(&path("missing.md"), None)
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::NotFound(_)));
        }
    }

    // =========================================================================
    // rename
    // =========================================================================

    mod rename {
        use super::*;

        #[tokio::test]
        async fn rename_is_a_single_commit() {
            let store = seeded();
            let files = service(&store);

            files
                .rename(&path("_posts/a.md"), &path("_posts/b.md"), b"post", None)
                .await
                .unwrap();

            assert_eq!(store.file_at_tip(&staging(), "_posts/a.md"), None);
            assert_eq!(
                store.file_at_tip(&staging(), "_posts/b.md"),
                Some(b"post".to_vec())
            );
            assert_eq!(
                store.history(&staging()),
                vec!["Rename file: _posts/a.md -> _posts/b.md", "initial"]
            );
        }

        #[tokio::test]
        async fn rename_onto_existing_conflicts() {
            let store = seeded();
            let err = service(&store)
                .rename(&path("_posts/a.md"), &path("pages/about.md"), b"x", None)
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Conflict(_)));
            assert!(store.file_at_tip(&staging(), "_posts/a.md").is_some());
        }

        #[tokio::test]
        async fn rename_missing_is_not_found() {
            let store = seeded();
            let err = service(&store)
                .rename(&path("nope.md"), &path("new.md"), b"x", None)
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::NotFound(_)));
        }
    }
}
