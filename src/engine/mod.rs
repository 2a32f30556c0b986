//! engine
//!
//! The virtual content store: file, directory and ordered-index services on
//! top of a git object graph.
//!
//! # Architecture
//!
//! Every mutation follows the same cycle, driven by [`CommitCoordinator`]:
//!
//! ```text
//! resolve ref -> read tree -> compute entries -> put_tree -> create_commit -> advance_ref
//! ```
//!
//! - [`FileService`] - single-file create/read/update/delete/rename, one commit each
//! - [`DirectoryService`] - directory listing, delete and rename as tree rewrites
//! - [`OrderService`] - per-collection ordered manifest, edited through [`FileService`]
//! - [`CollectionService`] - member content and order edited together under the lock
//! - [`Locker`] - acquires the repository lock for multi-step mutations
//!
//! Services are plain structs holding only injected collaborators; they hold
//! no state between calls.
//!
//! # Invariants
//!
//! - Every check a mutation makes is against the same snapshot it commits on
//!   top of, so a lost ref race surfaces as [`EngineError::Conflict`]
//! - The coordinator never retries
//! - A failure after the commit object exists but before the ref is known to
//!   have moved is [`EngineError::NeedsRollback`]
//!
//! # Example
//!
//! ```ignore
//! use sitestore::engine::FileService;
//!
//! let files = FileService::new(store.clone(), branch.clone());
//! let oid = files.create(&path, b"# Hello").await?;
//! let file = files.read(&path).await?;
//! files.update(&path, b"# Hello again", Some(&file.oid)).await?;
//! ```

pub mod collections;
pub mod coordinator;
pub mod directories;
pub mod files;
pub mod manifest;
pub mod ordering;

pub use collections::CollectionService;
pub use coordinator::{Change, CommitCoordinator, Snapshot};
pub use directories::{DirectoryService, Locker};
pub use files::FileService;
pub use manifest::{CollectionManifest, OrderedIndex};
pub use ordering::OrderService;

use thiserror::Error;

use crate::core::types::TypeError;
use crate::lock::LockError;
use crate::store::StoreError;

/// Errors surfaced to callers of the engine services.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The path, directory, manifest or item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The target already exists, a concurrency token was stale, or the
    /// branch moved while the operation ran.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Another caller holds the repository lock.
    #[error("repository '{repo}' is locked, try again later")]
    Locked { repo: String },

    /// A commit may have been partially applied; the local copy must be
    /// reset before it is used again.
    #[error("commit {attempted} needs rollback: {message}")]
    NeedsRollback { attempted: String, message: String },

    /// Transport or storage failure; retry at the caller's discretion.
    #[error("store error: {0}")]
    Store(StoreError),

    /// A path or name failed validation.
    #[error("invalid path: {0}")]
    InvalidPath(#[from] TypeError),

    /// The lock table itself failed.
    #[error("lock error: {0}")]
    Lock(LockError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            StoreError::Conflict(why) => EngineError::Conflict(why),
            StoreError::PartiallyApplied { attempted, message } => {
                EngineError::NeedsRollback { attempted, message }
            }
            other => EngineError::Store(other),
        }
    }
}

impl From<LockError> for EngineError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Locked { repo, .. } => EngineError::Locked { repo },
            other => EngineError::Lock(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert!(matches!(
            EngineError::from(StoreError::NotFound("a.md".into())),
            EngineError::NotFound(_)
        ));
        assert!(matches!(
            EngineError::from(StoreError::Conflict("moved".into())),
            EngineError::Conflict(_)
        ));
        assert!(matches!(
            EngineError::from(StoreError::PartiallyApplied {
                attempted: "abc".into(),
                message: "push failed".into()
            }),
            EngineError::NeedsRollback { .. }
        ));
        assert!(matches!(
            EngineError::from(StoreError::RateLimited),
            EngineError::Store(StoreError::RateLimited)
        ));
    }

    #[test]
    fn lock_errors_map_to_locked() {
        let err = EngineError::from(LockError::Locked {
            repo: "site".into(),
            until: Utc::now(),
        });
        assert!(matches!(err, EngineError::Locked { ref repo } if repo == "site"));

        let err = EngineError::from(LockError::CreateFailed("disk".into()));
        assert!(matches!(err, EngineError::Lock(_)));
    }
}
