//! store::traits
//!
//! Object store trait definition.
//!
//! # Design
//!
//! The `ObjectStore` trait is async because every backend except the
//! in-memory one involves I/O. It exposes exactly the git object model
//! (blobs, trees, commits, one branch ref) and nothing else; all business
//! rules live in the engine above it.
//!
//! `advance_ref` is the linearization point of every mutation: it moves the
//! branch only if it still points at the commit the caller started from.
//!
//! # Example
//!
//! ```ignore
//! use sitestore::store::{ObjectStore, StoreError};
//!
//! async fn tip(store: &dyn ObjectStore, branch: &BranchName) -> Result<Oid, StoreError> {
//!     let oid = store.resolve_ref(branch).await?;
//!     println!("{} is at {}", branch, oid.short(7));
//!     Ok(oid)
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{BranchName, Entry, File, Oid, RepoPath, Tree, TypeError};

/// Errors from object store operations.
///
/// Every backend normalizes its transport failures into these variants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested ref, commit or path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The ref no longer points where the caller expected.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The branch advanced locally but publishing it upstream failed.
    #[error("commit {attempted} applied locally but not published: {message}")]
    PartiallyApplied {
        /// Commit the branch now points at locally
        attempted: String,
        /// Why publishing failed
        message: String,
    },

    /// A previous partially applied commit has not been repaired yet.
    #[error("repository needs repair: {0}")]
    NeedsRepair(String),

    /// Credentials are required but missing.
    #[error("authentication required")]
    AuthRequired,

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// Remote API returned an unexpected error.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    Network(String),

    /// Storage-level failure (git, filesystem, malformed data).
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether a caller might reasonably retry the operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::RateLimited | StoreError::Network(_) | StoreError::Conflict(_)
        )
    }
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// A repository's object graph, bound to one repository.
///
/// Implementations must be `Send + Sync` so a single store can be shared by
/// all services through an `Arc`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logging (e.g. "local", "github").
    fn name(&self) -> &'static str;

    /// Resolve a branch to its tip commit.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the branch does not exist
    async fn resolve_ref(&self, branch: &BranchName) -> Result<Oid, StoreError>;

    /// Read the blob at `path` in the tree of `at_commit`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if nothing, or a directory, lives at `path`
    async fn get_blob(&self, at_commit: &Oid, path: &RepoPath) -> Result<File, StoreError>;

    /// Store `content` as a blob and return its hash.
    ///
    /// `path` is informational only; blobs are content-addressed.
    async fn put_blob(&self, path: &RepoPath, content: &[u8]) -> Result<Oid, StoreError>;

    /// List the tree of `commit`.
    ///
    /// With `recursive` the listing includes every blob and directory at any
    /// depth; without it only the top level.
    async fn get_tree(&self, commit: &Oid, recursive: bool) -> Result<Tree, StoreError>;

    /// Write a new root tree from a flat entry list.
    ///
    /// Intermediate directories are derived from path segments. A
    /// directory-mode entry reuses an existing subtree by hash.
    async fn put_tree(&self, entries: &[Entry]) -> Result<Oid, StoreError>;

    /// Create a commit object. Does not move any ref.
    async fn create_commit(
        &self,
        tree: &Oid,
        parent: Option<&Oid>,
        message: &str,
    ) -> Result<Oid, StoreError>;

    /// Atomically move `branch` from `expected_old` to `new`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] if the branch no longer points at
    ///   `expected_old` or the move is not a fast-forward
    /// - [`StoreError::PartiallyApplied`] if a local backend moved its ref
    ///   but could not publish it
    async fn advance_ref(
        &self,
        branch: &BranchName,
        new: &Oid,
        expected_old: &Oid,
    ) -> Result<(), StoreError>;
}
