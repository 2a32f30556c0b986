//! store
//!
//! Object store abstraction over a git repository's object graph.
//!
//! # Architecture
//!
//! The [`ObjectStore`] trait is the only seam between the engine and
//! storage. Three backends implement it:
//!
//! - [`LocalStore`] - a git repository on disk, optionally publishing to an upstream
//! - [`GitHubStore`] - the GitHub git-data REST API
//! - [`MemoryStore`] - content-addressed in-memory store for tests
//!
//! # Invariants
//!
//! - Backends contain no business logic
//! - Transport failures are normalized into [`StoreError`]
//! - `advance_ref` is the only way a branch moves

pub mod factory;
pub mod github;
pub mod local;
pub mod memory;
pub mod traits;

pub use factory::{open_local_store, open_store};
pub use github::GitHubStore;
pub use local::{GitRemoteUpstream, LocalStore, RepairMarker, Repaired, Upstream};
pub use memory::{FailOn, MemoryStore, StoreOperation};
pub use traits::{ObjectStore, StoreError};
