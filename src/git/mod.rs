//! git
//!
//! Single interface for all git2 operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to git2. The local object store and
//! the git-remote upstream call into [`Git`]; nothing else imports `git2`.
//!
//! # Responsibilities
//!
//! - Opening bare and non-bare repositories
//! - Ref operations (resolve, CAS update, push)
//! - Object operations (blobs, tree levels, commits)
//! - Ancestry queries
//!
//! # Invariants
//!
//! - All ref updates use CAS (compare-and-swap) semantics
//! - No other module calls git2 directly
//! - All operations return strong types (Oid, EntryMode)

mod interface;

pub use interface::{Git, GitError, Identity};
