//! Sitestore - a git-backed virtual content store for static sites
//!
//! Sitestore treats a git branch as a filesystem. Every mutation (file
//! create, edit, rename, delete, directory rename, collection reorder)
//! becomes exactly one commit, published with a compare-and-swap on the
//! branch ref, against either a local clone or the GitHub REST API.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - File, directory and ordering services over one commit coordinator
//! - [`store`] - Object store backends (local git, GitHub, in-memory)
//! - [`lock`] - Per-repository leases for multi-commit operations
//! - [`core`] - Domain types, paths, tree building and configuration
//! - [`git`] - Single interface for all libgit2 operations
//!
//! # Correctness Invariants
//!
//! 1. Every mutation is a single commit whose parent is the tip it read
//! 2. A stale read never overwrites a newer commit
//! 3. A partially applied commit blocks further writes until repaired
//! 4. Directory-wide operations hold the repository lock

pub mod cli;
pub mod core;
pub mod engine;
pub mod git;
pub mod lock;
pub mod store;
