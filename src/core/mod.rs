//! core
//!
//! Core domain types, paths, and configuration for Sitestore.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, RepoPath, Entry, etc.
//! - [`paths`] - Site layout and on-disk bookkeeping locations
//! - [`tree`] - Flat entry lists to nested git trees and back
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid paths and hashes from reaching a store
//! - Schemas are strict and self-describing

pub mod config;
pub mod paths;
pub mod tree;
pub mod types;
