//! core::paths
//!
//! Centralized path routing, both inside the site tree and on local disk.
//!
//! # Site Layout
//!
//! Content lives at repository-relative paths that follow static-site
//! conventions:
//! - `_<collection>/` - one directory per collection
//! - `_<collection>/collection.yml` - the collection's ordered index manifest
//! - `pages/` - standalone pages
//! - `<resource_room>/` - the configured resource room, if any
//!
//! [`SiteLayout`] is the only place that spells these out.
//!
//! # Local Storage
//!
//! The local backend keeps its bookkeeping under `<git_dir>/sitestore/`:
//! - `needs-repair.json` - marker for a partially applied commit
//!
//! # Example
//!
//! ```
//! use sitestore::core::paths::{SiteLayout, StorePaths};
//! use std::path::PathBuf;
//!
//! let layout = SiteLayout::default();
//! assert_eq!(
//!     layout.manifest_path("posts").unwrap().as_str(),
//!     "_posts/collection.yml"
//! );
//!
//! let paths = StorePaths::new(PathBuf::from("/site/.git"));
//! assert_eq!(
//!     paths.needs_repair_path(),
//!     PathBuf::from("/site/.git/sitestore/needs-repair.json")
//! );
//! ```

use std::path::{Path, PathBuf};

use crate::core::types::{RepoPath, TypeError};

/// Name of the manifest file inside every collection directory.
pub const MANIFEST_FILE: &str = "collection.yml";

/// Placeholder blob that keeps an otherwise empty subfolder alive.
pub const KEEP_FILE: &str = ".keep";

/// Repository-relative layout of a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    pages_dir: String,
    resource_room: Option<String>,
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self {
            pages_dir: "pages".to_string(),
            resource_room: None,
        }
    }
}

impl SiteLayout {
    /// Create a layout with a custom pages directory and resource room.
    pub fn new(pages_dir: impl Into<String>, resource_room: Option<String>) -> Self {
        Self {
            pages_dir: pages_dir.into(),
            resource_room,
        }
    }

    /// Directory holding a collection: `_<name>`.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` if `name` is empty or contains a `/`.
    pub fn collection_dir(&self, name: &str) -> Result<RepoPath, TypeError> {
        if name.is_empty() || name.contains('/') {
            return Err(TypeError::InvalidPath(format!(
                "invalid collection name: {name:?}"
            )));
        }
        RepoPath::new(format!("_{name}"))
    }

    /// The manifest of a collection: `_<name>/collection.yml`.
    pub fn manifest_path(&self, name: &str) -> Result<RepoPath, TypeError> {
        self.collection_dir(name)?.join(MANIFEST_FILE)
    }

    /// Location of a collection member given its path relative to the collection.
    pub fn collection_item(&self, name: &str, item: &str) -> Result<RepoPath, TypeError> {
        self.collection_dir(name)?.join(item)
    }

    /// Directory holding standalone pages.
    pub fn pages_dir(&self) -> Result<RepoPath, TypeError> {
        RepoPath::new(self.pages_dir.clone())
    }

    /// Directory of the resource room, if configured.
    pub fn resource_room(&self) -> Option<Result<RepoPath, TypeError>> {
        self.resource_room.as_ref().map(|r| RepoPath::new(r.clone()))
    }
}

/// On-disk bookkeeping locations for the local backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// The repository's git directory.
    pub git_dir: PathBuf,
}

impl StorePaths {
    pub fn new(git_dir: PathBuf) -> Self {
        Self { git_dir }
    }

    /// Root of all sitestore state: `<git_dir>/sitestore`.
    pub fn store_dir(&self) -> PathBuf {
        self.git_dir.join("sitestore")
    }

    /// Marker recording a commit that advanced locally but never published.
    pub fn needs_repair_path(&self) -> PathBuf {
        self.store_dir().join("needs-repair.json")
    }

    /// The git directory as a Path reference.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}
