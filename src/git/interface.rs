//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module provides the **single doorway** to git2 for the local
//! backend. All object reads and writes, ref updates and pushes flow through
//! [`Git`], which normalizes libgit2 failures into [`GitError`].
//!
//! # Architecture
//!
//! No other module imports `git2`. This keeps:
//!
//! - Error handling consistent across every git call
//! - Strong types (`Oid`, `BranchName`, `EntryMode`) at the boundary
//! - CAS (compare-and-swap) semantics for every ref mutation
//!
//! # Example
//!
//! ```ignore
//! use sitestore::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("/srv/sites/my-site"))?;
//! let tip = git.resolve_ref("refs/heads/staging")?;
//! println!("staging is at {}", tip.short(7));
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::tree::{TreeObjects, TreeRecord};
use crate::core::types::{EntryMode, Oid, RepoPath, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Compare-and-swap precondition failed.
    ///
    /// The ref moved between the caller's read and this update.
    #[error("CAS failed for {refname}: expected {expected}, found {actual}")]
    CasFailed {
        /// The ref being updated
        refname: String,
        /// The expected old value
        expected: String,
        /// The actual current value
        actual: String,
    },

    /// The update would not be a fast-forward.
    #[error("{refname}: {new} does not descend from {old}")]
    NotFastForward {
        refname: String,
        old: String,
        new: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID (or path) that was not found
        oid: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// A tree holds a name or mode this crate cannot represent.
    #[error("unsupported tree entry: {message}")]
    UnsupportedEntry { message: String },

    /// The remote refused a pushed ref.
    #[error("push to {remote} rejected: {message}")]
    PushRejected { remote: String, message: String },

    /// The remote could not be reached or read.
    #[error("fetch from {remote} failed: {message}")]
    FetchFailed { remote: String, message: String },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            git2::ErrorCode::Modified => GitError::CasFailed {
                refname: context.to_string(),
                expected: "<unchanged>".to_string(),
                actual: "<modified>".to_string(),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(s) => GitError::InvalidOid { oid: s },
            other => GitError::UnsupportedEntry {
                message: other.to_string(),
            },
        }
    }
}

/// Commit author and committer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "sitestore".to_string(),
            email: "sitestore@localhost".to_string(),
        }
    }
}

/// The Git interface.
///
/// Wraps a `git2::Repository`. `git2::Repository` is `Send` but not `Sync`,
/// so shared owners wrap `Git` in a mutex.
pub struct Git {
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("git_dir", &self.repo.path())
            .finish()
    }
}

fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

fn from_git2_oid(oid: git2::Oid) -> Result<Oid, GitError> {
    Oid::new(oid.to_string()).map_err(GitError::from)
}

impl Git {
    // =========================================================================
    // Repository Opening
    // =========================================================================

    /// Open a repository (bare or with a working directory) at `path`.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if `path` is not a repository
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self { repo })
    }

    /// Path to the repository's git directory.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// The ref HEAD names in a repository with a working directory.
    ///
    /// `None` for a bare repository or a detached HEAD.
    pub fn checked_out_ref(&self) -> Option<String> {
        if self.repo.is_bare() {
            return None;
        }
        self.repo
            .find_reference("HEAD")
            .ok()?
            .symbolic_target()
            .map(str::to_string)
    }

    // =========================================================================
    // Ref Operations
    // =========================================================================

    /// Resolve a ref to the commit it points at.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &str) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let oid = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, refname))?
            .id();

        from_git2_oid(oid)
    }

    /// Resolve a ref, returning None if it doesn't exist.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.resolve_ref(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fast-forward a ref with compare-and-swap semantics.
    ///
    /// The update only succeeds if the ref currently points at
    /// `expected_old` and `new_oid` descends from it. The check-and-set is
    /// delegated to libgit2's `reference_matching`, so a concurrent writer
    /// between our read and the write also fails the update.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    /// - [`GitError::CasFailed`] if the current value doesn't match
    /// - [`GitError::NotFastForward`] if `new_oid` does not descend from `expected_old`
    pub fn update_ref_cas(
        &self,
        refname: &str,
        new_oid: &Oid,
        expected_old: &Oid,
        message: &str,
    ) -> Result<(), GitError> {
        self.check_ref(refname, expected_old)?;

        if !self.is_ancestor(expected_old, new_oid)? {
            return Err(GitError::NotFastForward {
                refname: refname.to_string(),
                old: expected_old.to_string(),
                new: new_oid.to_string(),
            });
        }

        self.set_ref_matching(refname, new_oid, expected_old, message)
    }

    /// Create `refname` at `oid`, failing if it already exists.
    pub fn create_ref(&self, refname: &str, oid: &Oid, message: &str) -> Result<(), GitError> {
        self.repo
            .reference(refname, to_git2(oid)?, false, message)
            .map_err(|e| GitError::from_git2(e, refname))?;
        Ok(())
    }

    /// Move a ref backwards (or anywhere) with compare-and-swap semantics.
    ///
    /// Used only to undo a commit that was applied locally but never
    /// published.
    pub fn rewind_ref_cas(
        &self,
        refname: &str,
        new_oid: &Oid,
        expected_old: &Oid,
        message: &str,
    ) -> Result<(), GitError> {
        self.check_ref(refname, expected_old)?;
        self.set_ref_matching(refname, new_oid, expected_old, message)
    }

    fn check_ref(&self, refname: &str, expected: &Oid) -> Result<(), GitError> {
        let current = self
            .try_resolve_ref(refname)?
            .ok_or_else(|| GitError::RefNotFound {
                refname: refname.to_string(),
            })?;

        if &current != expected {
            return Err(GitError::CasFailed {
                refname: refname.to_string(),
                expected: expected.to_string(),
                actual: current.to_string(),
            });
        }
        Ok(())
    }

    fn set_ref_matching(
        &self,
        refname: &str,
        new_oid: &Oid,
        expected_old: &Oid,
        message: &str,
    ) -> Result<(), GitError> {
        self.repo
            .reference_matching(
                refname,
                to_git2(new_oid)?,
                true,
                to_git2(expected_old)?,
                message,
            )
            .map_err(|e| GitError::from_git2(e, refname))?;
        Ok(())
    }

    /// Check if `ancestor` is reachable from `descendant`.
    pub fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        // A commit is its own ancestor
        if ancestor == descendant {
            return Ok(true);
        }

        self.repo
            .graph_descendant_of(to_git2(descendant)?, to_git2(ancestor)?)
            .map_err(|e| GitError::Internal {
                message: e.message().to_string(),
            })
    }

    // =========================================================================
    // Object Operations
    // =========================================================================

    /// Write content as a blob and return its OID.
    pub fn write_blob(&self, content: &[u8]) -> Result<Oid, GitError> {
        let oid = self.repo.blob(content).map_err(|e| GitError::Internal {
            message: e.message().to_string(),
        })?;
        from_git2_oid(oid)
    }

    /// Read a blob by OID.
    ///
    /// # Errors
    ///
    /// - [`GitError::ObjectNotFound`] if the blob doesn't exist
    pub fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, GitError> {
        let blob = self
            .repo
            .find_blob(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        Ok(blob.content().to_vec())
    }

    /// Root tree of a commit.
    pub fn commit_tree(&self, commit: &Oid) -> Result<Oid, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(commit)?)
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
        from_git2_oid(commit.tree_id())
    }

    /// Look up the entry at `path` inside the tree `root`.
    ///
    /// Returns `None` if nothing lives at `path`.
    pub fn tree_entry(
        &self,
        root: &Oid,
        path: &RepoPath,
    ) -> Result<Option<(EntryMode, Oid)>, GitError> {
        let tree = self
            .repo
            .find_tree(to_git2(root)?)
            .map_err(|e| GitError::from_git2(e, root.as_str()))?;

        let entry = match tree.get_path(Path::new(path.as_str())) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, path.as_str())),
        };

        let mode = EntryMode::from_bits(entry.filemode() as u32)?;
        Ok(Some((mode, from_git2_oid(entry.id())?)))
    }

    /// Create a commit object. Does not move any ref.
    pub fn create_commit(
        &self,
        tree: &Oid,
        parent: Option<&Oid>,
        message: &str,
        identity: &Identity,
    ) -> Result<Oid, GitError> {
        let sig = git2::Signature::now(&identity.name, &identity.email).map_err(|e| {
            GitError::Internal {
                message: format!("invalid signature: {}", e.message()),
            }
        })?;

        let tree = self
            .repo
            .find_tree(to_git2(tree)?)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;

        let parent_commit = match parent {
            Some(p) => Some(
                self.repo
                    .find_commit(to_git2(p)?)
                    .map_err(|e| GitError::from_git2(e, p.as_str()))?,
            ),
            None => None,
        };
        let parents: Vec<&git2::Commit<'_>> = parent_commit.iter().collect();

        let oid = self
            .repo
            .commit(None, &sig, &sig, message, &tree, &parents)
            .map_err(|e| GitError::Internal {
                message: e.message().to_string(),
            })?;
        from_git2_oid(oid)
    }

    // =========================================================================
    // Remote Operations
    // =========================================================================

    /// Fetch `refname` from `remote` and return the remote's tip.
    ///
    /// The fetched tip is recorded in the remote-tracking ref
    /// `refs/remotes/<remote>/<branch>`. Returns `None` if the remote has no
    /// such ref.
    pub fn fetch_ref(&self, remote: &str, refname: &str) -> Result<Option<Oid>, GitError> {
        let failed = |e: git2::Error| GitError::FetchFailed {
            remote: remote.to_string(),
            message: e.message().to_string(),
        };
        let mut remote_handle = self
            .repo
            .find_remote(remote)
            .map_err(|e| GitError::from_git2(e, remote))?;

        remote_handle
            .connect(git2::Direction::Fetch)
            .map_err(failed)?;
        let advertised = remote_handle
            .list()
            .map_err(failed)?
            .iter()
            .find(|head| head.name() == refname)
            .map(|head| head.oid());
        remote_handle.disconnect().map_err(failed)?;

        let Some(tip) = advertised else {
            return Ok(None);
        };

        let branch = refname.strip_prefix("refs/heads/").unwrap_or(refname);
        let refspec = format!("+{refname}:refs/remotes/{remote}/{branch}");
        remote_handle
            .fetch(&[refspec.as_str()], None, None)
            .map_err(failed)?;
        from_git2_oid(tip).map(Some)
    }

    /// Push `refname` to the same ref on `remote`.
    ///
    /// A ref the remote refuses (for example a non-fast-forward) fails the
    /// push instead of being silently skipped.
    pub fn push_ref(&self, remote: &str, refname: &str) -> Result<(), GitError> {
        let mut remote_handle = self
            .repo
            .find_remote(remote)
            .map_err(|e| GitError::from_git2(e, remote))?;

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.push_update_reference(|name, status| match status {
            Some(msg) => Err(git2::Error::from_str(&format!("{name}: {msg}"))),
            None => Ok(()),
        });
        let mut options = git2::PushOptions::new();
        options.remote_callbacks(callbacks);

        let refspec = format!("{refname}:{refname}");
        remote_handle
            .push(&[refspec.as_str()], Some(&mut options))
            .map_err(|e| GitError::PushRejected {
                remote: remote.to_string(),
                message: e.message().to_string(),
            })
    }
}

impl TreeObjects for Git {
    type Error = GitError;

    fn read_level(&mut self, oid: &Oid) -> Result<Vec<TreeRecord>, GitError> {
        let tree = self
            .repo
            .find_tree(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        tree.iter()
            .map(|entry| -> Result<TreeRecord, GitError> {
                let name = entry
                    .name()
                    .ok_or_else(|| GitError::UnsupportedEntry {
                        message: format!("non UTF-8 name in tree {oid}"),
                    })?
                    .to_string();
                Ok(TreeRecord {
                    name,
                    mode: EntryMode::from_bits(entry.filemode() as u32)?,
                    oid: from_git2_oid(entry.id())?,
                })
            })
            .collect()
    }

    fn write_level(&mut self, records: &[TreeRecord]) -> Result<Oid, GitError> {
        let mut builder = self.repo.treebuilder(None).map_err(|e| GitError::Internal {
            message: e.message().to_string(),
        })?;
        for record in records {
            builder
                .insert(&record.name, to_git2(&record.oid)?, record.mode.bits() as i32)
                .map_err(|e| GitError::from_git2(e, &record.name))?;
        }
        let oid = builder.write().map_err(|e| GitError::Internal {
            message: e.message().to_string(),
        })?;
        from_git2_oid(oid)
    }
}
