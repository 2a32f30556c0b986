//! core::types
//!
//! Strong types for the content-store domain.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Git object identifier (SHA-1 or SHA-256 hex)
//! - [`RepoPath`] - Validated repository-relative POSIX path
//! - [`EntryMode`] / [`EntryKind`] - Tree entry modes and their blob/tree kind
//! - [`Entry`] / [`Tree`] - Flattened recursive tree listing at a commit
//! - [`File`] - Materialized blob with its concurrency token
//!
//! # Validation
//!
//! These types enforce validity at construction time. A `RepoPath` can never
//! contain `..`, empty segments, or a leading slash, so no caller can address
//! anything outside the repository tree.
//!
//! # Examples
//!
//! ```
//! use sitestore::core::types::{BranchName, Oid, RepoPath};
//!
//! let branch = BranchName::new("staging").unwrap();
//! let path = RepoPath::new("_posts/2024/hello.md").unwrap();
//! assert_eq!(path.parent().unwrap().as_str(), "_posts/2024");
//! assert_eq!(path.file_name(), "hello.md");
//!
//! assert!(RepoPath::new("../etc/passwd").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! # let _ = branch;
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("unsupported entry mode: {0:o}")]
    InvalidMode(u32),
}

/// A validated Git branch name.
///
/// Branch names follow Git's refname rules (see `git check-ref-format`):
/// no empty components, no leading `.` or `-`, no `..`, `@{`, `//`,
/// no trailing `/` or `.lock`, no spaces or glob characters.
///
/// # Example
///
/// ```
/// use sitestore::core::types::BranchName;
///
/// let name = BranchName::new("feature/site-redesign").unwrap();
/// assert_eq!(name.as_str(), "feature/site-redesign");
/// assert_eq!(name.ref_name(), "refs/heads/feature/site-redesign");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("bad..name").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }
        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        if name.ends_with('/') || name.starts_with('/') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start or end with '/'".into(),
            ));
        }
        for bad in ["..", "@{", "//"] {
            if name.contains(bad) {
                return Err(TypeError::InvalidBranchName(format!(
                    "branch name cannot contain '{bad}'"
                )));
            }
        }

        const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
        if let Some(c) = name
            .chars()
            .find(|c| INVALID_CHARS.contains(c) || c.is_ascii_control())
        {
            return Err(TypeError::InvalidBranchName(format!(
                "branch name cannot contain {c:?}"
            )));
        }

        for component in name.split('/') {
            if component.starts_with('.') {
                return Err(TypeError::InvalidBranchName(
                    "path component cannot start with '.'".into(),
                ));
            }
            if component.ends_with(".lock") {
                return Err(TypeError::InvalidBranchName(
                    "path component cannot end with '.lock'".into(),
                ));
            }
        }

        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The fully qualified ref for this branch (`refs/heads/<name>`).
    pub fn ref_name(&self) -> String {
        format!("refs/heads/{}", self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase. Blob OIDs double as the optimistic
/// concurrency token handed to callers: they change whenever content changes.
///
/// # Example
///
/// ```
/// use sitestore::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// assert!(Oid::zero().is_zero());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    const ZERO_SHA1: &'static str = "0000000000000000000000000000000000000000";

    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not 40 or 64 hex characters.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        Self::validate(&oid)?;
        Ok(Self(oid))
    }

    /// The zero/null OID (40 zeros).
    pub fn zero() -> Self {
        Self(Self::ZERO_SHA1.to_string())
    }

    /// Check if this is the zero/null OID.
    pub fn is_zero(&self) -> bool {
        self.0.chars().all(|c| c == '0')
    }

    /// Abbreviated form of the OID (first `len` characters).
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(oid: &str) -> Result<(), TypeError> {
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid("object id must be hexadecimal".into()));
        }
        Ok(())
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated, repository-relative POSIX path.
///
/// Rules:
/// - Non-empty, no leading or trailing `/`
/// - Segments are non-empty and never `.` or `..`
/// - No backslashes, NUL bytes, or other control characters
///
/// Paths compare and sort as plain strings. Directory containment is
/// segment-aware: `_posts` contains `_posts/a.md` but not `_posts-old/a.md`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Create a new validated path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` when the path is empty, absolute, or
    /// contains empty, `.` or `..` segments.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    fn validate(path: &str) -> Result<(), TypeError> {
        if path.is_empty() {
            return Err(TypeError::InvalidPath("path cannot be empty".into()));
        }
        if path.starts_with('/') || path.ends_with('/') {
            return Err(TypeError::InvalidPath(format!(
                "path cannot start or end with '/': {path}"
            )));
        }
        if path.contains('\\') || path.chars().any(|c| c.is_control()) {
            return Err(TypeError::InvalidPath(format!(
                "path contains illegal characters: {path:?}"
            )));
        }
        for segment in path.split('/') {
            match segment {
                "" => {
                    return Err(TypeError::InvalidPath(format!(
                        "path has an empty segment: {path}"
                    )))
                }
                "." | ".." => {
                    return Err(TypeError::InvalidPath(format!(
                        "path cannot contain '{segment}' segments: {path}"
                    )))
                }
                ".git" => {
                    return Err(TypeError::InvalidPath(format!(
                        "path cannot address the .git directory: {path}"
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path's segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Number of segments in the path.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The last segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The containing directory, or `None` for top-level paths.
    pub fn parent(&self) -> Option<RepoPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| RepoPath(parent.to_string()))
    }

    /// Append a relative path below this one.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` if `child` is not a valid relative path.
    pub fn join(&self, child: &str) -> Result<RepoPath, TypeError> {
        RepoPath::new(format!("{}/{}", self.0, child))
    }

    /// Whether `self` lies strictly below the directory `dir`.
    pub fn is_within(&self, dir: &RepoPath) -> bool {
        self.0.len() > dir.0.len()
            && self.0.starts_with(dir.as_str())
            && self.0.as_bytes()[dir.0.len()] == b'/'
    }

    /// Whether `self` is `dir` itself or lies below it.
    pub fn is_at_or_within(&self, dir: &RepoPath) -> bool {
        self == dir || self.is_within(dir)
    }

    /// Path of `self` relative to `dir`, if `self` lies below `dir`.
    pub fn strip_dir(&self, dir: &RepoPath) -> Option<&str> {
        if self.is_within(dir) {
            Some(&self.0[dir.0.len() + 1..])
        } else {
            None
        }
    }

    /// Re-root `self` from directory `from` to directory `to`.
    ///
    /// Returns `None` if `self` is neither `from` nor below it.
    pub fn rebase(&self, from: &RepoPath, to: &RepoPath) -> Option<RepoPath> {
        if self == from {
            return Some(to.clone());
        }
        self.strip_dir(from)
            .map(|rest| RepoPath(format!("{}/{}", to.0, rest)))
    }
}

impl TryFrom<String> for RepoPath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RepoPath {
    type Error = TypeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepoPath> for String {
    fn from(path: RepoPath) -> Self {
        path.0
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether an entry is a leaf object or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Blob => write!(f, "blob"),
            EntryKind::Tree => write!(f, "tree"),
        }
    }
}

/// File mode of a tree entry.
///
/// Everything except `Directory` is a leaf and is carried through tree
/// rewrites untouched, so executable bits and submodule pointers survive
/// unrelated commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Submodule commit pointer (0o160000).
    Submodule,
    /// Subtree / directory (0o040000).
    Directory,
}

impl EntryMode {
    /// Octal mode value as stored in git tree objects.
    pub fn bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Submodule => 0o160000,
            Self::Directory => 0o040000,
        }
    }

    /// Parse from an octal mode value.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidMode` for modes git never writes.
    pub fn from_bits(bits: u32) -> Result<Self, TypeError> {
        match bits {
            0o100644 | 0o100664 => Ok(Self::Regular),
            0o100755 => Ok(Self::Executable),
            0o120000 => Ok(Self::Symlink),
            0o160000 => Ok(Self::Submodule),
            0o040000 => Ok(Self::Directory),
            other => Err(TypeError::InvalidMode(other)),
        }
    }

    /// Parse the six-digit octal string used by the GitHub API.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidMode` if the string is not a known mode.
    pub fn from_octal_str(s: &str) -> Result<Self, TypeError> {
        let bits = u32::from_str_radix(s, 8).map_err(|_| TypeError::InvalidMode(0))?;
        Self::from_bits(bits)
    }

    /// Six-digit octal representation (e.g. `100644`).
    pub fn to_octal_string(&self) -> String {
        format!("{:06o}", self.bits())
    }

    /// Blob or tree.
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Directory => EntryKind::Tree,
            _ => EntryKind::Blob,
        }
    }
}

/// One path in a flattened tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub path: RepoPath,
    pub mode: EntryMode,
    pub oid: Oid,
}

impl Entry {
    /// A regular-file blob entry.
    pub fn blob(path: RepoPath, oid: Oid) -> Self {
        Self {
            path,
            mode: EntryMode::Regular,
            oid,
        }
    }

    /// A directory entry pointing at an existing subtree.
    pub fn tree(path: RepoPath, oid: Oid) -> Self {
        Self {
            path,
            mode: EntryMode::Directory,
            oid,
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.mode.kind()
    }

    pub fn is_tree(&self) -> bool {
        self.kind() == EntryKind::Tree
    }

    pub fn is_blob(&self) -> bool {
        self.kind() == EntryKind::Blob
    }
}

/// The full recursive listing of a repository at one commit.
///
/// Entries are sorted by path. Directory entries are included when the
/// listing was read recursively; they are never required when writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    /// Commit the listing was read from.
    pub commit: Oid,
    /// Root tree object of that commit.
    pub root: Oid,
    /// Sorted entries.
    pub entries: Vec<Entry>,
}

impl Tree {
    /// Build a tree listing, sorting entries by path.
    pub fn new(commit: Oid, root: Oid, mut entries: Vec<Entry>) -> Self {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            commit,
            root,
            entries,
        }
    }

    /// Look up an entry by exact path.
    pub fn get(&self, path: &RepoPath) -> Option<&Entry> {
        self.entries
            .binary_search_by(|e| e.path.cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Look up a blob-kind entry by exact path.
    pub fn blob(&self, path: &RepoPath) -> Option<&Entry> {
        self.get(path).filter(|e| e.is_blob())
    }

    /// Whether anything lives at or below `path`.
    pub fn occupies(&self, path: &RepoPath) -> bool {
        self.entries.iter().any(|e| e.path.is_at_or_within(path))
    }

    /// Whether any entry lies strictly below `dir`.
    pub fn has_children(&self, dir: &RepoPath) -> bool {
        self.entries.iter().any(|e| e.path.is_within(dir))
    }

    /// All blob-kind entries, in path order.
    pub fn blobs(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.is_blob())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A materialized blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub path: RepoPath,
    pub content: Vec<u8>,
    /// Blob hash; echo it back on update/delete to detect stale writes.
    pub oid: Oid,
}

impl File {
    /// Content as UTF-8, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// A direct child of a directory, as returned by directory listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub path: RepoPath,
    pub kind: EntryKind,
    pub oid: Oid,
}
