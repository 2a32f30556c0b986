//! store::memory
//!
//! In-memory object store for deterministic testing.
//!
//! # Design
//!
//! Objects are content-addressed with SHA-256, so hashes are 64 hex
//! characters and never collide with a real git repository's SHA-1 ids.
//! Blobs and trees are deduplicated by content; commits additionally hash a
//! sequence number so two identical commits still get distinct ids.
//!
//! Besides the [`ObjectStore`] implementation the store offers test hooks:
//!
//! - [`FailOn`] makes one operation fail with a chosen error
//! - [`MemoryStore::interleave_commit`] lands a commit from "another writer"
//!   right before the next `advance_ref`, to exercise conflict handling
//! - every call is recorded as a [`StoreOperation`]
//!
//! # Example
//!
//! ```
//! use sitestore::store::{MemoryStore, ObjectStore};
//! use sitestore::core::types::BranchName;
//!
//! # tokio_test::block_on(async {
//! let branch = BranchName::new("staging").unwrap();
//! let store = MemoryStore::with_files(&branch, [("index.md", "hi")]).unwrap();
//!
//! let tip = store.resolve_ref(&branch).await.unwrap();
//! let tree = store.get_tree(&tip, true).await.unwrap();
//! assert_eq!(tree.len(), 1);
//! # });
//! ```

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{ObjectStore, StoreError};
use crate::core::tree::{build_tree, walk_tree, TreeObjects, TreeRecord};
use crate::core::types::{BranchName, Entry, EntryMode, File, Oid, RepoPath, Tree};

/// In-memory object store.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Clone)]
struct CommitRecord {
    tree: Oid,
    parent: Option<Oid>,
    message: String,
}

#[derive(Debug, Default)]
struct ObjectTable {
    blobs: HashMap<Oid, Vec<u8>>,
    trees: HashMap<Oid, Vec<TreeRecord>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    objects: ObjectTable,
    commits: HashMap<Oid, CommitRecord>,
    refs: HashMap<BranchName, Oid>,
    /// Operation to fail on (for testing error paths).
    fail_on: Option<FailOn>,
    /// Files another writer commits just before the next ref update.
    interleaved: Option<Vec<(RepoPath, Vec<u8>)>>,
    /// Recorded operations for verification.
    operations: Vec<StoreOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    ResolveRef(StoreError),
    GetBlob(StoreError),
    PutBlob(StoreError),
    GetTree(StoreError),
    PutTree(StoreError),
    CreateCommit(StoreError),
    AdvanceRef(StoreError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    ResolveRef { branch: String },
    GetBlob { path: String },
    PutBlob { path: String },
    GetTree { recursive: bool },
    PutTree { entries: usize },
    CreateCommit { message: String },
    AdvanceRef { branch: String, new: String },
}

impl StoreOperation {
    /// Whether the operation writes objects or moves a ref.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StoreOperation::PutBlob { .. }
                | StoreOperation::PutTree { .. }
                | StoreOperation::CreateCommit { .. }
                | StoreOperation::AdvanceRef { .. }
        )
    }
}

fn hash_object(kind: &str, body: &[u8]) -> Oid {
    let mut hasher = Sha256::new();
    hasher.update(format!("{} {}\0", kind, body.len()).as_bytes());
    hasher.update(body);
    // 64 lowercase hex characters is always a valid Oid
    Oid::new(hex::encode(hasher.finalize())).unwrap_or_else(|_| Oid::zero())
}

impl TreeObjects for ObjectTable {
    type Error = StoreError;

    fn read_level(&mut self, oid: &Oid) -> Result<Vec<TreeRecord>, StoreError> {
        self.trees
            .get(oid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tree {}", oid)))
    }

    fn write_level(&mut self, records: &[TreeRecord]) -> Result<Oid, StoreError> {
        let mut records = records.to_vec();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let mut body = Vec::new();
        for r in &records {
            body.extend_from_slice(format!("{} {}\0{}\n", r.mode.to_octal_string(), r.name, r.oid).as_bytes());
        }
        let oid = hash_object("tree", &body);
        self.trees.entry(oid.clone()).or_insert(records);
        Ok(oid)
    }
}

impl ObjectTable {
    fn put_blob(&mut self, content: &[u8]) -> Oid {
        let oid = hash_object("blob", content);
        self.blobs.entry(oid.clone()).or_insert_with(|| content.to_vec());
        oid
    }

    /// Find the entry at `path` below the tree `root`.
    fn lookup(&mut self, root: &Oid, path: &RepoPath) -> Result<Option<(EntryMode, Oid)>, StoreError> {
        let mut current = (EntryMode::Directory, root.clone());
        for segment in path.segments() {
            if current.0 != EntryMode::Directory {
                return Ok(None);
            }
            let records = self.read_level(&current.1)?;
            match records.into_iter().find(|r| r.name == segment) {
                Some(r) => current = (r.mode, r.oid),
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

impl MemoryStoreInner {
    fn check_fail(&self, op: &str) -> Result<(), StoreError> {
        let err = match (&self.fail_on, op) {
            (Some(FailOn::ResolveRef(e)), "resolve_ref")
            | (Some(FailOn::GetBlob(e)), "get_blob")
            | (Some(FailOn::PutBlob(e)), "put_blob")
            | (Some(FailOn::GetTree(e)), "get_tree")
            | (Some(FailOn::PutTree(e)), "put_tree")
            | (Some(FailOn::CreateCommit(e)), "create_commit")
            | (Some(FailOn::AdvanceRef(e)), "advance_ref") => e.clone(),
            _ => return Ok(()),
        };
        Err(err)
    }

    fn commit(&self, oid: &Oid) -> Result<&CommitRecord, StoreError> {
        self.commits
            .get(oid)
            .ok_or_else(|| StoreError::NotFound(format!("commit {}", oid)))
    }

    fn new_commit(&mut self, tree: Oid, parent: Option<Oid>, message: &str) -> Oid {
        let body = format!(
            "{}\0{}\0{}\0{}",
            tree,
            parent.as_ref().map(|p| p.as_str()).unwrap_or(""),
            message,
            self.commits.len()
        );
        let oid = hash_object("commit", body.as_bytes());
        self.commits.insert(
            oid.clone(),
            CommitRecord {
                tree,
                parent,
                message: message.to_string(),
            },
        );
        oid
    }

    /// Commit `files` on top of `branch` directly, as another writer would.
    fn commit_files(
        &mut self,
        branch: &BranchName,
        files: Vec<(RepoPath, Vec<u8>)>,
        message: &str,
    ) -> Result<Oid, StoreError> {
        let parent = self.refs.get(branch).cloned();
        let mut entries: Vec<Entry> = match &parent {
            Some(p) => {
                let root = self.commit(p)?.tree.clone();
                walk_tree(&mut self.objects, &root, true)?
                    .into_iter()
                    .filter(|(_, mode, _)| *mode != EntryMode::Directory)
                    .map(|(path, mode, oid)| -> Result<Entry, StoreError> {
                        Ok(Entry {
                            path: RepoPath::new(path)?,
                            mode,
                            oid,
                        })
                    })
                    .collect::<Result<_, _>>()?
            }
            None => Vec::new(),
        };
        for (path, content) in files {
            let oid = self.objects.put_blob(&content);
            entries.retain(|e| e.path != path);
            entries.push(Entry::blob(path, oid));
        }
        let tree = build_tree(&mut self.objects, &entries)?;
        let commit = self.new_commit(tree, parent, message);
        self.refs.insert(branch.clone(), commit.clone());
        Ok(commit)
    }
}

impl MemoryStore {
    /// Create an empty store with no branches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose `branch` holds exactly `files` in one root commit.
    pub fn with_files<P, C>(
        branch: &BranchName,
        files: impl IntoIterator<Item = (P, C)>,
    ) -> Result<Self, StoreError>
    where
        P: AsRef<str>,
        C: AsRef<[u8]>,
    {
        let files = files
            .into_iter()
            .map(|(p, c)| -> Result<(RepoPath, Vec<u8>), StoreError> {
                Ok((RepoPath::new(p.as_ref())?, c.as_ref().to_vec()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let store = Self::new();
        store.lock().commit_files(branch, files, "initial")?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configure the store to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    /// Before the next `advance_ref`, commit `files` to the target branch as
    /// another writer, so the caller's expected tip is stale.
    pub fn interleave_commit<P, C>(&self, files: impl IntoIterator<Item = (P, C)>) -> Result<(), StoreError>
    where
        P: AsRef<str>,
        C: AsRef<[u8]>,
    {
        let files = files
            .into_iter()
            .map(|(p, c)| -> Result<(RepoPath, Vec<u8>), StoreError> {
                Ok((RepoPath::new(p.as_ref())?, c.as_ref().to_vec()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.lock().interleaved = Some(files);
        Ok(())
    }

    /// Commit `files` to `branch` immediately, bypassing all hooks.
    pub fn commit_directly<P, C>(
        &self,
        branch: &BranchName,
        files: impl IntoIterator<Item = (P, C)>,
        message: &str,
    ) -> Result<Oid, StoreError>
    where
        P: AsRef<str>,
        C: AsRef<[u8]>,
    {
        let files = files
            .into_iter()
            .map(|(p, c)| -> Result<(RepoPath, Vec<u8>), StoreError> {
                Ok((RepoPath::new(p.as_ref())?, c.as_ref().to_vec()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.lock().commit_files(branch, files, message)
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.lock().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Number of recorded operations that wrote objects or moved a ref.
    pub fn write_count(&self) -> usize {
        self.lock().operations.iter().filter(|op| op.is_write()).count()
    }

    /// Current tip of `branch`.
    pub fn tip(&self, branch: &BranchName) -> Option<Oid> {
        self.lock().refs.get(branch).cloned()
    }

    /// Commit messages reachable from `branch`, newest first.
    pub fn history(&self, branch: &BranchName) -> Vec<String> {
        let inner = self.lock();
        let mut out = Vec::new();
        let mut next = inner.refs.get(branch).cloned();
        while let Some(oid) = next {
            match inner.commits.get(&oid) {
                Some(c) => {
                    out.push(c.message.clone());
                    next = c.parent.clone();
                }
                None => break,
            }
        }
        out
    }

    /// Content at `path` on the tip of `branch`, bypassing hooks.
    pub fn file_at_tip(&self, branch: &BranchName, path: &str) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        let tip = inner.refs.get(branch)?.clone();
        let root = inner.commits.get(&tip)?.tree.clone();
        let path = RepoPath::new(path).ok()?;
        match inner.objects.lookup(&root, &path).ok()?? {
            (EntryMode::Directory, _) => None,
            (_, oid) => inner.objects.blobs.get(&oid).cloned(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn resolve_ref(&self, branch: &BranchName) -> Result<Oid, StoreError> {
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::ResolveRef {
            branch: branch.to_string(),
        });
        inner.check_fail("resolve_ref")?;
        inner
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("branch {}", branch)))
    }

    async fn get_blob(&self, at_commit: &Oid, path: &RepoPath) -> Result<File, StoreError> {
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::GetBlob {
            path: path.to_string(),
        });
        inner.check_fail("get_blob")?;

        let root = inner.commit(at_commit)?.tree.clone();
        let oid = match inner.objects.lookup(&root, path)? {
            Some((mode, oid)) if mode != EntryMode::Directory => oid,
            _ => return Err(StoreError::NotFound(path.to_string())),
        };
        let content = inner
            .objects
            .blobs
            .get(&oid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("blob {}", oid)))?;
        Ok(File {
            path: path.clone(),
            content,
            oid,
        })
    }

    async fn put_blob(&self, path: &RepoPath, content: &[u8]) -> Result<Oid, StoreError> {
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::PutBlob {
            path: path.to_string(),
        });
        inner.check_fail("put_blob")?;
        Ok(inner.objects.put_blob(content))
    }

    async fn get_tree(&self, commit: &Oid, recursive: bool) -> Result<Tree, StoreError> {
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::GetTree { recursive });
        inner.check_fail("get_tree")?;

        let root = inner.commit(commit)?.tree.clone();
        let entries = walk_tree(&mut inner.objects, &root, recursive)?
            .into_iter()
            .map(|(path, mode, oid)| -> Result<Entry, StoreError> {
                Ok(Entry {
                    path: RepoPath::new(path)?,
                    mode,
                    oid,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Tree::new(commit.clone(), root, entries))
    }

    async fn put_tree(&self, entries: &[Entry]) -> Result<Oid, StoreError> {
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::PutTree {
            entries: entries.len(),
        });
        inner.check_fail("put_tree")?;

        for entry in entries {
            let known = match entry.mode {
                EntryMode::Directory => inner.objects.trees.contains_key(&entry.oid),
                EntryMode::Submodule => true,
                _ => inner.objects.blobs.contains_key(&entry.oid),
            };
            if !known {
                return Err(StoreError::NotFound(format!(
                    "object {} for {}",
                    entry.oid, entry.path
                )));
            }
        }
        build_tree(&mut inner.objects, entries)
    }

    async fn create_commit(
        &self,
        tree: &Oid,
        parent: Option<&Oid>,
        message: &str,
    ) -> Result<Oid, StoreError> {
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::CreateCommit {
            message: message.to_string(),
        });
        inner.check_fail("create_commit")?;

        if !inner.objects.trees.contains_key(tree) {
            return Err(StoreError::NotFound(format!("tree {}", tree)));
        }
        if let Some(p) = parent {
            inner.commit(p)?;
        }
        Ok(inner.new_commit(tree.clone(), parent.cloned(), message))
    }

    async fn advance_ref(
        &self,
        branch: &BranchName,
        new: &Oid,
        expected_old: &Oid,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::AdvanceRef {
            branch: branch.to_string(),
            new: new.to_string(),
        });

        if let Some(files) = inner.interleaved.take() {
            inner.commit_files(branch, files, "interleaved writer")?;
        }
        inner.check_fail("advance_ref")?;

        inner.commit(new)?;
        match inner.refs.get(branch) {
            Some(current) if current == expected_old => {}
            Some(current) => {
                return Err(StoreError::Conflict(format!(
                    "{} is at {}, expected {}",
                    branch,
                    current.short(7),
                    expected_old.short(7)
                )))
            }
            None => return Err(StoreError::NotFound(format!("branch {}", branch))),
        }
        inner.refs.insert(branch.clone(), new.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging() -> BranchName {
        BranchName::new("staging").unwrap()
    }

    fn path(p: &str) -> RepoPath {
        RepoPath::new(p).unwrap()
    }

    // =========================================================================
    // Seeding and reads
    // =========================================================================

    mod reads {
        use super::*;

        #[tokio::test]
        async fn seeded_files_are_readable() {
            let store =
                MemoryStore::with_files(&staging(), [("a.md", "A"), ("dir/b.md", "B")]).unwrap();
            let tip = store.resolve_ref(&staging()).await.unwrap();

            let file = store.get_blob(&tip, &path("dir/b.md")).await.unwrap();
            assert_eq!(file.content, b"B");
            assert_eq!(file.oid.as_str().len(), 64);
        }

        #[tokio::test]
        async fn directory_is_not_a_blob() {
            let store = MemoryStore::with_files(&staging(), [("dir/b.md", "B")]).unwrap();
            let tip = store.resolve_ref(&staging()).await.unwrap();
            let err = store.get_blob(&tip, &path("dir")).await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
        }

        #[tokio::test]
        async fn tree_listing_includes_directories() {
            let store =
                MemoryStore::with_files(&staging(), [("a.md", "A"), ("dir/b.md", "B")]).unwrap();
            let tip = store.resolve_ref(&staging()).await.unwrap();

            let flat = store.get_tree(&tip, false).await.unwrap();
            assert_eq!(flat.len(), 2);
            assert!(flat.get(&path("dir")).unwrap().is_tree());

            let deep = store.get_tree(&tip, true).await.unwrap();
            assert_eq!(deep.len(), 3);
        }

        #[tokio::test]
        async fn missing_branch() {
            let store = MemoryStore::new();
            let err = store.resolve_ref(&staging()).await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
        }

        #[test]
        fn identical_content_shares_hash() {
            let mut table = ObjectTable::default();
            assert_eq!(table.put_blob(b"same"), table.put_blob(b"same"));
            assert_ne!(table.put_blob(b"same"), table.put_blob(b"other"));
        }
    }

    // =========================================================================
    // Ref updates
    // =========================================================================

    mod refs {
        use super::*;

        async fn child_commit(store: &MemoryStore, parent: &Oid) -> Oid {
            let blob = store.put_blob(&path("x.md"), b"x").await.unwrap();
            let tree = store
                .put_tree(&[Entry::blob(path("x.md"), blob)])
                .await
                .unwrap();
            store.create_commit(&tree, Some(parent), "child").await.unwrap()
        }

        #[tokio::test]
        async fn advance_with_matching_tip() {
            let store = MemoryStore::with_files(&staging(), [("a.md", "A")]).unwrap();
            let tip = store.resolve_ref(&staging()).await.unwrap();
            let new = child_commit(&store, &tip).await;

            store.advance_ref(&staging(), &new, &tip).await.unwrap();
            assert_eq!(store.tip(&staging()), Some(new));
            assert_eq!(store.history(&staging()), vec!["child", "initial"]);
        }

        #[tokio::test]
        async fn advance_with_stale_tip_conflicts() {
            let store = MemoryStore::with_files(&staging(), [("a.md", "A")]).unwrap();
            let tip = store.resolve_ref(&staging()).await.unwrap();
            let new = child_commit(&store, &tip).await;

            store.interleave_commit([("other.md", "O")]).unwrap();
            let err = store.advance_ref(&staging(), &new, &tip).await.unwrap_err();

            assert!(matches!(err, StoreError::Conflict(_)));
            assert_eq!(
                store.file_at_tip(&staging(), "other.md"),
                Some(b"O".to_vec())
            );
            assert_eq!(store.file_at_tip(&staging(), "x.md"), None);
        }

        #[tokio::test]
        async fn fail_on_injects_error() {
            let store = MemoryStore::with_files(&staging(), [("a.md", "A")])
                .unwrap()
                .fail_on(FailOn::PutBlob(StoreError::RateLimited));
            let err = store.put_blob(&path("b.md"), b"B").await.unwrap_err();
            assert_eq!(err, StoreError::RateLimited);

            store.clear_fail_on();
            assert!(store.put_blob(&path("b.md"), b"B").await.is_ok());
        }

        #[tokio::test]
        async fn operations_are_recorded() {
            let store = MemoryStore::with_files(&staging(), [("a.md", "A")]).unwrap();
            let tip = store.resolve_ref(&staging()).await.unwrap();
            let _ = child_commit(&store, &tip).await;

            let ops = store.operations();
            assert_eq!(
                ops[0],
                StoreOperation::ResolveRef {
                    branch: "staging".into()
                }
            );
            assert_eq!(store.write_count(), 3);
        }

        #[tokio::test]
        async fn put_tree_rejects_unknown_objects() {
            let store = MemoryStore::new();
            let bogus = Oid::new("c".repeat(64)).unwrap();
            let err = store
                .put_tree(&[Entry::blob(path("a.md"), bogus)])
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
        }
    }
}
