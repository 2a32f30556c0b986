//! Concurrent writers against one branch.
//!
//! Every mutation either lands as exactly one commit on the tip it read, or
//! fails with a conflict and leaves the branch untouched. Directory-wide
//! operations additionally fail fast while another holder has the lock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use sitestore::core::types::{BranchName, Entry, File, Oid, RepoPath, Tree};
use sitestore::engine::{DirectoryService, EngineError, FileService, Locker};
use sitestore::lock::{FileLockStore, InMemoryLockStore, LockStore, RepoLock};
use sitestore::store::{MemoryStore, ObjectStore, StoreError};

fn staging() -> BranchName {
    BranchName::new("staging").unwrap()
}

fn path(p: &str) -> RepoPath {
    RepoPath::new(p).unwrap()
}

fn seeded() -> MemoryStore {
    MemoryStore::with_files(
        &staging(),
        [
            ("pages/about.md", "about"),
            ("_news/2023/recap.md", "recap"),
            ("_news/2023/launch.md", "launch"),
        ],
    )
    .unwrap()
}

const TTL: Duration = Duration::from_secs(60);

// =============================================================================
// Compare-and-swap
// =============================================================================

#[tokio::test]
async fn interleaved_writer_turns_update_into_conflict() {
    let store = seeded();
    let files = FileService::new(Arc::new(store.clone()), staging());
    let current = files.read(&path("pages/about.md")).await.unwrap();

    store
        .interleave_commit([("pages/other.md", "someone else")])
        .unwrap();
    let err = files
        .update(&path("pages/about.md"), b"mine", Some(&current.oid))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // The other writer's commit is the tip; ours never landed
    assert_eq!(store.history(&staging())[0], "interleaved writer");
    assert_eq!(
        store.file_at_tip(&staging(), "pages/about.md").unwrap(),
        b"about"
    );
    assert_eq!(
        store.file_at_tip(&staging(), "pages/other.md").unwrap(),
        b"someone else"
    );
}

#[tokio::test]
async fn two_editors_with_same_token_only_first_wins() {
    let store = seeded();
    let alice = FileService::new(Arc::new(store.clone()), staging());
    let bob = FileService::new(Arc::new(store.clone()), staging());
    let seen = alice.read(&path("pages/about.md")).await.unwrap();

    alice
        .update(&path("pages/about.md"), b"alice", Some(&seen.oid))
        .await
        .unwrap();
    let err = bob
        .update(&path("pages/about.md"), b"bob", Some(&seen.oid))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Conflict(_)));
    assert_eq!(
        store.file_at_tip(&staging(), "pages/about.md").unwrap(),
        b"alice"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_creates_never_lose_a_commit() {
    let store = seeded();
    let before = store.history(&staging()).len();

    let mut handles = Vec::new();
    for i in 0..16 {
        let files = FileService::new(Arc::new(store.clone()), staging());
        handles.push(tokio::spawn(async move {
            let p = path(&format!("pages/p{i}.md"));
            files.create(&p, format!("page {i}").as_bytes()).await.map(|_| p)
        }));
    }

    let mut landed = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(p) => landed.push(p),
            Err(EngineError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert!(!landed.is_empty());
    // One commit per successful create, nothing else
    assert_eq!(store.history(&staging()).len(), before + landed.len());
    for p in &landed {
        assert!(store.file_at_tip(&staging(), p.as_str()).is_some());
    }
    let messages: HashSet<String> = store.history(&staging()).into_iter().collect();
    assert_eq!(messages.len(), before + landed.len());
}

// =============================================================================
// Repository lock
// =============================================================================

/// Parks the first ref advance until the test releases it.
struct GatedStore {
    inner: MemoryStore,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl ObjectStore for GatedStore {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn resolve_ref(&self, branch: &BranchName) -> Result<Oid, StoreError> {
        self.inner.resolve_ref(branch).await
    }

    async fn get_blob(&self, at_commit: &Oid, path: &RepoPath) -> Result<File, StoreError> {
        self.inner.get_blob(at_commit, path).await
    }

    async fn put_blob(&self, path: &RepoPath, content: &[u8]) -> Result<Oid, StoreError> {
        self.inner.put_blob(path, content).await
    }

    async fn get_tree(&self, commit: &Oid, recursive: bool) -> Result<Tree, StoreError> {
        self.inner.get_tree(commit, recursive).await
    }

    async fn put_tree(&self, entries: &[Entry]) -> Result<Oid, StoreError> {
        self.inner.put_tree(entries).await
    }

    async fn create_commit(
        &self,
        tree: &Oid,
        parent: Option<&Oid>,
        message: &str,
    ) -> Result<Oid, StoreError> {
        self.inner.create_commit(tree, parent, message).await
    }

    async fn advance_ref(
        &self,
        branch: &BranchName,
        new: &Oid,
        expected_old: &Oid,
    ) -> Result<(), StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.advance_ref(branch, new, expected_old).await
    }
}

#[tokio::test]
async fn second_directory_rename_waits_for_first_and_builds_on_it() {
    let store = Arc::new(GatedStore::new(seeded()));
    let table: Arc<dyn LockStore> = Arc::new(InMemoryLockStore::new());
    let dirs = DirectoryService::new(
        store.clone(),
        staging(),
        Locker::new(table, "acme/site", TTL),
    );

    let first = tokio::spawn({
        let dirs = dirs.clone();
        async move { dirs.rename(&path("_news/2023"), &path("_news/2024")).await }
    });
    store.entered.notified().await;

    // The first rename holds the lock until its advance completes
    let err = dirs
        .rename(&path("_news/2024"), &path("_news/archive"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Locked { .. }));

    store.release.notify_one();
    first.await.unwrap().unwrap();

    // The second rename only works on top of the first one's tree
    dirs.rename(&path("_news/2024"), &path("_news/archive"))
        .await
        .unwrap();
    let tip = |p: &str| store.inner.file_at_tip(&staging(), p);
    assert_eq!(tip("_news/archive/recap.md").unwrap(), b"recap");
    assert_eq!(tip("_news/archive/launch.md").unwrap(), b"launch");
    assert!(tip("_news/2023/recap.md").is_none());
    assert!(tip("_news/2024/recap.md").is_none());
    assert_eq!(
        store.inner.history(&staging())[..2],
        [
            "Rename directory: _news/2024 -> _news/archive",
            "Rename directory: _news/2023 -> _news/2024"
        ]
    );
}

#[tokio::test]
async fn lock_is_scoped_to_one_repository() {
    let store = seeded();
    let table: Arc<dyn LockStore> = Arc::new(InMemoryLockStore::new());
    let dirs = DirectoryService::new(
        Arc::new(store.clone()),
        staging(),
        Locker::new(table.clone(), "acme/site", TTL),
    );

    let _other = RepoLock::acquire(table, "acme/blog", TTL).unwrap();
    dirs.delete(&path("_news/2023")).await.unwrap();
    assert!(store.file_at_tip(&staging(), "_news/2023/launch.md").is_none());
}

#[tokio::test]
async fn file_lock_store_is_shared_between_instances() {
    let dir = TempDir::new().unwrap();
    let first: Arc<dyn LockStore> = Arc::new(FileLockStore::new(dir.path()));
    let second: Arc<dyn LockStore> = Arc::new(FileLockStore::new(dir.path()));

    let store = seeded();
    let dirs = DirectoryService::new(
        Arc::new(store.clone()),
        staging(),
        Locker::new(second, "acme/site", TTL),
    );

    let held = RepoLock::acquire(first, "acme/site", TTL).unwrap();
    let err = dirs.delete(&path("_news/2023")).await.unwrap_err();
    assert!(matches!(err, EngineError::Locked { .. }));

    drop(held);
    dirs.delete(&path("_news/2023")).await.unwrap();
}

#[tokio::test]
async fn lock_is_released_after_failed_operation() {
    let store = seeded();
    let table: Arc<dyn LockStore> = Arc::new(InMemoryLockStore::new());
    let dirs = DirectoryService::new(
        Arc::new(store.clone()),
        staging(),
        Locker::new(table.clone(), "acme/site", TTL),
    );

    let err = dirs.delete(&path("missing")).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    // The guard dropped with the failed call
    let lock = RepoLock::try_acquire(table, "acme/site", TTL).unwrap();
    assert!(lock.is_some());
}
