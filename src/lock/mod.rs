//! lock
//!
//! Advisory, TTL-bounded repository locks.
//!
//! # Architecture
//!
//! Multi-step operations (directory delete and rename, paired content and
//! index edits) need more than the per-commit compare-and-swap: they hold a
//! [`RepoLock`] for the whole read-modify-write. The lock table itself is an
//! injected [`LockStore`]:
//!
//! - [`InMemoryLockStore`] - process-local, for single-instance deployments
//! - [`FileLockStore`] - lease files in a shared directory, for several
//!   instances on one host or a shared volume
//!
//! # Invariants
//!
//! - Acquisition is non-blocking: a held, unexpired lease fails fast with
//!   [`LockError::Locked`]
//! - An expired lease may be taken over by the next acquirer
//! - Release is token-checked: a holder whose lease expired and was taken
//!   over cannot release the new holder's lease
//! - [`RepoLock`] releases on drop
//!
//! # Example
//!
//! ```ignore
//! use sitestore::lock::{InMemoryLockStore, RepoLock};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let table = Arc::new(InMemoryLockStore::new());
//! let lock = RepoLock::acquire(table.clone(), "my-site", Duration::from_secs(60))?;
//!
//! // Perform the multi-step mutation while holding the lock
//! // ...
//!
//! drop(lock);
//! ```

mod file;
mod memory;

pub use file::FileLockStore;
pub use memory::InMemoryLockStore;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::config::{Config, LockBackendKind};

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another holder has an unexpired lease.
    #[error("repository '{repo}' is locked until {until}")]
    Locked {
        repo: String,
        until: DateTime<Utc>,
    },

    /// The requested lease lifetime cannot be represented.
    #[error("invalid lock ttl: {0:?}")]
    InvalidTtl(Duration),

    /// Failed to create the lock table's storage.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),

    /// I/O error during lock operations.
    #[error("lock i/o error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A granted lock lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Repository the lease covers.
    pub repo: String,
    /// Identifies this grant; release must present it.
    pub token: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Grant a fresh lease on `repo` lasting `ttl` from now.
    pub fn grant(repo: &str, ttl: Duration) -> Result<Self, LockError> {
        let ttl_delta = chrono::Duration::from_std(ttl).map_err(|_| LockError::InvalidTtl(ttl))?;
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl_delta)
            .ok_or(LockError::InvalidTtl(ttl))?;
        Ok(Self {
            repo: repo.to_string(),
            token: Uuid::new_v4(),
            acquired_at: now,
            expires_at,
        })
    }

    /// Whether the lease has run out at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Build the lock table selected by `config`.
pub fn open_lock_store(config: &Config) -> Arc<dyn LockStore> {
    match config.lock_backend() {
        LockBackendKind::Memory => Arc::new(InMemoryLockStore::new()),
        LockBackendKind::File => Arc::new(FileLockStore::new(config.lock_dir())),
    }
}

/// A table of repository leases.
pub trait LockStore: Send + Sync {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Grant a lease on `repo` unless an unexpired one is held.
    ///
    /// # Errors
    ///
    /// - [`LockError::Locked`] if another holder's lease is still live
    fn try_acquire(&self, repo: &str, ttl: Duration) -> Result<Lease, LockError>;

    /// Release `lease` if it is still the current lease on its repository.
    ///
    /// Returns `false` when the lease had already expired and been replaced
    /// (or removed); nothing is changed in that case.
    fn release(&self, lease: &Lease) -> Result<bool, LockError>;
}

/// An exclusive lease on one repository.
///
/// The lease is released when this guard is dropped.
pub struct RepoLock {
    store: Arc<dyn LockStore>,
    lease: Option<Lease>,
}

impl std::fmt::Debug for RepoLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoLock")
            .field("store", &self.store.name())
            .field("lease", &self.lease)
            .finish()
    }
}

impl RepoLock {
    /// Attempt to acquire the lock on `repo`. Never blocks.
    ///
    /// # Errors
    ///
    /// - [`LockError::Locked`] if another holder has an unexpired lease
    /// - any storage error of the lock table
    pub fn acquire(store: Arc<dyn LockStore>, repo: &str, ttl: Duration) -> Result<Self, LockError> {
        match store.try_acquire(repo, ttl) {
            Ok(lease) => {
                debug!(repo, token = %lease.token, store = store.name(), "lock acquired");
                Ok(Self {
                    store,
                    lease: Some(lease),
                })
            }
            Err(e @ LockError::Locked { .. }) => {
                warn!(repo, error = %e, "lock contention");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Try to acquire the lock, returning None if already held.
    pub fn try_acquire(
        store: Arc<dyn LockStore>,
        repo: &str,
        ttl: Duration,
    ) -> Result<Option<Self>, LockError> {
        match Self::acquire(store, repo, ttl) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::Locked { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check if this guard still holds a lease.
    pub fn is_held(&self) -> bool {
        self.lease.is_some()
    }

    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    /// Release the lock explicitly. Safe to call more than once.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(lease) = self.lease.take() {
            if !self.store.release(&lease)? {
                warn!(repo = %lease.repo, token = %lease.token, "lease expired before release");
            } else {
                debug!(repo = %lease.repo, "lock released");
            }
        }
        Ok(())
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to release lock on drop");
        }
    }
}
