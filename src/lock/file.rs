//! lock::file
//!
//! Lock table of lease files in a shared directory.
//!
//! # Storage
//!
//! For each repository key `K` (hashed to keep file names safe):
//!
//! - `<dir>/<hash(K)>.guard` - empty file carrying an OS-level exclusive lock
//!   for the duration of one read-modify-write of the lease
//! - `<dir>/<hash(K)>.lease` - JSON [`Lease`] of the current holder
//!
//! The guard is only held while a lease is inspected or replaced, never for
//! the lifetime of the lease itself, so the OS lock cannot outlive a crashed
//! holder. Lease liveness is decided by `expires_at` alone.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::{Lease, LockError, LockStore};

/// Lock table backed by lease files in `dir`.
#[derive(Debug, Clone)]
pub struct FileLockStore {
    dir: PathBuf,
}

/// Exclusive hold on a guard file, released on drop.
struct Guard {
    file: File,
}

impl Drop for Guard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl FileLockStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key(repo: &str) -> String {
        let digest = Sha256::digest(repo.as_bytes());
        hex::encode(&digest[..16])
    }

    fn guard_path(&self, repo: &str) -> PathBuf {
        self.dir.join(format!("{}.guard", Self::key(repo)))
    }

    /// Path of the lease file for `repo`.
    pub fn lease_path(&self, repo: &str) -> PathBuf {
        self.dir.join(format!("{}.lease", Self::key(repo)))
    }

    fn lock_guard(&self, repo: &str) -> Result<Guard, LockError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", self.dir.display(), e))
        })?;
        let path = self.guard_path(repo);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;
        // Held only for a single lease read-modify-write.
        file.lock_exclusive()?;
        Ok(Guard { file })
    }

    fn read_lease(&self, repo: &str) -> Result<Option<Lease>, LockError> {
        let path = self.lease_path(repo);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Lease>(&content) {
            Ok(lease) => Ok(Some(lease)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable lease file");
                Ok(None)
            }
        }
    }

    fn write_lease(&self, lease: &Lease) -> Result<(), LockError> {
        let path = self.lease_path(&lease.repo);
        let tmp = path.with_extension("lease.tmp");
        let json = serde_json::to_vec_pretty(lease)
            .map_err(|e| LockError::CreateFailed(e.to_string()))?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl LockStore for FileLockStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn try_acquire(&self, repo: &str, ttl: Duration) -> Result<Lease, LockError> {
        let _guard = self.lock_guard(repo)?;
        if let Some(held) = self.read_lease(repo)? {
            if held.repo == repo && !held.is_expired() {
                return Err(LockError::Locked {
                    repo: repo.to_string(),
                    until: held.expires_at,
                });
            }
        }
        let lease = Lease::grant(repo, ttl)?;
        self.write_lease(&lease)?;
        Ok(lease)
    }

    fn release(&self, lease: &Lease) -> Result<bool, LockError> {
        let _guard = self.lock_guard(&lease.repo)?;
        match self.read_lease(&lease.repo)? {
            Some(current) if current.token == lease.token => {
                fs::remove_file(self.lease_path(&lease.repo)).map_err(|e| {
                    LockError::ReleaseFailed(format!("cannot remove lease: {}", e))
                })?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
