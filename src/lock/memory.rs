//! lock::memory
//!
//! Process-local lock table.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{Lease, LockError, LockStore};

/// Lock table held in this process's memory.
///
/// Only serializes callers that share the same instance.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    leases: Mutex<HashMap<String, Lease>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockStore for InMemoryLockStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn try_acquire(&self, repo: &str, ttl: Duration) -> Result<Lease, LockError> {
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(held) = leases.get(repo) {
            if !held.is_expired() {
                return Err(LockError::Locked {
                    repo: repo.to_string(),
                    until: held.expires_at,
                });
            }
        }
        let lease = Lease::grant(repo, ttl)?;
        leases.insert(repo.to_string(), lease.clone());
        Ok(lease)
    }

    fn release(&self, lease: &Lease) -> Result<bool, LockError> {
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        match leases.get(&lease.repo) {
            Some(current) if current.token == lease.token => {
                leases.remove(&lease.repo);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
