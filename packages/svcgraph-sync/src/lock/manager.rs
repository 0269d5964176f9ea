//! LockManager - single-attempt optimistic acquire/release

use super::{Expect, LockRecord, LockStore, Patch, Result, WriteResult};
use crate::error::LockError;

/// Proof of a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    pub key: String,
    /// Record version written by this acquire
    pub version: u64,
}

/// Acquires and releases named advisory locks.
///
/// Acquire is fail-fast: one conditional write, no polling, no backoff.
/// A busy lock or a lost race surfaces as `LockError::Conflict` and the
/// caller decides whether to try again later.
pub struct LockManager<S: LockStore> {
    store: S,
}

impl<S: LockStore> LockManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Take the lock named `key`.
    ///
    /// First-ever acquire creates the record already locked at version 1.
    /// Afterwards, the version read here is the CAS token: if another
    /// acquirer wins between our read and our write, its version bump makes
    /// our condition fail.
    pub fn acquire(&self, key: &str) -> Result<LockLease> {
        let Some(current) = self.store.get(key)? else {
            let initial = LockRecord {
                key: key.to_string(),
                locked: true,
                version: 1,
            };
            return match self.store.create(initial)? {
                WriteResult::Applied(record) => {
                    tracing::info!(key, version = record.version, "lock created and acquired");
                    Ok(LockLease {
                        key: key.to_string(),
                        version: record.version,
                    })
                }
                WriteResult::ConditionFailed { .. } => {
                    tracing::warn!(key, "lock created concurrently by another holder");
                    Err(LockError::Conflict { key: key.to_string() })
                }
            };
        };

        if current.locked {
            tracing::warn!(key, version = current.version, "lock is held");
            return Err(LockError::Conflict { key: key.to_string() });
        }

        let expect = Expect {
            locked: false,
            version: Some(current.version),
        };
        let patch = Patch {
            locked: true,
            version: Some(current.version + 1),
        };
        match self.store.update(key, expect, patch)? {
            WriteResult::Applied(record) => {
                tracing::info!(key, version = record.version, "lock acquired");
                Ok(LockLease {
                    key: key.to_string(),
                    version: record.version,
                })
            }
            WriteResult::ConditionFailed { current } => {
                tracing::warn!(
                    key,
                    read_version = ?expect.version,
                    current = ?current,
                    "lost lock race"
                );
                Err(LockError::Conflict { key: key.to_string() })
            }
        }
    }

    /// Release the lock named `key`. Version is left unchanged.
    ///
    /// Releasing an unlocked (or never created) record is a lock
    /// discipline bug and fails with `LockError::NotHeld`.
    pub fn release(&self, key: &str) -> Result<()> {
        let expect = Expect {
            locked: true,
            version: None,
        };
        let patch = Patch {
            locked: false,
            version: None,
        };
        match self.store.update(key, expect, patch)? {
            WriteResult::Applied(record) => {
                tracing::info!(key, version = record.version, "lock released");
                Ok(())
            }
            WriteResult::ConditionFailed { .. } => Err(LockError::NotHeld { key: key.to_string() }),
        }
    }

    /// Current record for diagnostics
    pub fn status(&self, key: &str) -> Result<Option<LockRecord>> {
        self.store.get(key)
    }
}
