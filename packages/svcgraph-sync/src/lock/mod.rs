//! Advisory lock over a single conditionally-writable record
//!
//! # Architecture
//!
//! - `LockStore` is the key-value seam: read a record, create it if
//!   absent, or update it only when its current fields match.
//! - `LockManager` builds acquire/release on top of those three calls,
//!   using the record's `version` as an optimistic concurrency token.
//!
//! There is no expiry: a holder that dies between acquire and release
//! leaves the record locked until an operator clears it.

pub mod file;
pub mod manager;
pub mod memory;

pub use file::FileLockStore;
pub use manager::{LockLease, LockManager};
pub use memory::MemoryLockStore;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::LockError;

pub type Result<T> = std::result::Result<T, LockError>;

/// Persistent lock record.
///
/// `version` grows by exactly one per successful acquire; `locked` is true
/// only between an acquire and its matching release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub key: String,
    pub locked: bool,
    pub version: u64,
}

/// Condition an update is applied under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expect {
    pub locked: bool,
    /// `None` matches any version
    pub version: Option<u64>,
}

impl Expect {
    pub fn matches(&self, record: &LockRecord) -> bool {
        record.locked == self.locked && self.version.map_or(true, |v| record.version == v)
    }
}

/// Fields written by a successful update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub locked: bool,
    pub version: Option<u64>,
}

impl Patch {
    pub fn apply(&self, record: &mut LockRecord) {
        record.locked = self.locked;
        if let Some(version) = self.version {
            record.version = version;
        }
    }
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// The write happened; carries the stored record
    Applied(LockRecord),
    /// The condition did not hold; carries what was stored instead
    ConditionFailed { current: Option<LockRecord> },
}

/// Key-value store with atomic single-record conditional writes.
pub trait LockStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<LockRecord>>;

    /// Store `record` only if no record exists under its key.
    fn create(&self, record: LockRecord) -> Result<WriteResult>;

    /// Apply `patch` only if the stored record satisfies `expect`.
    /// A missing record never satisfies a condition.
    fn update(&self, key: &str, expect: Expect, patch: Patch) -> Result<WriteResult>;
}

impl<T: LockStore + ?Sized> LockStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<LockRecord>> {
        (**self).get(key)
    }

    fn create(&self, record: LockRecord) -> Result<WriteResult> {
        (**self).create(record)
    }

    fn update(&self, key: &str, expect: Expect, patch: Patch) -> Result<WriteResult> {
        (**self).update(key, expect, patch)
    }
}

#[cfg(test)]
mod lock_tests {
    use super::*;

    fn record(locked: bool, version: u64) -> LockRecord {
        LockRecord {
            key: "k".to_string(),
            locked,
            version,
        }
    }

    #[test]
    fn test_expect_matches() {
        let any_unlocked = Expect { locked: false, version: None };
        assert!(any_unlocked.matches(&record(false, 9)));
        assert!(!any_unlocked.matches(&record(true, 9)));

        let exact = Expect { locked: false, version: Some(3) };
        assert!(exact.matches(&record(false, 3)));
        assert!(!exact.matches(&record(false, 4)));
    }

    #[test]
    fn test_patch_keeps_version_when_none() {
        let mut r = record(true, 5);
        Patch { locked: false, version: None }.apply(&mut r);
        assert_eq!(r, record(false, 5));

        Patch { locked: true, version: Some(6) }.apply(&mut r);
        assert_eq!(r, record(true, 6));
    }
}
