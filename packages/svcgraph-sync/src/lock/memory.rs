//! In-process lock store

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Expect, LockRecord, LockStore, Patch, Result, WriteResult};
use crate::error::LockError;

/// Mutex-guarded map. Every call is one critical section, which is what
/// makes `create`/`update` atomic.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    records: Mutex<HashMap<String, LockRecord>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockStore for MemoryLockStore {
    fn get(&self, key: &str) -> Result<Option<LockRecord>> {
        let records = self.records.lock().map_err(|_| LockError::Poisoned)?;
        Ok(records.get(key).cloned())
    }

    fn create(&self, record: LockRecord) -> Result<WriteResult> {
        let mut records = self.records.lock().map_err(|_| LockError::Poisoned)?;
        if let Some(current) = records.get(&record.key) {
            return Ok(WriteResult::ConditionFailed {
                current: Some(current.clone()),
            });
        }
        records.insert(record.key.clone(), record.clone());
        Ok(WriteResult::Applied(record))
    }

    fn update(&self, key: &str, expect: Expect, patch: Patch) -> Result<WriteResult> {
        let mut records = self.records.lock().map_err(|_| LockError::Poisoned)?;
        match records.get_mut(key) {
            Some(current) if expect.matches(current) => {
                patch.apply(current);
                Ok(WriteResult::Applied(current.clone()))
            }
            current => Ok(WriteResult::ConditionFailed {
                current: current.map(|r| r.clone()),
            }),
        }
    }
}
