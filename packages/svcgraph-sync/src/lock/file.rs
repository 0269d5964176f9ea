//! File-backed lock store
//!
//! One JSON file per key under a directory, shared by every process that
//! opens the same directory. Each operation holds two locks for its whole
//! read-check-write:
//!
//! 1. an in-process mutex, for threads sharing one `FileLockStore`
//! 2. an `fs2` exclusive lock on the key's `<key>.guard` file, for other
//!    store instances and other processes
//!
//! Records are written to a uniquely named temp file and renamed into
//! place, so a reader never sees a half-written record and a crash leaves
//! either the old record or the new one. Advisory file locks are only as
//! good as the filesystem's; a lock directory on a network share needs a
//! store with native conditional writes behind the same trait.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;

use super::{Expect, LockRecord, LockStore, Patch, Result, WriteResult};
use crate::error::LockError;

/// Disambiguates temp files written by threads of one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct FileLockStore {
    dir: PathBuf,
    guard: Mutex<()>,
}

/// Held for the duration of one store operation on one key.
struct KeyGuard<'a> {
    file: File,
    _local: MutexGuard<'a, ()>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileLockStore {
    /// Open (creating if needed) a lock directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            guard: Mutex::new(()),
        })
    }

    fn validate_key(key: &str) -> Result<()> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
        if !valid {
            return Err(LockError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.lock.json", key))
    }

    /// Serialize against every other user of `key`, in this process or not.
    fn lock_key(&self, key: &str) -> Result<KeyGuard<'_>> {
        Self::validate_key(key)?;
        let local = self.guard.lock().map_err(|_| LockError::Poisoned)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(format!("{}.guard", key)))?;
        FileExt::lock_exclusive(&file)?;
        Ok(KeyGuard {
            file,
            _local: local,
        })
    }

    fn read(&self, path: &Path) -> Result<Option<LockRecord>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `record` beside `path`, then rename it over `path`.
    fn publish(&self, path: &Path, record: &LockRecord) -> Result<()> {
        // Leading dot keeps temp names out of the key namespace
        let tmp = self.dir.join(format!(
            ".{}.{}-{}.tmp",
            record.key,
            process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let written = write_then_rename(&tmp, path, record);
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }
}

fn write_then_rename(tmp: &Path, path: &Path, record: &LockRecord) -> Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(&serde_json::to_vec(record)?)?;
    file.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}

impl LockStore for FileLockStore {
    fn get(&self, key: &str) -> Result<Option<LockRecord>> {
        let _guard = self.lock_key(key)?;
        self.read(&self.record_path(key))
    }

    fn create(&self, record: LockRecord) -> Result<WriteResult> {
        let _guard = self.lock_key(&record.key)?;
        let path = self.record_path(&record.key);

        if let Some(current) = self.read(&path)? {
            return Ok(WriteResult::ConditionFailed {
                current: Some(current),
            });
        }
        self.publish(&path, &record)?;
        Ok(WriteResult::Applied(record))
    }

    fn update(&self, key: &str, expect: Expect, patch: Patch) -> Result<WriteResult> {
        let _guard = self.lock_key(key)?;
        let path = self.record_path(key);

        match self.read(&path)? {
            Some(mut current) if expect.matches(&current) => {
                patch.apply(&mut current);
                self.publish(&path, &current)?;
                Ok(WriteResult::Applied(current))
            }
            current => Ok(WriteResult::ConditionFailed { current }),
        }
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::tempdir;

    fn record(key: &str, locked: bool, version: u64) -> LockRecord {
        LockRecord {
            key: key.to_string(),
            locked,
            version,
        }
    }

    #[test]
    fn test_create_then_get() {
        let dir = tempdir().unwrap();
        let store = FileLockStore::open(dir.path().join("locks")).unwrap();

        assert!(store.get("sync").unwrap().is_none());
        assert_eq!(
            store.create(record("sync", true, 1)).unwrap(),
            WriteResult::Applied(record("sync", true, 1))
        );
        assert_eq!(store.get("sync").unwrap(), Some(record("sync", true, 1)));
        assert!(dir.path().join("locks").join("sync.lock.json").exists());
    }

    #[test]
    fn test_create_existing_fails_condition() {
        let dir = tempdir().unwrap();
        let store = FileLockStore::open(dir.path()).unwrap();
        store.create(record("sync", true, 1)).unwrap();

        let result = store.create(record("sync", true, 1)).unwrap();
        assert_eq!(
            result,
            WriteResult::ConditionFailed { current: Some(record("sync", true, 1)) }
        );
    }

    #[test]
    fn test_update_persists_across_instances() {
        let dir = tempdir().unwrap();
        {
            let store = FileLockStore::open(dir.path()).unwrap();
            store.create(record("sync", true, 1)).unwrap();
            store
                .update("sync", Expect { locked: true, version: None }, Patch { locked: false, version: None })
                .unwrap();
        }

        let store = FileLockStore::open(dir.path()).unwrap();
        assert_eq!(store.get("sync").unwrap(), Some(record("sync", false, 1)));
    }

    #[test]
    fn test_update_condition_failed_leaves_file() {
        let dir = tempdir().unwrap();
        let store = FileLockStore::open(dir.path()).unwrap();
        store.create(record("sync", false, 4)).unwrap();

        let result = store
            .update("sync", Expect { locked: false, version: Some(3) }, Patch { locked: true, version: Some(4) })
            .unwrap();
        assert!(matches!(result, WriteResult::ConditionFailed { .. }));
        assert_eq!(store.get("sync").unwrap(), Some(record("sync", false, 4)));
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let dir = tempdir().unwrap();
        let store = FileLockStore::open(dir.path()).unwrap();

        for key in ["", "../x", "a/b", ".hidden"] {
            assert!(
                matches!(store.get(key), Err(LockError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_leaves_only_record_and_guard() {
        let dir = tempdir().unwrap();
        let store = FileLockStore::open(dir.path()).unwrap();
        store.create(record("sync", true, 1)).unwrap();
        store
            .update("sync", Expect { locked: true, version: None }, Patch { locked: false, version: None })
            .unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["sync.guard".to_string(), "sync.lock.json".to_string()]);
    }

    #[test]
    fn test_existing_empty_guard_file_is_reused() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("sync.guard"), b"").unwrap();
        let store = FileLockStore::open(dir.path()).unwrap();

        assert!(matches!(store.create(record("sync", true, 1)).unwrap(), WriteResult::Applied(_)));
        assert_eq!(store.get("sync").unwrap(), Some(record("sync", true, 1)));
    }

    /// Stores opened separately on one directory share nothing in memory;
    /// only the guard file serializes them.
    #[test]
    fn test_separate_instances_create_once() {
        let dir = tempdir().unwrap();
        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let store = FileLockStore::open(dir.path()).unwrap();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.create(record("sync", true, 1))
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            match handle.join().unwrap().unwrap() {
                WriteResult::Applied(_) => applied += 1,
                WriteResult::ConditionFailed { current } => {
                    assert_eq!(current, Some(record("sync", true, 1)))
                }
            }
        }
        assert_eq!(applied, 1);
    }

    #[test]
    fn test_separate_instances_cas_once() {
        let dir = tempdir().unwrap();
        FileLockStore::open(dir.path())
            .unwrap()
            .create(record("sync", false, 3))
            .unwrap();

        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let store = FileLockStore::open(dir.path()).unwrap();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.update(
                        "sync",
                        Expect { locked: false, version: Some(3) },
                        Patch { locked: true, version: Some(4) },
                    )
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .filter(|r| matches!(r, WriteResult::Applied(_)))
            .count();
        assert_eq!(applied, 1);

        let store = FileLockStore::open(dir.path()).unwrap();
        assert_eq!(store.get("sync").unwrap(), Some(record("sync", true, 4)));
    }
}
