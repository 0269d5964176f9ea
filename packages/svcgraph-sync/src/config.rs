//! Sync configuration
//!
//! All three externally meaningful knobs live here: which lock record
//! serializes writers, where the graph lives, and which service tag
//! declares a dependency. Nothing downstream hard-codes them.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Tag key that declares a service-to-service dependency.
pub const DEFAULT_DEPENDENCY_TAG: &str = "NEO4J_RELATIONSHIP_TO_SERVICE";

/// Lock record key shared by every sync worker.
pub const DEFAULT_LOCK_KEY: &str = "svcgraph-sync-lock";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Identifier of the lock record
    pub lock_key: String,
    /// Directory backing the file lock store
    pub lock_dir: PathBuf,
    /// Graph store target (JSON image path)
    pub graph_path: PathBuf,
    /// Tag key whose value names the service this one depends on
    pub dependency_tag: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock_key: DEFAULT_LOCK_KEY.to_string(),
            lock_dir: PathBuf::from("locks"),
            graph_path: PathBuf::from("svcgraph.json"),
            dependency_tag: DEFAULT_DEPENDENCY_TAG.to_string(),
        }
    }
}

impl SyncConfig {
    /// Validate values that would otherwise fail deep inside a transaction.
    ///
    /// The lock key doubles as a file name in `FileLockStore`, so it is
    /// restricted to `[a-zA-Z0-9_.-]` and 1-128 characters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = &self.lock_key;
        if key.is_empty() || key.len() > 128 {
            return Err(ConfigError::InvalidLockKey(
                "Key must be 1-128 characters".to_string(),
            ));
        }

        let valid = key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
        if !valid || key.starts_with('.') {
            return Err(ConfigError::InvalidLockKey(format!(
                "'{}' may only contain a-z, A-Z, 0-9, _, -, . and must not start with '.'",
                key
            )));
        }

        if self.dependency_tag.trim().is_empty() {
            return Err(ConfigError::EmptyDependencyTag);
        }

        Ok(())
    }
}
