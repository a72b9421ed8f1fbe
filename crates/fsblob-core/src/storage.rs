//! The filesystem-backed storage provider.
//!
//! [`LocalFsStorage`] owns the two storage roots and nothing else: every piece
//! of object and session state lives on disk, so a restarted process picks up
//! exactly where the previous one left off. The operations themselves are
//! split across the `ops` modules:
//!
//! - `ops::object`: whole-object put/get/head/exists/delete
//! - `ops::part`: streaming part writes through the hashing sink
//! - `ops::session`: session create/inspect/list/abort/purge
//! - `ops::assemble`: verified, ordered, atomic assembly
//!
//! The only in-process state is a map of per-session assembly locks, which
//! serializes concurrent completions of the same session token.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::paths::PathResolver;

/// Object storage on a local filesystem.
///
/// # Examples
///
/// ```
/// use fsblob_core::{LocalFsStorage, StorageConfig};
///
/// # tokio_test::block_on(async {
/// let dir = tempfile::tempdir().unwrap();
/// let config = StorageConfig::builder()
///     .uploads_dir(dir.path().join("uploads"))
///     .temp_uploads_dir(dir.path().join("temp-uploads"))
///     .build();
/// let storage = LocalFsStorage::open(config).await.unwrap();
/// assert!(!storage.object_exists("missing.txt").await);
/// # });
/// ```
pub struct LocalFsStorage {
    resolver: PathResolver,
    config: Arc<StorageConfig>,
    assembly_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for LocalFsStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFsStorage")
            .field("uploads_root", &self.resolver.uploads_root())
            .field("temp_root", &self.resolver.temp_root())
            .field("name_policy", &self.resolver.policy())
            .field("active_assemblies", &self.assembly_locks.len())
            .finish()
    }
}

impl LocalFsStorage {
    /// Open (creating if needed) the storage roots named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if either root cannot be created.
    pub async fn open(config: StorageConfig) -> StorageResult<Self> {
        for dir in [&config.uploads_dir, &config.temp_uploads_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::io(format!("create {}", dir.display()), e))?;
        }

        let resolver = PathResolver::new(
            config.uploads_dir.clone(),
            config.temp_uploads_dir.clone(),
            config.name_policy,
        );

        debug!(
            uploads_dir = %config.uploads_dir.display(),
            temp_uploads_dir = %config.temp_uploads_dir.display(),
            name_policy = %config.name_policy,
            "opened LocalFsStorage"
        );

        Ok(Self {
            resolver,
            config: Arc::new(config),
            assembly_locks: DashMap::new(),
        })
    }

    /// The path resolver in use.
    #[must_use]
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// The configuration this storage was opened with.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Lock guarding assembly of `token`, created on first use.
    pub(crate) fn assembly_lock(&self, token: &str) -> Arc<Mutex<()>> {
        Arc::clone(&self.assembly_locks.entry(token.to_owned()).or_default())
    }

    /// Drop the lock entry for `token` once nobody else holds it.
    pub(crate) fn release_assembly_lock(&self, token: &str) {
        self.assembly_locks
            .remove_if(token, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    pub(crate) fn assembly_locks_len(&self) -> usize {
        self.assembly_locks.len()
    }
}
