//! Whole-object operations.
//!
//! Puts stream into a hidden sibling of the destination and rename it into
//! place, so readers observe either the previous content or the new content,
//! never a prefix of it.

use std::io;

use bytes::Bytes;
use futures::Stream;
use tracing::debug;

use crate::checksums::hash_file;
use crate::error::{StorageError, StorageResult};
use crate::paths::hidden_sibling;
use crate::sink::{persist_stream, remove_quietly};
use crate::storage::LocalFsStorage;
use crate::types::{ObjectInfo, ObjectStream};
use crate::utils::{generate_temp_suffix, modified_at};

impl LocalFsStorage {
    /// Store `stream` as object `name`, replacing any previous content.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidName`] if `name` is rejected by the resolver.
    /// - [`StorageError::Io`] if the body cannot be read or the file cannot be
    ///   written or renamed into place.
    pub async fn put_object<S>(&self, name: &str, stream: &mut S) -> StorageResult<ObjectInfo>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin + ?Sized,
    {
        let normalized = self.resolver().normalize(name)?;
        let path = self.resolver().object_path(&normalized);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(format!("create {}", parent.display()), e))?;
        }

        let tmp = hidden_sibling(&path, &format!("upload-{}", generate_temp_suffix()));
        let written = persist_stream(stream, &tmp, self.config().sync_writes).await?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            remove_quietly(&tmp).await;
            return Err(StorageError::io(format!("rename into {}", path.display()), e));
        }

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StorageError::io(format!("stat {}", path.display()), e))?;

        debug!(
            name = %normalized,
            size = written.size,
            etag = %written.etag,
            "put_object completed"
        );

        Ok(ObjectInfo {
            name: normalized,
            size: written.size,
            etag: written.etag,
            last_modified: modified_at(&metadata),
        })
    }

    /// Open object `name` for streaming.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no object exists under `name`.
    /// - [`StorageError::InvalidName`] if `name` is rejected by the resolver.
    /// - [`StorageError::Io`] for any other open failure.
    pub async fn get_object(&self, name: &str) -> StorageResult<ObjectStream> {
        let normalized = self.resolver().normalize(name)?;
        let path = self.resolver().object_path(&normalized);

        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound {
                    name: normalized.clone(),
                }
            } else {
                StorageError::io(format!("open {}", path.display()), e)
            }
        })?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| StorageError::io(format!("stat {}", path.display()), e))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound { name: normalized });
        }

        debug!(name = %normalized, size = metadata.len(), "get_object opened");

        Ok(ObjectStream {
            name: normalized,
            size: metadata.len(),
            last_modified: modified_at(&metadata),
            reader: Box::new(file),
        })
    }

    /// Describe object `name`, digesting its content.
    ///
    /// The etag is recomputed from the bytes on disk, so an assembled object
    /// reports the plain MD5 of its content rather than its composite identity.
    pub async fn head_object(&self, name: &str) -> StorageResult<ObjectInfo> {
        let normalized = self.resolver().normalize(name)?;
        let path = self.resolver().object_path(&normalized);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(StorageError::NotFound { name: normalized }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound { name: normalized });
            }
            Err(e) => return Err(StorageError::io(format!("stat {}", path.display()), e)),
        };
        let etag = hash_file(&path).await?;

        Ok(ObjectInfo {
            name: normalized,
            size: metadata.len(),
            etag,
            last_modified: modified_at(&metadata),
        })
    }

    /// Whether object `name` exists. Any failure, including an invalid name,
    /// counts as absence.
    pub async fn object_exists(&self, name: &str) -> bool {
        let Ok(path) = self.resolver().resolve(name) else {
            return false;
        };
        tokio::fs::metadata(&path)
            .await
            .is_ok_and(|m| m.is_file())
    }

    /// Delete object `name`. Deleting a missing object succeeds.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidName`] if `name` is rejected by the resolver.
    /// - [`StorageError::Io`] if the file exists but cannot be removed.
    pub async fn delete_object(&self, name: &str) -> StorageResult<()> {
        let normalized = self.resolver().normalize(name)?;
        let path = self.resolver().object_path(&normalized);

        match tokio::fs::symlink_metadata(&path).await {
            Ok(m) if m.is_dir() => {
                debug!(name = %normalized, "delete_object skipped directory");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io(format!("stat {}", path.display()), e)),
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(name = %normalized, "delete_object completed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(format!("remove {}", path.display()), e)),
        }
    }
}
