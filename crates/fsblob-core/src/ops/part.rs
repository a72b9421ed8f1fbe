//! Streaming part writes.

use std::io;

use bytes::Bytes;
use futures::Stream;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::paths::validate_part_number;
use crate::sink::{persist_stream, remove_quietly};
use crate::storage::LocalFsStorage;
use crate::types::PartInfo;
use crate::utils::{generate_temp_suffix, modified_at};

impl LocalFsStorage {
    /// Store part `part_number` of session `token`, returning its identity.
    ///
    /// The body is hashed while it is written to `part-<n>.<id>.partial` and
    /// the file is then renamed to `part-<n>`. When the same part is written
    /// concurrently the last rename wins, and the surviving bytes always match
    /// the identity returned to that writer.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidPartNumber`] if `part_number` is outside
    ///   `1..=10000`.
    /// - [`StorageError::InvalidSession`] if the session does not exist or is
    ///   being assembled.
    /// - [`StorageError::Io`] if the body cannot be read or the part cannot be
    ///   stored, including when the session is aborted mid-write.
    pub async fn write_part<S>(
        &self,
        token: &str,
        part_number: u32,
        stream: &mut S,
    ) -> StorageResult<PartInfo>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin + ?Sized,
    {
        validate_part_number(part_number)?;
        let session = self.load_session(token).await?;
        if self.is_assembling(token).await? {
            return Err(StorageError::invalid_session(
                token,
                "session is being assembled and no longer accepts parts",
            ));
        }

        let path = self.resolver().part_path(token, part_number)?;
        let partial = session.dir.join(format!(
            "part-{part_number}.{}.partial",
            generate_temp_suffix()
        ));
        let written = persist_stream(stream, &partial, self.config().sync_writes).await?;

        if let Err(e) = tokio::fs::rename(&partial, &path).await {
            remove_quietly(&partial).await;
            return Err(StorageError::io(format!("rename into {}", path.display()), e));
        }

        let last_modified = tokio::fs::metadata(&path)
            .await
            .map_or_else(|_| chrono::Utc::now(), |m| modified_at(&m));

        debug!(
            token = %token,
            part_number,
            size = written.size,
            etag = %written.etag,
            "write_part completed"
        );

        Ok(PartInfo {
            part_number,
            etag: written.etag,
            size: written.size,
            last_modified,
        })
    }
}
