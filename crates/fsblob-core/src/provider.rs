//! The logical storage surface consumed by transport layers.
//!
//! [`StorageProvider`] is what an HTTP front end talks to. It speaks in
//! object names and session tokens and never exposes filesystem paths.
//!
//! # Object safety
//!
//! The trait uses `#[async_trait]` so that it can be held as
//! `Arc<dyn StorageProvider>` by a service that does not care which backend
//! it is talking to.

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::paths::validate_part_number;
use crate::sink::ByteStream;
use crate::storage::LocalFsStorage;
use crate::target::Target;
use crate::types::{
    CompletedPart, ObjectInfo, ObjectStream, PartInfo, SessionInfo, WriteOutcome,
};

/// Object storage with multipart sessions.
#[async_trait]
pub trait StorageProvider: Send + Sync + 'static {
    /// Where to upload object `name` in one request.
    async fn put_object_target(&self, name: &str) -> StorageResult<Target>;

    /// Where to download object `name`.
    async fn get_object_target(&self, name: &str) -> StorageResult<Target>;

    /// Start a multipart session for object `name`, returning its token.
    async fn create_session(&self, name: &str) -> StorageResult<String>;

    /// Describe live session `token`.
    async fn session_info(&self, token: &str) -> StorageResult<SessionInfo>;

    /// Where to upload part `part_number` of session `token`.
    async fn part_target(&self, name: &str, token: &str, part_number: u32)
    -> StorageResult<Target>;

    /// Assemble the listed parts into object `name`.
    async fn complete_session(
        &self,
        name: &str,
        token: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<ObjectInfo>;

    /// Abandon session `token`. Aborting an unknown session succeeds.
    async fn abort_session(&self, name: &str, token: &str) -> StorageResult<()>;

    /// Receive bytes for either a whole object (no token, no part number) or
    /// one part of a session (both present).
    async fn write_stream(
        &self,
        stream: ByteStream,
        name: &str,
        token: Option<&str>,
        part_number: Option<u32>,
    ) -> StorageResult<WriteOutcome>;

    /// Open object `name` for streaming.
    async fn read_object(&self, name: &str) -> StorageResult<ObjectStream>;

    /// Describe object `name`.
    async fn head_object(&self, name: &str) -> StorageResult<ObjectInfo>;

    /// Whether object `name` exists.
    async fn object_exists(&self, name: &str) -> bool;

    /// Delete object `name`; deleting a missing object succeeds.
    async fn delete_object(&self, name: &str) -> StorageResult<()>;

    /// Parts uploaded so far to session `token`.
    async fn list_parts(&self, name: &str, token: &str) -> StorageResult<Vec<PartInfo>>;
}

#[async_trait]
impl StorageProvider for LocalFsStorage {
    async fn put_object_target(&self, name: &str) -> StorageResult<Target> {
        let normalized = self.resolver().normalize(name)?;
        Ok(Target::put_object(&self.config().public_base_url, &normalized))
    }

    async fn get_object_target(&self, name: &str) -> StorageResult<Target> {
        let normalized = self.resolver().normalize(name)?;
        Ok(Target::get_object(&self.config().public_base_url, &normalized))
    }

    async fn create_session(&self, name: &str) -> StorageResult<String> {
        LocalFsStorage::create_session(self, name).await
    }

    async fn session_info(&self, token: &str) -> StorageResult<SessionInfo> {
        LocalFsStorage::session_info(self, token).await
    }

    async fn part_target(
        &self,
        name: &str,
        token: &str,
        part_number: u32,
    ) -> StorageResult<Target> {
        validate_part_number(part_number)?;
        let session = self.load_session_for(name, token).await?;
        Ok(Target::part(
            &self.config().public_base_url,
            &session.object_name,
            token,
            part_number,
        ))
    }

    async fn complete_session(
        &self,
        name: &str,
        token: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<ObjectInfo> {
        LocalFsStorage::complete_session(self, name, token, parts).await
    }

    async fn abort_session(&self, name: &str, token: &str) -> StorageResult<()> {
        let normalized = self.resolver().normalize(name)?;
        match self.load_session(token).await {
            Ok(session) if session.object_name != normalized => {
                Err(StorageError::invalid_session(
                    token,
                    format!(
                        "session was created for {:?}, not {normalized:?}",
                        session.object_name
                    ),
                ))
            }
            Ok(_) | Err(StorageError::InvalidSession { .. }) => {
                LocalFsStorage::abort_session(self, token).await
            }
            Err(e) => Err(e),
        }
    }

    async fn write_stream(
        &self,
        mut stream: ByteStream,
        name: &str,
        token: Option<&str>,
        part_number: Option<u32>,
    ) -> StorageResult<WriteOutcome> {
        match (token, part_number) {
            (None, None) => self
                .put_object(name, &mut stream)
                .await
                .map(WriteOutcome::Object),
            (Some(token), Some(part_number)) => {
                validate_part_number(part_number)?;
                self.load_session_for(name, token).await?;
                self.write_part(token, part_number, &mut stream)
                    .await
                    .map(WriteOutcome::Part)
            }
            (Some(_), None) => Err(StorageError::InvalidArgument {
                message: "a session token requires a part number".to_owned(),
            }),
            (None, Some(_)) => Err(StorageError::InvalidArgument {
                message: "a part number requires a session token".to_owned(),
            }),
        }
    }

    async fn read_object(&self, name: &str) -> StorageResult<ObjectStream> {
        self.get_object(name).await
    }

    async fn head_object(&self, name: &str) -> StorageResult<ObjectInfo> {
        LocalFsStorage::head_object(self, name).await
    }

    async fn object_exists(&self, name: &str) -> bool {
        LocalFsStorage::object_exists(self, name).await
    }

    async fn delete_object(&self, name: &str) -> StorageResult<()> {
        LocalFsStorage::delete_object(self, name).await
    }

    async fn list_parts(&self, name: &str, token: &str) -> StorageResult<Vec<PartInfo>> {
        self.load_session_for(name, token).await?;
        LocalFsStorage::list_parts(self, token).await
    }
}
