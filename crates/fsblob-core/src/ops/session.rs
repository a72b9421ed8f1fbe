//! Upload session lifecycle.
//!
//! A session is nothing but its directory under the temp-uploads root. The
//! directory holds `_objectName` from the moment the session is created, the
//! `_assembling` marker once assembly starts, and one `part-<n>` file per
//! uploaded part. Everything here can be reconstructed from disk after a
//! restart.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, trace, warn};

use crate::checksums::hash_file;
use crate::error::{StorageError, StorageResult};
use crate::paths::{
    RECEIPT_SUFFIX, SESSION_DIR_PREFIX, parse_part_file_name, parse_session_dir_name,
};
use crate::storage::LocalFsStorage;
use crate::types::{PartInfo, SessionInfo, SessionState};
use crate::utils::{created_at, generate_session_token, modified_at};

/// A session that was found on disk.
#[derive(Debug, Clone)]
pub(crate) struct LiveSession {
    pub token: String,
    pub object_name: String,
    pub dir: PathBuf,
}

impl LocalFsStorage {
    /// Start a session that will produce object `name`.
    ///
    /// The name is normalized up front, so an unusable name fails here rather
    /// than at completion time.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidName`] if `name` is rejected by the resolver.
    /// - [`StorageError::Io`] if the session directory cannot be created.
    pub async fn create_session(&self, name: &str) -> StorageResult<String> {
        let normalized = self.resolver().normalize(name)?;
        let token = generate_session_token();
        let dir = self.resolver().session_dir(&token)?;
        let meta = self.resolver().session_meta_path(&token)?;

        tokio::fs::create_dir(&dir)
            .await
            .map_err(|e| StorageError::io(format!("create {}", dir.display()), e))?;
        if let Err(e) = tokio::fs::write(&meta, normalized.as_bytes()).await {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                warn!(
                    dir = %dir.display(),
                    error = %cleanup,
                    "failed to remove half-created session"
                );
            }
            return Err(StorageError::io(format!("write {}", meta.display()), e));
        }

        info!(token = %token, name = %normalized, "created upload session");
        Ok(token)
    }

    /// Load a session, failing with [`StorageError::InvalidSession`] if it
    /// does not exist (never created, aborted, or already completed).
    pub(crate) async fn load_session(&self, token: &str) -> StorageResult<LiveSession> {
        let dir = self.resolver().session_dir(token)?;
        let meta = self.resolver().session_meta_path(token)?;

        let object_name = match tokio::fs::read_to_string(&meta).await {
            Ok(name) => name,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::invalid_session(
                    token,
                    "no such session, or it was already completed or aborted",
                ));
            }
            Err(e) => return Err(StorageError::io(format!("read {}", meta.display()), e)),
        };

        Ok(LiveSession {
            token: token.to_owned(),
            object_name,
            dir,
        })
    }

    /// Load a session and check that it was created for object `name`.
    pub(crate) async fn load_session_for(
        &self,
        name: &str,
        token: &str,
    ) -> StorageResult<LiveSession> {
        let normalized = self.resolver().normalize(name)?;
        let session = self.load_session(token).await?;
        if session.object_name != normalized {
            return Err(StorageError::invalid_session(
                token,
                format!(
                    "session was created for {:?}, not {normalized:?}",
                    session.object_name
                ),
            ));
        }
        Ok(session)
    }

    /// Whether assembly of `token` has started.
    pub(crate) async fn is_assembling(&self, token: &str) -> StorageResult<bool> {
        let marker = self.resolver().assembling_marker_path(token)?;
        Ok(tokio::fs::try_exists(&marker).await.unwrap_or(false))
    }

    /// Describe a live session.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidSession`] if the session does not exist.
    /// - [`StorageError::Io`] if its directory cannot be inspected.
    pub async fn session_info(&self, token: &str) -> StorageResult<SessionInfo> {
        let session = self.load_session(token).await?;
        let metadata = tokio::fs::metadata(&session.dir)
            .await
            .map_err(|e| StorageError::io(format!("stat {}", session.dir.display()), e))?;
        let state = if self.is_assembling(token).await? {
            SessionState::Assembling
        } else {
            SessionState::Accumulating
        };

        Ok(SessionInfo {
            token: session.token,
            object_name: session.object_name,
            initiated: created_at(&metadata),
            state,
        })
    }

    /// Every live session under the temp-uploads root, oldest first.
    ///
    /// Entries that cannot be read (for example a session aborted while the
    /// listing runs) are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the temp-uploads root cannot be read.
    pub async fn list_sessions(&self) -> StorageResult<Vec<SessionInfo>> {
        let root = self.resolver().temp_root();
        let mut entries = tokio::fs::read_dir(root)
            .await
            .map_err(|e| StorageError::io(format!("read {}", root.display()), e))?;

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(format!("read {}", root.display()), e))?
        {
            let file_name = entry.file_name();
            let Some(token) = file_name.to_str().and_then(parse_session_dir_name) else {
                continue;
            };
            if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            match self.session_info(token).await {
                Ok(info) => sessions.push(info),
                Err(e) => debug!(token = %token, error = %e, "skipping unreadable session"),
            }
        }

        sessions.sort_by(|a, b| a.initiated.cmp(&b.initiated).then_with(|| a.token.cmp(&b.token)));
        Ok(sessions)
    }

    /// Parts currently stored in a session, ascending by part number. Etags
    /// are recomputed from the bytes on disk.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidSession`] if the session does not exist.
    /// - [`StorageError::Io`] if the session directory cannot be read.
    pub async fn list_parts(&self, token: &str) -> StorageResult<Vec<PartInfo>> {
        let session = self.load_session(token).await?;
        let mut entries = tokio::fs::read_dir(&session.dir)
            .await
            .map_err(|e| StorageError::io(format!("read {}", session.dir.display()), e))?;

        let mut parts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(format!("read {}", session.dir.display()), e))?
        {
            let file_name = entry.file_name();
            let Some(part_number) = file_name.to_str().and_then(parse_part_file_name) else {
                continue;
            };
            let path = entry.path();
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(format!("stat {}", path.display()), e)),
            };
            let etag = match hash_file(&path).await {
                Ok(etag) => etag,
                Err(StorageError::Io { source, .. })
                    if source.kind() == io::ErrorKind::NotFound =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            };
            parts.push(PartInfo {
                part_number,
                etag,
                size: metadata.len(),
                last_modified: modified_at(&metadata),
            });
        }

        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    /// Abort a session, removing its directory and any completion receipt.
    ///
    /// Aborting an unknown or already aborted session succeeds. An assembly
    /// of the same session running in this process finishes first.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidSession`] if `token` is malformed.
    /// - [`StorageError::Io`] if the directory exists but cannot be removed.
    pub async fn abort_session(&self, token: &str) -> StorageResult<()> {
        let dir = self.resolver().session_dir(token)?;
        let receipt = self.resolver().receipt_path(token)?;

        let lock = self.assembly_lock(token);
        let result = {
            let _guard = lock.lock().await;
            remove_session_files(&dir, &receipt).await
        };
        drop(lock);
        self.release_assembly_lock(token);

        result?;
        info!(token = %token, "aborted upload session");
        Ok(())
    }

    /// Remove sessions whose last activity is older than `max_age`. Returns
    /// the number of sessions removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the temp-uploads root cannot be read.
    /// Failures on individual entries are logged and skipped.
    pub async fn purge_stale_sessions(&self, max_age: Duration) -> StorageResult<usize> {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };
        let root = self.resolver().temp_root();
        let mut entries = tokio::fs::read_dir(root)
            .await
            .map_err(|e| StorageError::io(format!("read {}", root.display()), e))?;

        let mut stale_sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(format!("read {}", root.display()), e))?
        {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_dir() || modified_at(&metadata) >= cutoff {
                continue;
            }
            if let Some(token) = entry.file_name().to_str().and_then(parse_session_dir_name) {
                stale_sessions.push(token.to_owned());
            }
        }

        let mut removed = 0;
        for token in stale_sessions {
            match self.abort_session(&token).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(token = %token, error = %e, "failed to purge stale session"),
            }
        }
        if removed > 0 {
            info!(removed, max_age_secs = max_age.as_secs(), "purged stale sessions");
        }
        Ok(removed)
    }

    /// Remove completion receipts written more than `max_age` ago. Returns
    /// the number of receipts removed.
    ///
    /// A session whose receipt is gone can no longer be completed again.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the temp-uploads root cannot be read.
    pub async fn purge_stale_receipts(&self, max_age: Duration) -> StorageResult<usize> {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };
        let root = self.resolver().temp_root();
        let mut entries = tokio::fs::read_dir(root)
            .await
            .map_err(|e| StorageError::io(format!("read {}", root.display()), e))?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(format!("read {}", root.display()), e))?
        {
            let file_name = entry.file_name();
            let Some(token) = file_name
                .to_str()
                .and_then(|n| n.strip_prefix(SESSION_DIR_PREFIX))
                .and_then(|rest| rest.strip_suffix(RECEIPT_SUFFIX))
            else {
                continue;
            };
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() || modified_at(&metadata) >= cutoff {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    removed += 1;
                    trace!(token = %token, "removed expired completion receipt");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(token = %token, error = %e, "failed to remove completion receipt");
                }
            }
        }

        if removed > 0 {
            debug!(removed, max_age_secs = max_age.as_secs(), "purged completion receipts");
        }
        Ok(removed)
    }
}

/// Attempts at removing a session directory that keeps gaining entries.
const REMOVE_DIR_ATTEMPTS: usize = 5;

async fn remove_session_files(dir: &Path, receipt: &Path) -> StorageResult<()> {
    remove_session_dir(dir).await?;
    match tokio::fs::remove_file(receipt).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(format!("remove {}", receipt.display()), e)),
    }
}

/// Remove a session directory, tolerating it being gone already. A part write
/// racing the removal can add a file after the listing; the removal is then
/// retried, and the part write fails once the directory is gone.
async fn remove_session_dir(dir: &Path) -> StorageResult<()> {
    let mut attempt = 1;
    loop {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e)
                if e.kind() == io::ErrorKind::DirectoryNotEmpty
                    && attempt < REMOVE_DIR_ATTEMPTS =>
            {
                trace!(dir = %dir.display(), attempt, "session directory refilled, retrying");
                attempt += 1;
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(StorageError::io(format!("remove {}", dir.display()), e)),
        }
    }
}
