//! Multipart assembly.
//!
//! Completion runs in three phases:
//!
//! 1. The part list is validated and sorted without touching disk.
//! 2. Under the per-session lock, the `_assembling` marker is written and the
//!    parts are streamed in ascending order into `.fsblob-assembling-<token>`
//!    next to the final path, each one verified against the identity the
//!    caller claimed for it.
//! 3. The temp file is renamed over the final path, a completion receipt is
//!    recorded, and the session directory is reclaimed.
//!
//! Any failure in phase 2 removes the temp file and leaves the session intact,
//! so the caller can retry the completion or abort.

use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, trace, warn};

use crate::checksums::{compute_multipart_etag, etags_match, normalize_etag, quote_etag};
use crate::error::{StorageError, StorageResult};
use crate::ops::session::LiveSession;
use crate::paths::{hidden_sibling, validate_part_number, validate_token};
use crate::sink::{HashingWriter, remove_quietly};
use crate::storage::LocalFsStorage;
use crate::types::{CompletedPart, CompletionReceipt, ObjectInfo};
use crate::utils::modified_at;

impl LocalFsStorage {
    /// Assemble the parts of session `token` into object `name`.
    ///
    /// `parts` may be given in any order; the object is always the
    /// concatenation of the parts in ascending part number order. Completing
    /// the same session again with the same part list returns the same
    /// [`ObjectInfo`] without rewriting the object.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidArgument`] if `parts` is empty.
    /// - [`StorageError::InvalidPartNumber`] if a number is outside `1..=10000`.
    /// - [`StorageError::DuplicateParts`] if a number appears twice.
    /// - [`StorageError::PartGap`] if contiguous numbering is required and the
    ///   numbers do not run `1..=n`.
    /// - [`StorageError::InvalidSession`] if the session is unknown, was created
    ///   for another name, or was completed with a different part list.
    /// - [`StorageError::MissingPart`] if a listed part was never uploaded.
    /// - [`StorageError::PartMismatch`] if a stored part does not match its
    ///   claimed identity.
    /// - [`StorageError::Io`] for any filesystem failure.
    pub async fn complete_session(
        &self,
        name: &str,
        token: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<ObjectInfo> {
        let normalized = self.resolver().normalize(name)?;
        validate_token(token)?;
        let ordered = order_parts(parts, self.config().require_contiguous_parts)?;

        let lock = self.assembly_lock(token);
        let result = {
            let _guard = lock.lock().await;
            self.complete_locked(&normalized, token, &ordered).await
        };
        drop(lock);
        self.release_assembly_lock(token);
        result
    }

    async fn complete_locked(
        &self,
        name: &str,
        token: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<ObjectInfo> {
        let session = match self.load_session(token).await {
            Ok(session) => session,
            Err(StorageError::InvalidSession { .. }) => {
                return self.replay_completion(name, token, parts).await;
            }
            Err(e) => return Err(e),
        };
        if session.object_name != name {
            return Err(StorageError::invalid_session(
                token,
                format!(
                    "session was created for {:?}, not {name:?}",
                    session.object_name
                ),
            ));
        }

        let marker = self.resolver().assembling_marker_path(token)?;
        tokio::fs::write(&marker, b"")
            .await
            .map_err(|e| StorageError::io(format!("write {}", marker.display()), e))?;

        let path = self.resolver().object_path(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(format!("create {}", parent.display()), e))?;
        }

        let tmp = hidden_sibling(&path, &format!("assembling-{token}"));
        let size = match self.concatenate_parts(&session, parts, &tmp).await {
            Ok(size) => size,
            Err(e) => {
                remove_quietly(&tmp).await;
                debug!(token = %token, error = %e, "assembly failed, session kept for retry");
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            remove_quietly(&tmp).await;
            return Err(StorageError::io(format!("rename into {}", path.display()), e));
        }

        let last_modified = tokio::fs::metadata(&path)
            .await
            .map_or_else(|_| Utc::now(), |m| modified_at(&m));
        let receipt = CompletionReceipt {
            object_name: name.to_owned(),
            parts: parts.to_vec(),
            etag: compute_multipart_etag(&parts.iter().map(|p| &p.etag).collect::<Vec<_>>()),
            size,
            completed_at: last_modified,
        };
        let receipt_ttl = Duration::from_secs(self.config().receipt_ttl_secs);
        if let Err(e) = self.purge_stale_receipts(receipt_ttl).await {
            warn!(error = %e, "failed to prune completion receipts");
        }
        self.write_receipt(token, &receipt).await?;

        if let Err(e) = tokio::fs::remove_dir_all(&session.dir).await {
            warn!(dir = %session.dir.display(), error = %e, "failed to reclaim session directory");
        }

        info!(
            token = %token,
            name = %name,
            parts = parts.len(),
            size,
            etag = %receipt.etag,
            "completed multipart upload"
        );
        Ok(receipt.object_info())
    }

    /// Stream every part into `tmp`, verifying each against its claimed
    /// identity. Returns the total size written.
    async fn concatenate_parts(
        &self,
        session: &LiveSession,
        parts: &[CompletedPart],
        tmp: &Path,
    ) -> StorageResult<u64> {
        let mut out = tokio::fs::File::create(tmp)
            .await
            .map_err(|e| StorageError::io(format!("create {}", tmp.display()), e))?;

        let mut total = 0_u64;
        for part in parts {
            let part_path = self
                .resolver()
                .part_path(&session.token, part.part_number)?;
            let mut source = match tokio::fs::File::open(&part_path).await {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(StorageError::MissingPart {
                        part_number: part.part_number,
                    });
                }
                Err(e) => {
                    return Err(StorageError::io(format!("open {}", part_path.display()), e));
                }
            };

            let mut writer = HashingWriter::new(&mut out);
            tokio::io::copy(&mut source, &mut writer)
                .await
                .map_err(|e| StorageError::io(format!("append {}", part_path.display()), e))?;
            let (_, written) = writer.finish();

            if !etags_match(&written.etag, &part.etag) {
                return Err(StorageError::PartMismatch {
                    part_number: part.part_number,
                    expected: part.etag.clone(),
                    actual: written.etag,
                });
            }
            trace!(part_number = part.part_number, size = written.size, "appended part");
            total += written.size;
        }

        out.flush()
            .await
            .map_err(|e| StorageError::io(format!("flush {}", tmp.display()), e))?;
        if self.config().sync_writes {
            out.sync_all()
                .await
                .map_err(|e| StorageError::io(format!("sync {}", tmp.display()), e))?;
        }
        Ok(total)
    }

    async fn write_receipt(&self, token: &str, receipt: &CompletionReceipt) -> StorageResult<()> {
        let path = self.resolver().receipt_path(token)?;
        let tmp = hidden_sibling(&path, &format!("receipt-{token}"));
        let json = serde_json::to_vec(receipt)
            .map_err(|e| StorageError::io("encode completion receipt", io::Error::from(e)))?;

        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StorageError::io(format!("write {}", tmp.display()), e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            remove_quietly(&tmp).await;
            return Err(StorageError::io(format!("rename into {}", path.display()), e));
        }
        Ok(())
    }

    /// Answer a completion for a session that no longer exists from its
    /// receipt, if the request is identical to the one that completed it and
    /// the object it produced is still in place.
    async fn replay_completion(
        &self,
        name: &str,
        token: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<ObjectInfo> {
        let path = self.resolver().receipt_path(token)?;
        let json = match tokio::fs::read(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::invalid_session(
                    token,
                    "no such session, or it was aborted or expired",
                ));
            }
            Err(e) => return Err(StorageError::io(format!("read {}", path.display()), e)),
        };
        let receipt: CompletionReceipt = serde_json::from_slice(&json).map_err(|e| {
            StorageError::io(format!("decode {}", path.display()), io::Error::from(e))
        })?;

        if receipt.object_name != name {
            return Err(StorageError::invalid_session(
                token,
                format!("session completed {:?}, not {name:?}", receipt.object_name),
            ));
        }
        if receipt.parts != parts {
            return Err(StorageError::invalid_session(
                token,
                "session was already completed with a different part list",
            ));
        }

        let object_path = self.resolver().object_path(name);
        let current = match tokio::fs::metadata(&object_path).await {
            Ok(m) => Some(m).filter(std::fs::Metadata::is_file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(StorageError::io(
                    format!("stat {}", object_path.display()),
                    e,
                ));
            }
        };
        let unchanged = current
            .is_some_and(|m| m.len() == receipt.size && modified_at(&m) == receipt.completed_at);
        if !unchanged {
            return Err(StorageError::invalid_session(
                token,
                "the completed object has since been replaced or removed",
            ));
        }

        debug!(token = %token, name = %name, "replayed completed upload");
        Ok(receipt.object_info())
    }
}

/// Validate a completion list and return it sorted by part number with
/// identities in canonical quoted lowercase form.
fn order_parts(
    parts: &[CompletedPart],
    require_contiguous: bool,
) -> StorageResult<Vec<CompletedPart>> {
    if parts.is_empty() {
        return Err(StorageError::InvalidArgument {
            message: "the part list must not be empty".to_owned(),
        });
    }

    let mut ordered = Vec::with_capacity(parts.len());
    for part in parts {
        validate_part_number(part.part_number)?;
        ordered.push(CompletedPart::new(
            part.part_number,
            quote_etag(&normalize_etag(&part.etag)),
        ));
    }
    ordered.sort_by_key(|p| p.part_number);

    if let Some(pair) = ordered.windows(2).find(|w| w[0].part_number == w[1].part_number) {
        return Err(StorageError::DuplicateParts {
            part_number: pair[0].part_number,
        });
    }

    if require_contiguous {
        for (expected, part) in (1_u32..).zip(&ordered) {
            if part.part_number != expected {
                return Err(StorageError::PartGap {
                    expected,
                    found: part.part_number,
                });
            }
        }
    }

    Ok(ordered)
}
