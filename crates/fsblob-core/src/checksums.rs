//! Content digests used as object and part identity tokens.
//!
//! Identities are hex-encoded MD5 digests wrapped in double quotes, the same
//! shape a remote object store returns as an `ETag`. Comparisons ignore the
//! quotes and hex case so callers may echo back either form.

use std::path::Path;

use digest::Digest;
use tokio::io::AsyncReadExt;

use crate::error::{StorageError, StorageResult};

/// Read buffer size used when hashing files.
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Compute the hex-encoded MD5 digest of `data`.
///
/// # Examples
///
/// ```
/// use fsblob_core::checksums::compute_md5;
///
/// assert_eq!(compute_md5(b"hello"), "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    hex::encode(md5::Md5::digest(data))
}

/// Compute the quoted hex MD5 of `data`.
///
/// # Examples
///
/// ```
/// use fsblob_core::checksums::compute_etag;
///
/// assert_eq!(compute_etag(b""), "\"d41d8cd98f00b204e9800998ecf8427e\"");
/// ```
#[must_use]
pub fn compute_etag(data: &[u8]) -> String {
    quote_etag(&compute_md5(data))
}

/// Wrap a bare hex digest in double quotes.
#[must_use]
pub fn quote_etag(md5_hex: &str) -> String {
    format!("\"{md5_hex}\"")
}

/// Strip surrounding quotes (and a weak `W/` prefix) and lowercase the digest.
///
/// # Examples
///
/// ```
/// use fsblob_core::checksums::normalize_etag;
///
/// assert_eq!(normalize_etag("\"ABC\""), "abc");
/// assert_eq!(normalize_etag("abc"), "abc");
/// ```
#[must_use]
pub fn normalize_etag(etag: &str) -> String {
    let trimmed = etag.trim();
    let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
    trimmed.trim_matches('"').to_ascii_lowercase()
}

/// Whether two identity tokens denote the same digest.
#[must_use]
pub fn etags_match(a: &str, b: &str) -> bool {
    normalize_etag(a) == normalize_etag(b)
}

/// Compute the composite identity of an assembled object.
///
/// The composite is the MD5 of the concatenated binary part digests,
/// formatted as `"<hex>-<part_count>"`. Entries may be quoted or bare.
///
/// # Examples
///
/// ```
/// use fsblob_core::checksums::compute_multipart_etag;
///
/// let etag = compute_multipart_etag(&["5d41402abc4b2a76b9719d911017c592"]);
/// assert!(etag.ends_with("-1\""));
/// ```
#[must_use]
pub fn compute_multipart_etag(part_etags: &[impl AsRef<str>]) -> String {
    let mut combined = Vec::with_capacity(part_etags.len() * 16);
    for etag in part_etags {
        if let Ok(bytes) = hex::decode(normalize_etag(etag.as_ref())) {
            combined.extend_from_slice(&bytes);
        }
    }
    let final_md5 = hex::encode(md5::Md5::digest(&combined));
    format!("\"{final_md5}-{}\"", part_etags.len())
}

/// Stream a file through MD5 and return its quoted identity.
///
/// Returns [`StorageError::Io`] if the file cannot be opened or read; callers
/// decide whether `NotFound` means something more specific.
pub async fn hash_file(path: &Path) -> StorageResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| StorageError::io(format!("open {}", path.display()), e))?;
    let mut hasher = md5::Md5::new();
    let mut buf = vec![0_u8; HASH_BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| StorageError::io(format!("read {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(quote_etag(&hex::encode(hasher.finalize())))
}
