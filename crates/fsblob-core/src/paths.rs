//! Mapping of logical names and session tokens onto the filesystem.
//!
//! Every path this crate touches is produced here. Object names are split on
//! `/` and `\`, empty and `.` segments are collapsed, and `..` segments are
//! either rejected or dropped depending on the [`NamePolicy`]. The result is
//! always a descendant of the uploads root.
//!
//! Session tokens are restricted to `[A-Za-z0-9_-]` so a token can never name
//! anything outside the temp-uploads root.
//!
//! # Layout
//!
//! ```text
//! <uploads>/<normalized name>
//! <temp>/multipart-<token>/_objectName
//! <temp>/multipart-<token>/_assembling
//! <temp>/multipart-<token>/part-<n>
//! <temp>/multipart-<token>.complete
//! ```

use std::path::{Component, Path, PathBuf};

use crate::config::NamePolicy;
use crate::error::{StorageError, StorageResult};

/// Directory name prefix of a session directory.
pub const SESSION_DIR_PREFIX: &str = "multipart-";

/// File inside a session directory holding the target object name.
pub const SESSION_META_FILE: &str = "_objectName";

/// Marker file inside a session directory once assembly has started.
pub const ASSEMBLING_MARKER: &str = "_assembling";

/// File name prefix of a stored part.
pub const PART_FILE_PREFIX: &str = "part-";

/// Suffix of the completion receipt written next to a reclaimed session.
pub const RECEIPT_SUFFIX: &str = ".complete";

/// Name prefix of in-flight temp files renamed into place when done.
pub const TEMP_FILE_PREFIX: &str = ".fsblob-";

/// Largest accepted part number.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Longest accepted session token.
const MAX_TOKEN_LEN: usize = 128;

/// Resolves logical names and session tokens to absolute paths.
///
/// # Examples
///
/// ```
/// use fsblob_core::config::NamePolicy;
/// use fsblob_core::paths::PathResolver;
///
/// let resolver = PathResolver::new("/srv/uploads", "/srv/tmp", NamePolicy::Rewrite);
/// let path = resolver.resolve("/../../etc/passwd").unwrap();
/// assert_eq!(path, std::path::Path::new("/srv/uploads/etc/passwd"));
/// ```
#[derive(Debug, Clone)]
pub struct PathResolver {
    uploads_root: PathBuf,
    temp_root: PathBuf,
    policy: NamePolicy,
}

impl PathResolver {
    /// Create a resolver over the two storage roots.
    pub fn new(
        uploads_root: impl Into<PathBuf>,
        temp_root: impl Into<PathBuf>,
        policy: NamePolicy,
    ) -> Self {
        Self {
            uploads_root: uploads_root.into(),
            temp_root: temp_root.into(),
            policy,
        }
    }

    /// Root directory of final objects.
    #[must_use]
    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    /// Root directory of session storage.
    #[must_use]
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// The active name policy.
    #[must_use]
    pub fn policy(&self) -> NamePolicy {
        self.policy
    }

    /// Normalize a logical name into its canonical `a/b/c` form.
    ///
    /// # Errors
    ///
    /// Under [`NamePolicy::Reject`], returns [`StorageError::InvalidName`] for
    /// names with `..` segments, NUL bytes, platform-specific path prefixes, or
    /// nothing left after normalization. [`NamePolicy::Rewrite`] never fails.
    pub fn normalize(&self, name: &str) -> StorageResult<String> {
        let reject = |reason: &str| StorageError::InvalidName {
            name: name.to_owned(),
            reason: reason.to_owned(),
        };

        let mut segments: Vec<String> = Vec::new();
        for raw in name.split(['/', '\\']) {
            match raw {
                "" | "." => {}
                ".." => {
                    if self.policy == NamePolicy::Reject {
                        return Err(reject("parent directory references are not allowed"));
                    }
                }
                segment => {
                    let segment = if segment.contains('\0') {
                        if self.policy == NamePolicy::Reject {
                            return Err(reject("NUL bytes are not allowed"));
                        }
                        segment.replace('\0', "_")
                    } else {
                        segment.to_owned()
                    };

                    if is_plain_segment(&segment) {
                        segments.push(segment);
                    } else if self.policy == NamePolicy::Reject {
                        return Err(reject("path prefixes are not allowed"));
                    } else {
                        segments.push(segment.replace(':', "_"));
                    }
                }
            }
        }

        if segments.is_empty() {
            if self.policy == NamePolicy::Reject {
                return Err(reject("name is empty after normalization"));
            }
            segments.push("_".to_owned());
        }

        Ok(segments.join("/"))
    }

    /// Resolve a logical name to an absolute path under the uploads root.
    pub fn resolve(&self, name: &str) -> StorageResult<PathBuf> {
        let normalized = self.normalize(name)?;
        Ok(self.object_path(&normalized))
    }

    /// Path of an already normalized name.
    pub(crate) fn object_path(&self, normalized: &str) -> PathBuf {
        let mut path = self.uploads_root.clone();
        path.extend(normalized.split('/'));
        path
    }

    /// Directory owned by the session `token`.
    pub fn session_dir(&self, token: &str) -> StorageResult<PathBuf> {
        validate_token(token)?;
        Ok(self.temp_root.join(format!("{SESSION_DIR_PREFIX}{token}")))
    }

    /// File recording the session's target object name.
    pub fn session_meta_path(&self, token: &str) -> StorageResult<PathBuf> {
        Ok(self.session_dir(token)?.join(SESSION_META_FILE))
    }

    /// Marker file present while (or after) the session is being assembled.
    pub fn assembling_marker_path(&self, token: &str) -> StorageResult<PathBuf> {
        Ok(self.session_dir(token)?.join(ASSEMBLING_MARKER))
    }

    /// Final location of part `part_number` of the session.
    pub fn part_path(&self, token: &str, part_number: u32) -> StorageResult<PathBuf> {
        validate_part_number(part_number)?;
        Ok(self
            .session_dir(token)?
            .join(format!("{PART_FILE_PREFIX}{part_number}")))
    }

    /// Completion receipt kept after the session directory is reclaimed.
    pub fn receipt_path(&self, token: &str) -> StorageResult<PathBuf> {
        validate_token(token)?;
        Ok(self
            .temp_root
            .join(format!("{SESSION_DIR_PREFIX}{token}{RECEIPT_SUFFIX}")))
    }
}

/// Validate that `part_number` is within `1..=10000`.
pub fn validate_part_number(part_number: u32) -> StorageResult<()> {
    if (1..=MAX_PART_NUMBER).contains(&part_number) {
        Ok(())
    } else {
        Err(StorageError::InvalidPartNumber { part_number })
    }
}

/// Validate the shape of a session token.
pub fn validate_token(token: &str) -> StorageResult<()> {
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(StorageError::invalid_session(
            token,
            "token length is out of range",
        ));
    }
    if !token
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(StorageError::invalid_session(
            token,
            "token contains characters outside [A-Za-z0-9_-]",
        ));
    }
    Ok(())
}

/// Parse a part file name (`part-<n>`) into its number.
///
/// In-flight temp files such as `part-3.<id>.partial` are not parts.
#[must_use]
pub fn parse_part_file_name(file_name: &str) -> Option<u32> {
    let digits = file_name.strip_prefix(PART_FILE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits
        .parse::<u32>()
        .ok()
        .filter(|n| validate_part_number(*n).is_ok())
}

/// Parse a session directory name (`multipart-<token>`) into its token.
#[must_use]
pub fn parse_session_dir_name(dir_name: &str) -> Option<&str> {
    let token = dir_name.strip_prefix(SESSION_DIR_PREFIX)?;
    validate_token(token).ok().map(|()| token)
}

/// Hidden sibling of `path` in the same directory: `.fsblob-<tag>`.
///
/// The sibling name does not embed the file name, so it stays short even when
/// the final segment is close to the platform limit. `tag` must be unique
/// among concurrent writers into the same directory. Renaming a sibling over
/// `path` never crosses a filesystem boundary.
pub(crate) fn hidden_sibling(path: &Path, tag: &str) -> PathBuf {
    path.with_file_name(format!("{TEMP_FILE_PREFIX}{tag}"))
}

/// A segment is plain when the platform parses it as exactly one normal
/// component.
fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
