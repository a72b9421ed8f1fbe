//! Storage error types.
//!
//! Defines [`StorageError`], the domain error enum for every operation the
//! provider performs. Callers never see raw platform error codes: each variant
//! maps to a fieldless [`ErrorKind`] whose [`ErrorKind::http_status`] makes the
//! upstream HTTP translation a pure function.
//!
//! # Usage
//!
//! ```
//! use fsblob_core::error::{ErrorKind, StorageError};
//!
//! let err = StorageError::NotFound {
//!     name: "reports/q3.pdf".to_owned(),
//! };
//! assert_eq!(err.kind(), ErrorKind::NotFound);
//! assert_eq!(err.kind().http_status(), 404);
//! ```

use std::fmt;

/// Storage error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    // -----------------------------------------------------------------------
    // Object errors
    // -----------------------------------------------------------------------
    /// The requested object does not exist.
    #[error("The specified object does not exist: {name}")]
    NotFound {
        /// The logical object name.
        name: String,
    },

    /// The logical object name normalizes outside the uploads root or is
    /// otherwise unusable.
    #[error("Invalid object name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name as supplied by the caller.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },

    // -----------------------------------------------------------------------
    // Multipart errors
    // -----------------------------------------------------------------------
    /// The session token is unknown, malformed, already terminated, or no
    /// longer accepting parts.
    #[error("Invalid upload session {token}: {reason}")]
    InvalidSession {
        /// The session token supplied by the caller.
        token: String,
        /// Why the session was rejected.
        reason: String,
    },

    /// A part number is outside `1..=10000`.
    #[error("Part number must be between 1 and 10000, got {part_number}")]
    InvalidPartNumber {
        /// The offending part number.
        part_number: u32,
    },

    /// The completion list names the same part number more than once.
    #[error("Part number {part_number} appears more than once in the part list")]
    DuplicateParts {
        /// The duplicated part number.
        part_number: u32,
    },

    /// A part's stored digest does not match the identity the caller claimed.
    #[error("Part {part_number} does not match its identity: expected {expected}, stored {actual}")]
    PartMismatch {
        /// The part number.
        part_number: u32,
        /// The identity supplied by the caller.
        expected: String,
        /// The identity of the bytes currently stored.
        actual: String,
    },

    /// The completion list names a part that was never uploaded.
    #[error("Part {part_number} was never uploaded to this session")]
    MissingPart {
        /// The missing part number.
        part_number: u32,
    },

    /// Part numbers do not form a contiguous range starting at 1.
    #[error("Part numbers must be contiguous: expected {expected}, found {found}")]
    PartGap {
        /// The part number that should have come next.
        expected: u32,
        /// The part number that was found instead.
        found: u32,
    },

    // -----------------------------------------------------------------------
    // Caller / internal errors
    // -----------------------------------------------------------------------
    /// The request was malformed in a way no other variant describes.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Human readable description.
        message: String,
    },

    /// An underlying filesystem operation failed.
    #[error("I/O error while trying to {context}: {source}")]
    Io {
        /// What the provider was doing when the failure happened.
        context: String,
        /// The platform error.
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing object.
    NotFound,
    /// Unusable object name.
    InvalidName,
    /// Unknown or terminated session.
    InvalidSession,
    /// Part number out of range.
    InvalidPartNumber,
    /// Duplicate part numbers at completion.
    DuplicateParts,
    /// Claimed part identity does not match the stored bytes.
    PartMismatch,
    /// Part never uploaded.
    MissingPart,
    /// Non-contiguous part numbers.
    PartGap,
    /// Malformed request.
    InvalidArgument,
    /// Filesystem failure.
    IoError,
}

impl ErrorKind {
    /// Stable string code used in wire error bodies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::InvalidName => "InvalidName",
            Self::InvalidSession => "InvalidSession",
            Self::InvalidPartNumber => "InvalidPartNumber",
            Self::DuplicateParts => "DuplicateParts",
            Self::PartMismatch => "PartMismatch",
            Self::MissingPart => "MissingPart",
            Self::PartGap => "PartGap",
            Self::InvalidArgument => "InvalidArgument",
            Self::IoError => "IoError",
        }
    }

    /// HTTP status code an upstream layer should answer with.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::NotFound | Self::InvalidSession => 404,
            Self::DuplicateParts | Self::PartMismatch | Self::MissingPart | Self::PartGap => 409,
            Self::InvalidName | Self::InvalidPartNumber | Self::InvalidArgument => 400,
            Self::IoError => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StorageError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::InvalidSession { .. } => ErrorKind::InvalidSession,
            Self::InvalidPartNumber { .. } => ErrorKind::InvalidPartNumber,
            Self::DuplicateParts { .. } => ErrorKind::DuplicateParts,
            Self::PartMismatch { .. } => ErrorKind::PartMismatch,
            Self::MissingPart { .. } => ErrorKind::MissingPart,
            Self::PartGap { .. } => ErrorKind::PartGap,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Io { .. } => ErrorKind::IoError,
        }
    }

    /// Build an [`StorageError::Io`] from a platform error and a short
    /// description of the step that failed.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn invalid_session(token: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSession {
            token: token.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
