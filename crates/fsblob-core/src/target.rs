//! Addressing targets handed to callers.
//!
//! A [`Target`] tells a client where to send bytes (or fetch them from). The
//! URLs are rooted at the configured public base URL and always use the
//! normalized object name, so two spellings of the same name produce the same
//! target.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Path prefix under which objects are served.
pub const OBJECTS_PATH_PREFIX: &str = "/objects";

/// Characters escaped in a name segment: everything except the unreserved
/// set `A-Z a-z 0-9 - _ . ~`.
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// HTTP method a client should use against a [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetMethod {
    /// Upload bytes.
    Put,
    /// Download bytes.
    Get,
}

impl TargetMethod {
    /// The method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Get => "GET",
        }
    }
}

impl fmt::Display for TargetMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A method plus an absolute URL.
///
/// # Examples
///
/// ```
/// use fsblob_core::target::{Target, TargetMethod};
///
/// let target = Target::part("http://localhost:4580/", "videos/a b.mp4", "abc123", 2);
/// assert_eq!(target.method, TargetMethod::Put);
/// assert_eq!(
///     target.url,
///     "http://localhost:4580/objects/videos/a%20b.mp4?uploadId=abc123&partNumber=2"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// HTTP method.
    pub method: TargetMethod,
    /// Absolute URL.
    pub url: String,
}

impl Target {
    /// Upload target for a whole object.
    #[must_use]
    pub fn put_object(base_url: &str, normalized_name: &str) -> Self {
        Self {
            method: TargetMethod::Put,
            url: object_url(base_url, normalized_name),
        }
    }

    /// Download target for a whole object.
    #[must_use]
    pub fn get_object(base_url: &str, normalized_name: &str) -> Self {
        Self {
            method: TargetMethod::Get,
            url: object_url(base_url, normalized_name),
        }
    }

    /// Upload target for one part of a session.
    #[must_use]
    pub fn part(base_url: &str, normalized_name: &str, token: &str, part_number: u32) -> Self {
        let url = format!(
            "{}?uploadId={}&partNumber={part_number}",
            object_url(base_url, normalized_name),
            utf8_percent_encode(token, SEGMENT_ENCODE_SET),
        );
        Self {
            method: TargetMethod::Put,
            url,
        }
    }
}

/// Encode a normalized name as a URL path, one segment at a time so that `/`
/// separators survive.
#[must_use]
pub fn encode_name_path(normalized_name: &str) -> String {
    normalized_name
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn object_url(base_url: &str, normalized_name: &str) -> String {
    format!(
        "{}{OBJECTS_PATH_PREFIX}/{}",
        base_url.trim_end_matches('/'),
        encode_name_path(normalized_name)
    )
}
