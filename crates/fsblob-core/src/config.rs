//! Storage configuration.
//!
//! Provides [`StorageConfig`] for configuring the filesystem provider and the
//! server that fronts it. Values are loaded from environment variables via
//! [`StorageConfig::from_env`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// How the path resolver treats names that would climb out of the uploads
/// root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamePolicy {
    /// Fail with `InvalidName`.
    #[default]
    Reject,
    /// Drop unsafe segments and keep going.
    Rewrite,
}

impl NamePolicy {
    /// Return the canonical lowercase name of the policy.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Rewrite => "rewrite",
        }
    }
}

impl fmt::Display for NamePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`NamePolicy`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown name policy: {0}")]
pub struct ParseNamePolicyError(String);

impl FromStr for NamePolicy {
    type Err = ParseNamePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" | "strict" => Ok(Self::Reject),
            "rewrite" | "lenient" => Ok(Self::Rewrite),
            _ => Err(ParseNamePolicyError(s.to_owned())),
        }
    }
}

/// Filesystem storage configuration.
///
/// # Examples
///
/// ```
/// use fsblob_core::config::{NamePolicy, StorageConfig};
///
/// let config = StorageConfig::default();
/// assert_eq!(config.gateway_listen, "0.0.0.0:4580");
/// assert_eq!(config.name_policy, NamePolicy::Reject);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Bind address for the HTTP gateway.
    #[builder(default = String::from("0.0.0.0:4580"))]
    pub gateway_listen: String,

    /// Externally reachable base URL used when building upload/download targets.
    #[builder(default = String::from("http://localhost:4580"))]
    pub public_base_url: String,

    /// Root directory for final objects.
    #[builder(default = PathBuf::from("uploads"))]
    pub uploads_dir: PathBuf,

    /// Root directory for multipart session storage.
    #[builder(default = PathBuf::from("temp-uploads"))]
    pub temp_uploads_dir: PathBuf,

    /// Treatment of names containing `..` segments.
    #[builder(default)]
    pub name_policy: NamePolicy,

    /// Reject completion lists whose part numbers are not `1..=n`.
    #[builder(default = false)]
    pub require_contiguous_parts: bool,

    /// Fsync files before they are renamed into place.
    #[builder(default = true)]
    pub sync_writes: bool,

    /// Age in seconds after which unfinished sessions are purged. `0` disables
    /// the reaper.
    #[builder(default = 0)]
    pub session_ttl_secs: u64,

    /// Age in seconds after which completion receipts are removed. Expired
    /// receipts are pruned whenever a session completes; `0` keeps a receipt
    /// only until the next completion.
    #[builder(default = 3600)]
    pub receipt_ttl_secs: u64,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            gateway_listen: String::from("0.0.0.0:4580"),
            public_base_url: String::from("http://localhost:4580"),
            uploads_dir: PathBuf::from("uploads"),
            temp_uploads_dir: PathBuf::from("temp-uploads"),
            name_policy: NamePolicy::Reject,
            require_contiguous_parts: false,
            sync_writes: true,
            session_ttl_secs: 0,
            receipt_ttl_secs: 3600,
            log_level: String::from("info"),
        }
    }
}

impl StorageConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:4580` |
    /// | `PUBLIC_BASE_URL` | `http://localhost:4580` |
    /// | `UPLOADS_DIR` | `uploads` |
    /// | `TEMP_UPLOADS_DIR` | `temp-uploads` |
    /// | `NAME_POLICY` | `reject` |
    /// | `REQUIRE_CONTIGUOUS_PARTS` | `false` |
    /// | `SYNC_WRITES` | `true` |
    /// | `SESSION_TTL_SECS` | `0` |
    /// | `RECEIPT_TTL_SECS` | `3600` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// Unparseable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Ok(v) = std::env::var("PUBLIC_BASE_URL") {
            config.public_base_url = v;
        }
        if let Ok(v) = std::env::var("UPLOADS_DIR") {
            config.uploads_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TEMP_UPLOADS_DIR") {
            config.temp_uploads_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("NAME_POLICY") {
            if let Ok(policy) = v.parse() {
                config.name_policy = policy;
            }
        }
        if let Ok(v) = std::env::var("REQUIRE_CONTIGUOUS_PARTS") {
            config.require_contiguous_parts = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("SYNC_WRITES") {
            config.sync_writes = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("SESSION_TTL_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                config.session_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("RECEIPT_TTL_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                config.receipt_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
