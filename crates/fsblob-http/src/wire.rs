//! JSON request and response payloads.

use fsblob_core::types::{CompletedPart, PartInfo};
use serde::{Deserialize, Serialize};

/// Body of a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionRequest {
    /// Parts to assemble, in any order.
    pub parts: Vec<CompletedPart>,
}

/// Answer to a session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    /// Session token to quote in later requests.
    pub upload_id: String,
    /// Normalized name the session will produce.
    pub object_name: String,
}

/// Answer to a part upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartWrittenResponse {
    /// Part number.
    pub part_number: u32,
    /// Identity to quote at completion.
    pub etag: String,
}

/// Answer to a part listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPartsResponse {
    /// Session token.
    pub upload_id: String,
    /// Stored parts, ascending.
    pub parts: Vec<PartInfo>,
}
