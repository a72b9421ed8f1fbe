//! Response construction: JSON payloads, object headers, and error bodies.

use chrono::{DateTime, Utc};
use fsblob_core::StorageError;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderValue, LAST_MODIFIED};
use http::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::body::BlobBody;
use crate::router::RouteError;

/// An error ready to be rendered as a JSON response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status.
    pub status: StatusCode,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human readable description.
    pub message: String,
}

impl ApiError {
    /// A request body that could not be read or parsed.
    #[must_use]
    pub fn malformed_body(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "MalformedBody",
            message: message.into(),
        }
    }
}

impl From<&StorageError> for ApiError {
    fn from(err: &StorageError) -> Self {
        let kind = err.kind();
        Self {
            status: StatusCode::from_u16(kind.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: kind.as_str(),
            message: err.to_string(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::from(&err)
    }
}

impl From<&RouteError> for ApiError {
    fn from(err: &RouteError) -> Self {
        let (status, code) = match err {
            RouteError::NotFound { .. } => (StatusCode::NOT_FOUND, "NoSuchResource"),
            RouteError::MethodNotAllowed { .. } => {
                (StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed")
            }
            RouteError::InvalidName { .. } => (StatusCode::BAD_REQUEST, "InvalidName"),
            RouteError::InvalidQuery { .. } => (StatusCode::BAD_REQUEST, "InvalidArgument"),
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    request_id: &'a str,
}

/// Render an error as `{code, message, requestId}`.
#[must_use]
pub fn error_to_response(err: &ApiError, request_id: &str) -> Response<BlobBody> {
    let body = ErrorBody {
        code: err.code,
        message: &err.message,
        request_id,
    };
    json_response(err.status, &body)
}

/// Serialize `value` as a JSON response.
#[must_use]
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<BlobBody> {
    match serde_json::to_vec(value) {
        Ok(json) => {
            let mut response = Response::new(BlobBody::from_bytes(json));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            let mut response = Response::new(BlobBody::from_bytes(
                r#"{"code":"InternalError","message":"failed to serialize response"}"#,
            ));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
    }
}

/// An empty response with `status`.
#[must_use]
pub fn empty_response(status: StatusCode) -> Response<BlobBody> {
    let mut response = Response::new(BlobBody::empty());
    *response.status_mut() = status;
    response
}

/// Set `ETag`, and optionally `Content-Length` and `Last-Modified`.
pub fn set_object_headers(
    response: &mut Response<BlobBody>,
    etag: Option<&str>,
    size: Option<u64>,
    last_modified: Option<DateTime<Utc>>,
) {
    let headers = response.headers_mut();
    if let Some(hv) = etag.and_then(|e| HeaderValue::from_str(e).ok()) {
        headers.insert(ETAG, hv);
    }
    if let Some(size) = size {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    }
    if let Some(hv) = last_modified.and_then(|t| HeaderValue::from_str(&http_date(t)).ok()) {
        headers.insert(LAST_MODIFIED, hv);
    }
}

/// Format a timestamp as an IMF-fixdate.
#[must_use]
pub fn http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
