//! The HTTP service implementing hyper's `Service` trait.
//!
//! [`BlobHttpService`] ties together routing, provider dispatch, and response
//! formatting:
//!
//! 1. Request routing via [`router::resolve`]
//! 2. Health check answer (`GET /health`)
//! 3. Request bodies streamed straight into the provider for uploads, or
//!    collected (bounded) for JSON completion requests
//! 4. Operation dispatch to the [`StorageProvider`]
//! 5. Common response headers (`x-request-id`, `Server`)
//! 6. Error response formatting

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use fsblob_core::StorageProvider;
use fsblob_core::sink::ByteStream;
use fsblob_core::types::WriteOutcome;
use futures::TryStreamExt;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Limited};
use hyper::service::Service;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::body::BlobBody;
use crate::response::{
    ApiError, empty_response, error_to_response, json_response, set_object_headers,
};
use crate::router::{self, Route};
use crate::wire::{
    CompleteSessionRequest, CreateSessionResponse, ListPartsResponse, PartWrittenResponse,
};

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Configuration for the HTTP service.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Value of the `Server` response header.
    pub server_name: String,
    /// Largest accepted JSON request body.
    pub max_json_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            server_name: "fsblob".to_owned(),
            max_json_body_bytes: 1024 * 1024,
        }
    }
}

/// The HTTP service.
///
/// # Type Parameters
///
/// - `P`: the storage backend implementing [`StorageProvider`]; may be
///   `dyn StorageProvider`.
pub struct BlobHttpService<P: ?Sized> {
    provider: Arc<P>,
    config: Arc<HttpConfig>,
}

impl<P: ?Sized> std::fmt::Debug for BlobHttpService<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobHttpService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: StorageProvider + ?Sized> BlobHttpService<P> {
    /// Create a service over a shared provider.
    #[must_use]
    pub fn new(provider: Arc<P>, config: HttpConfig) -> Self {
        Self {
            provider,
            config: Arc::new(config),
        }
    }
}

impl<P: ?Sized> Clone for BlobHttpService<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            config: Arc::clone(&self.config),
        }
    }
}

impl<P, B> Service<Request<B>> for BlobHttpService<P>
where
    P: StorageProvider + ?Sized,
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    type Response = Response<BlobBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let provider = Arc::clone(&self.provider);
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let response = process_request(req, provider.as_ref(), &config, &request_id).await;
            Ok(add_common_headers(response, &request_id, &config.server_name))
        })
    }
}

async fn process_request<P, B>(
    req: Request<B>,
    provider: &P,
    config: &HttpConfig,
    request_id: &str,
) -> Response<BlobBody>
where
    P: StorageProvider + ?Sized,
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let method = req.method().clone();
    let uri = req.uri().clone();
    debug!(%method, %uri, request_id, "processing request");

    let route = match router::resolve(&req) {
        Ok(route) => route,
        Err(err) => {
            warn!(%method, %uri, error = %err, request_id, "failed to route request");
            return error_to_response(&ApiError::from(&err), request_id);
        }
    };

    info!(
        operation = route.operation(),
        name = ?route.name(),
        request_id,
        "routed request"
    );

    match dispatch(route, req.into_body(), provider, config).await {
        Ok(response) => response,
        Err(err) => {
            debug!(code = err.code, error = %err.message, request_id, "operation returned error");
            error_to_response(&err, request_id)
        }
    }
}

async fn dispatch<P, B>(
    route: Route,
    body: B,
    provider: &P,
    config: &HttpConfig,
) -> Result<Response<BlobBody>, ApiError>
where
    P: StorageProvider + ?Sized,
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match route {
        Route::Health => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "status": "running", "service": "fsblob" }),
        )),

        Route::Write {
            name,
            upload_id,
            part_number,
        } => {
            let outcome = provider
                .write_stream(
                    into_byte_stream(body),
                    &name,
                    upload_id.as_deref(),
                    part_number,
                )
                .await?;
            let mut response = match &outcome {
                WriteOutcome::Object(info) => json_response(StatusCode::OK, info),
                WriteOutcome::Part(part) => json_response(
                    StatusCode::OK,
                    &PartWrittenResponse {
                        part_number: part.part_number,
                        etag: part.etag.clone(),
                    },
                ),
            };
            set_object_headers(&mut response, Some(outcome.etag()), None, None);
            Ok(response)
        }

        Route::GetObject { name } => {
            let object = provider.read_object(&name).await?;
            let mut response = Response::new(BlobBody::from_reader(object.reader, object.size));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            set_object_headers(
                &mut response,
                None,
                Some(object.size),
                Some(object.last_modified),
            );
            Ok(response)
        }

        Route::HeadObject { name } => {
            let info = provider.head_object(&name).await?;
            let mut response = empty_response(StatusCode::OK);
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            set_object_headers(
                &mut response,
                Some(&info.etag),
                Some(info.size),
                Some(info.last_modified),
            );
            Ok(response)
        }

        Route::DeleteObject { name } => {
            provider.delete_object(&name).await?;
            Ok(empty_response(StatusCode::NO_CONTENT))
        }

        Route::CreateSession { name } => {
            let token = provider.create_session(&name).await?;
            let session = provider.session_info(&token).await?;
            Ok(json_response(
                StatusCode::OK,
                &CreateSessionResponse {
                    upload_id: token,
                    object_name: session.object_name,
                },
            ))
        }

        Route::CompleteSession { name, upload_id } => {
            let json = collect_limited(body, config.max_json_body_bytes).await?;
            let request: CompleteSessionRequest = serde_json::from_slice(&json)
                .map_err(|e| ApiError::malformed_body(format!("invalid completion request: {e}")))?;
            let info = provider
                .complete_session(&name, &upload_id, &request.parts)
                .await?;
            let mut response = json_response(StatusCode::OK, &info);
            set_object_headers(&mut response, Some(&info.etag), None, None);
            Ok(response)
        }

        Route::ListParts { name, upload_id } => {
            let parts = provider.list_parts(&name, &upload_id).await?;
            Ok(json_response(
                StatusCode::OK,
                &ListPartsResponse { upload_id, parts },
            ))
        }

        Route::AbortSession { name, upload_id } => {
            provider.abort_session(&name, &upload_id).await?;
            Ok(empty_response(StatusCode::NO_CONTENT))
        }
    }
}

/// Adapt a request body into the provider's byte stream without buffering.
fn into_byte_stream<B>(body: B) -> ByteStream
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    Box::pin(body.into_data_stream().map_err(io::Error::other))
}

/// Collect a small request body, refusing anything over `limit` bytes.
async fn collect_limited<B>(body: B, limit: usize) -> Result<Bytes, ApiError>
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    Limited::new(body, limit)
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(|e| ApiError::malformed_body(format!("failed to read request body: {e}")))
}

/// Add common response headers to every response.
fn add_common_headers(
    mut response: Response<BlobBody>,
    request_id: &str,
    server_name: &str,
) -> Response<BlobBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, hv);
    }
    if let Ok(hv) = HeaderValue::from_str(server_name) {
        headers.insert(http::header::SERVER, hv);
    }
    response
}
