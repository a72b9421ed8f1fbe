//! End-to-end tests for the fsblob server.
//!
//! Each test starts its own in-process server on an ephemeral port, backed by
//! a fresh temporary directory, and talks to it over real HTTP with `reqwest`.
//!
//! ```text
//! cargo test -p fsblob-integration
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use fsblob_core::{LocalFsStorage, StorageConfig};
use fsblob_http::service::{BlobHttpService, HttpConfig};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tracing::debug;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A running server and the directory it stores into.
#[derive(Debug)]
pub struct TestServer {
    /// Base URL, e.g. `http://127.0.0.1:40123`.
    pub base_url: String,
    /// Shared HTTP client.
    pub client: reqwest::Client,
    dir: TempDir,
}

impl TestServer {
    /// Start a server with default settings.
    pub async fn start() -> Self {
        Self::start_with(|config| config).await
    }

    /// Start a server whose configuration is tweaked by `configure`.
    ///
    /// Storage directories are always placed under a fresh temporary directory.
    pub async fn start_with(configure: impl FnOnce(StorageConfig) -> StorageConfig) -> Self {
        init_tracing();

        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let config = configure(StorageConfig::default());
        let config = StorageConfig {
            uploads_dir: dir.path().join("uploads"),
            temp_uploads_dir: dir.path().join("temp-uploads"),
            sync_writes: false,
            ..config
        };

        let storage = LocalFsStorage::open(config)
            .await
            .unwrap_or_else(|e| panic!("open storage failed: {e}"));
        let service = BlobHttpService::new(Arc::new(storage), HttpConfig::default());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("bind failed: {e}"));
        let addr: SocketAddr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("local_addr failed: {e}"));

        tokio::spawn(async move {
            let http = HttpConnBuilder::new(TokioExecutor::new());
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                let conn = http
                    .serve_connection(TokioIo::new(stream), service.clone())
                    .into_owned();
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(error = %e, "test connection closed with error");
                    }
                });
            }
        });

        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|e| panic!("client build failed: {e}"));

        Self {
            base_url: format!("http://{addr}"),
            client,
            dir,
        }
    }

    /// URL of an object. `name` is inserted as-is.
    #[must_use]
    pub fn object_url(&self, name: &str) -> String {
        format!("{}/objects/{name}", self.base_url)
    }

    /// Final object root on disk.
    #[must_use]
    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    /// Multipart session root on disk.
    #[must_use]
    pub fn temp_uploads_dir(&self) -> PathBuf {
        self.dir.path().join("temp-uploads")
    }

    /// Number of entries directly under the session root.
    #[must_use]
    pub fn session_entries(&self) -> usize {
        std::fs::read_dir(self.temp_uploads_dir())
            .map(Iterator::count)
            .unwrap_or(0)
    }
}

/// Start a session for `name` and return its upload id.
pub async fn create_session(server: &TestServer, name: &str) -> String {
    let resp = server
        .client
        .post(format!("{}?uploads", server.object_url(name)))
        .send()
        .await
        .unwrap_or_else(|e| panic!("create session failed: {e}"));
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp
        .json()
        .await
        .unwrap_or_else(|e| panic!("create session body: {e}"));
    body["uploadId"]
        .as_str()
        .unwrap_or_else(|| panic!("missing uploadId in {body}"))
        .to_owned()
}

/// Upload one part and return its quoted identity.
pub async fn upload_part(
    server: &TestServer,
    name: &str,
    upload_id: &str,
    part_number: u32,
    data: Vec<u8>,
) -> String {
    let resp = server
        .client
        .put(format!(
            "{}?uploadId={upload_id}&partNumber={part_number}",
            server.object_url(name)
        ))
        .body(data)
        .send()
        .await
        .unwrap_or_else(|e| panic!("upload part {part_number} failed: {e}"));
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp
        .json()
        .await
        .unwrap_or_else(|e| panic!("upload part body: {e}"));
    body["etag"]
        .as_str()
        .unwrap_or_else(|| panic!("missing etag in {body}"))
        .to_owned()
}

/// Send a completion request with `(part_number, etag)` pairs.
pub async fn complete_session(
    server: &TestServer,
    name: &str,
    upload_id: &str,
    parts: &[(u32, &str)],
) -> reqwest::Response {
    let parts: Vec<serde_json::Value> = parts
        .iter()
        .map(|(n, etag)| serde_json::json!({ "partNumber": n, "etag": etag }))
        .collect();
    server
        .client
        .post(format!("{}?uploadId={upload_id}", server.object_url(name)))
        .json(&serde_json::json!({ "parts": parts }))
        .send()
        .await
        .unwrap_or_else(|e| panic!("complete session failed: {e}"))
}

mod test_error;
mod test_multipart;
mod test_object;
