//! fsblob server - filesystem object storage over HTTP.
//!
//! Serves whole-object and multipart uploads from a local directory tree
//! through `fsblob-http`, and exposes a health endpoint for orchestration
//! systems.
//!
//! # Usage
//!
//! ```text
//! GATEWAY_LISTEN=0.0.0.0:4580 UPLOADS_DIR=/data/uploads fsblob-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:4580` | Bind address |
//! | `PUBLIC_BASE_URL` | `http://localhost:4580` | Base URL used in upload targets |
//! | `UPLOADS_DIR` | `uploads` | Final object root |
//! | `TEMP_UPLOADS_DIR` | `temp-uploads` | Multipart session root |
//! | `NAME_POLICY` | `reject` | `reject` or `rewrite` for `..` segments |
//! | `REQUIRE_CONTIGUOUS_PARTS` | `false` | Refuse completion lists with gaps |
//! | `SYNC_WRITES` | `true` | Fsync before rename |
//! | `SESSION_TTL_SECS` | `0` | Purge idle sessions older than this (`0` disables) |
//! | `RECEIPT_TTL_SECS` | `3600` | Purge completion receipts older than this |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fsblob_core::{LocalFsStorage, StorageConfig};
use fsblob_http::router::HEALTH_PATH;
use fsblob_http::service::{BlobHttpService, HttpConfig};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// How often the reaper sweeps for a given TTL.
fn reaper_interval(ttl: Duration) -> Duration {
    (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(300))
}

/// Spawn the background task that purges idle multipart sessions and
/// expired completion receipts.
///
/// Returns `None` when both `session_ttl_secs` and `receipt_ttl_secs` are
/// zero. A zero receipt TTL leaves receipt pruning to completions.
fn spawn_session_reaper(storage: Arc<LocalFsStorage>) -> Option<JoinHandle<()>> {
    let session_ttl = Some(Duration::from_secs(storage.config().session_ttl_secs))
        .filter(|ttl| !ttl.is_zero());
    let receipt_ttl = Some(Duration::from_secs(storage.config().receipt_ttl_secs))
        .filter(|ttl| !ttl.is_zero());
    let period = match (session_ttl, receipt_ttl) {
        (None, None) => return None,
        (Some(ttl), None) | (None, Some(ttl)) => reaper_interval(ttl),
        (Some(a), Some(b)) => reaper_interval(a.min(b)),
    };

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(ttl) = session_ttl {
                match storage.purge_stale_sessions(ttl).await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "purged stale multipart sessions"),
                    Err(e) => warn!(error = %e, "session purge failed"),
                }
            }
            if let Some(ttl) = receipt_ttl {
                match storage.purge_stale_receipts(ttl).await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "purged expired completion receipts"),
                    Err(e) => warn!(error = %e, "receipt purge failed"),
                }
            }
        }
    }))
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: BlobHttpService<LocalFsStorage>) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Perform a health check by connecting to the gateway and requesting the health endpoint.
///
/// Exits with code 0 if healthy, 1 otherwise.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request =
        format!("GET {HEALTH_PATH} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"status\":\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = StorageConfig::from_env();
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = StorageConfig::from_env();

    init_tracing(&config.log_level)?;

    info!(
        gateway_listen = %config.gateway_listen,
        uploads_dir = %config.uploads_dir.display(),
        temp_uploads_dir = %config.temp_uploads_dir.display(),
        name_policy = config.name_policy.as_str(),
        session_ttl_secs = config.session_ttl_secs,
        receipt_ttl_secs = config.receipt_ttl_secs,
        version = VERSION,
        "starting fsblob server",
    );

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let storage = LocalFsStorage::open(config)
        .await
        .context("failed to open storage directories")?;
    let storage = Arc::new(storage);

    let reaper = spawn_session_reaper(Arc::clone(&storage));
    let service = BlobHttpService::new(storage, HttpConfig::default());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    let result = serve(listener, service).await;
    if let Some(reaper) = reaper {
        reaper.abort();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_clamp_reaper_interval() {
        assert_eq!(reaper_interval(Duration::from_secs(2)), Duration::from_secs(1));
        assert_eq!(reaper_interval(Duration::from_secs(60)), Duration::from_secs(15));
        assert_eq!(
            reaper_interval(Duration::from_secs(86_400)),
            Duration::from_secs(300)
        );
    }

    #[tokio::test]
    async fn test_should_not_spawn_reaper_without_ttl() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let config = StorageConfig::builder()
            .uploads_dir(dir.path().join("uploads"))
            .temp_uploads_dir(dir.path().join("temp-uploads"))
            .receipt_ttl_secs(0)
            .build();
        let storage = LocalFsStorage::open(config)
            .await
            .unwrap_or_else(|e| panic!("open failed: {e}"));
        assert!(spawn_session_reaper(Arc::new(storage)).is_none());
    }

    #[tokio::test]
    async fn test_should_spawn_reaper_for_receipts_by_default() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let config = StorageConfig::builder()
            .uploads_dir(dir.path().join("uploads"))
            .temp_uploads_dir(dir.path().join("temp-uploads"))
            .build();
        let storage = LocalFsStorage::open(config)
            .await
            .unwrap_or_else(|e| panic!("open failed: {e}"));
        let handle = spawn_session_reaper(Arc::new(storage))
            .unwrap_or_else(|| panic!("reaper should be spawned"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_should_spawn_reaper_with_ttl() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let config = StorageConfig::builder()
            .uploads_dir(dir.path().join("uploads"))
            .temp_uploads_dir(dir.path().join("temp-uploads"))
            .session_ttl_secs(60)
            .build();
        let storage = LocalFsStorage::open(config)
            .await
            .unwrap_or_else(|e| panic!("open failed: {e}"));
        let handle = spawn_session_reaper(Arc::new(storage))
            .unwrap_or_else(|| panic!("reaper should be spawned"));
        handle.abort();
    }
}
