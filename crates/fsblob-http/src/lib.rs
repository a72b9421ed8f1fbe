//! HTTP front end for fsblob: routing, JSON payloads, and a hyper service.
//!
//! - **Routing** ([`router`]): maps method, `/objects/<name>` path, and query
//!   sub-resources (`uploads`, `uploadId`, `partNumber`) onto a [`Route`].
//! - **Service** ([`service`]): [`BlobHttpService`] implements hyper's
//!   `Service` trait over any [`StorageProvider`](fsblob_core::StorageProvider).
//! - **Body** ([`body`]): [`BlobBody`] with buffered, streaming, and empty
//!   modes; object downloads stream from disk.
//! - **Responses** ([`response`]): JSON bodies and `{code, message}` errors
//!   whose status comes straight from the storage error kind.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> BlobHttpService (hyper Service)
//!     -> router::resolve (health / object / session sub-resource)
//!     -> StorageProvider (body streamed for uploads)
//!     -> Common response headers (x-request-id, Server)
//!   <- HTTP Response
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fsblob_core::{LocalFsStorage, StorageConfig};
//! use fsblob_http::service::{BlobHttpService, HttpConfig};
//!
//! # tokio_test::block_on(async {
//! let storage = LocalFsStorage::open(StorageConfig::default()).await.unwrap();
//! let service = BlobHttpService::new(Arc::new(storage), HttpConfig::default());
//! // Use `service` with a hyper server.
//! # let _ = service;
//! # });
//! ```

pub mod body;
pub mod response;
pub mod router;
pub mod service;
pub mod wire;

pub use body::BlobBody;
pub use router::{Route, RouteError};
pub use service::{BlobHttpService, HttpConfig};
