//! Filesystem-backed object storage with resumable multipart uploads.
//!
//! Objects are plain files under an uploads root, addressed by slash-delimited
//! logical names. Large objects can be uploaded in numbered parts through a
//! session; each part is digested while it streams to disk, and completion
//! verifies every part against the identity its uploader was given before
//! concatenating them atomically into place.
//!
//! # Architecture
//!
//! ```text
//! StorageProvider (async trait, names + tokens only)
//!        |
//!        v
//! LocalFsStorage (ops: object / part / session / assemble)
//!        |
//!        +--> PathResolver (names -> paths, never outside the roots)
//!        +--> HashingWriter (MD5 while writing)
//!        |
//!        v
//!   uploads/ and temp-uploads/ on disk
//! ```
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use fsblob_core::types::CompletedPart;
//! use fsblob_core::{LocalFsStorage, StorageConfig};
//! use futures::stream;
//!
//! # tokio_test::block_on(async {
//! let dir = tempfile::tempdir().unwrap();
//! let storage = LocalFsStorage::open(
//!     StorageConfig::builder()
//!         .uploads_dir(dir.path().join("uploads"))
//!         .temp_uploads_dir(dir.path().join("temp-uploads"))
//!         .build(),
//! )
//! .await
//! .unwrap();
//!
//! let token = storage.create_session("joined.txt").await.unwrap();
//! let mut p1 = stream::iter(vec![Ok(Bytes::from_static(b"AAAA"))]);
//! let mut p2 = stream::iter(vec![Ok(Bytes::from_static(b"BBBB"))]);
//! let id1 = storage.write_part(&token, 1, &mut p1).await.unwrap().etag;
//! let id2 = storage.write_part(&token, 2, &mut p2).await.unwrap().etag;
//!
//! let info = storage
//!     .complete_session(
//!         "joined.txt",
//!         &token,
//!         &[CompletedPart::new(1, id1), CompletedPart::new(2, id2)],
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(info.size, 8);
//! # });
//! ```

pub mod checksums;
pub mod config;
pub mod error;
mod ops;
pub mod paths;
pub mod provider;
pub mod sink;
pub mod storage;
pub mod target;
pub mod types;
pub mod utils;

pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use provider::StorageProvider;
pub use storage::LocalFsStorage;
