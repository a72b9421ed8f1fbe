//! Streaming write path shared by simple puts and part uploads.
//!
//! [`HashingWriter`] is a pass-through [`AsyncWrite`] that feeds every byte
//! accepted by the inner writer into an MD5 accumulator, so a body of any size
//! is digested while it is persisted, without buffering it in memory.
//!
//! [`persist_stream`] drains a [`ByteStream`] through a `HashingWriter` into a
//! fresh file and reports the identity of what landed on disk.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use digest::Digest;
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

use crate::checksums::quote_etag;
use crate::error::{StorageError, StorageResult};

/// A boxed stream of body chunks, the input type of every write operation.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Identity and size of a completed streaming write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedWrite {
    /// Quoted hex MD5 of the bytes written.
    pub etag: String,
    /// Number of bytes written.
    pub size: u64,
}

pin_project! {
    /// Pass-through writer computing MD5 over everything written.
    ///
    /// Only bytes the inner writer reports as accepted are hashed, so short
    /// writes never skew the digest.
    ///
    /// # Examples
    ///
    /// ```
    /// use fsblob_core::sink::HashingWriter;
    /// use tokio::io::AsyncWriteExt;
    ///
    /// # tokio_test::block_on(async {
    /// let mut writer = HashingWriter::new(Vec::new());
    /// writer.write_all(b"AAAA").await.unwrap();
    /// let (inner, written) = writer.finish();
    /// assert_eq!(inner, b"AAAA");
    /// assert_eq!(written.etag, "\"098890dde069e9abad63f19a0d9e1f32\"");
    /// # });
    /// ```
    #[derive(Debug)]
    pub struct HashingWriter<W> {
        #[pin]
        inner: W,
        hasher: md5::Md5,
        bytes_written: u64,
    }
}

impl<W> HashingWriter<W> {
    /// Wrap `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: md5::Md5::new(),
            bytes_written: 0,
        }
    }

    /// Bytes accepted so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Finalize the digest and hand back the inner writer.
    pub fn finish(self) -> (W, HashedWrite) {
        let etag = quote_etag(&hex::encode(self.hasher.finalize()));
        (
            self.inner,
            HashedWrite {
                etag,
                size: self.bytes_written,
            },
        )
    }
}

impl<W: AsyncWrite> AsyncWrite for HashingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let n = ready!(this.inner.poll_write(cx, buf))?;
        this.hasher.update(&buf[..n]);
        *this.bytes_written += n as u64;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

/// Drain `stream` into a new file at `path`, hashing as it goes.
///
/// The file is created (truncating anything already there), flushed, and
/// optionally fsynced. On failure the file is removed before the error is
/// returned; body read failures and disk failures are both reported as
/// [`StorageError::Io`] with distinct contexts.
pub async fn persist_stream<S>(
    stream: &mut S,
    path: &Path,
    sync: bool,
) -> StorageResult<HashedWrite>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin + ?Sized,
{
    let result = write_file(stream, path, sync).await;
    if result.is_err() {
        remove_quietly(path).await;
    }
    result
}

async fn write_file<S>(stream: &mut S, path: &Path, sync: bool) -> StorageResult<HashedWrite>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin + ?Sized,
{
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|e| StorageError::io(format!("create {}", path.display()), e))?;
    let mut writer = HashingWriter::new(file);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| StorageError::io("read request body", e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| StorageError::io(format!("write {}", path.display()), e))?;
    }

    writer
        .flush()
        .await
        .map_err(|e| StorageError::io(format!("flush {}", path.display()), e))?;
    let (file, written) = writer.finish();
    if sync {
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(format!("sync {}", path.display()), e))?;
    }

    trace!(path = %path.display(), size = written.size, "persisted stream");
    Ok(written)
}

/// Remove a file, ignoring "not found" and logging anything else.
pub(crate) async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove temp file");
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::checksums::compute_etag;

    fn chunked(data: &[u8], chunk_size: usize) -> impl Stream<Item = io::Result<Bytes>> + Unpin {
        let chunks: Vec<io::Result<Bytes>> = data
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(chunks)
    }

    #[tokio::test]
    async fn test_should_hash_everything_written() {
        let mut writer = HashingWriter::new(Vec::new());
        writer
            .write_all(b"hello ")
            .await
            .unwrap_or_else(|e| panic!("write failed: {e}"));
        writer
            .write_all(b"world")
            .await
            .unwrap_or_else(|e| panic!("write failed: {e}"));
        assert_eq!(writer.bytes_written(), 11);

        let (inner, written) = writer.finish();
        assert_eq!(inner, b"hello world");
        assert_eq!(written.etag, compute_etag(b"hello world"));
        assert_eq!(written.size, 11);
    }

    #[tokio::test]
    async fn test_should_persist_tiny_chunks() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let path = dir.path().join("out");
        let data: Vec<u8> = (0..10_000_u32).map(|i| (i % 251) as u8).collect();

        let mut body = chunked(&data, 3);
        let written = persist_stream(&mut body, &path, true)
            .await
            .unwrap_or_else(|e| panic!("persist failed: {e}"));

        assert_eq!(written.size, data.len() as u64);
        assert_eq!(written.etag, compute_etag(&data));
        let on_disk = tokio::fs::read(&path)
            .await
            .unwrap_or_else(|e| panic!("read failed: {e}"));
        assert_eq!(on_disk, data);
    }

    #[tokio::test]
    async fn test_should_remove_file_when_body_fails() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let path = dir.path().join("out");
        let mut body = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);

        let result = persist_stream(&mut body, &path, false).await;
        assert!(matches!(result, Err(StorageError::Io { .. })));
        assert!(!path.exists(), "partial file should be removed");
    }

    #[tokio::test]
    async fn test_should_fail_when_parent_is_missing() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let path = dir.path().join("missing").join("out");
        let mut body = chunked(b"data", 2);
        let result = persist_stream(&mut body, &path, false).await;
        assert!(matches!(result, Err(StorageError::Io { .. })));
    }
}
