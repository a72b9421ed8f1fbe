//! Response body types supporting buffered, streaming, and empty modes.
//!
//! - **Buffered**: JSON payloads and error bodies.
//! - **Streaming**: object content, read from disk chunk by chunk so that a
//!   download never holds the whole object in memory.
//! - **Empty**: 204 responses and HEAD responses.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use http_body_util::Full;
use tokio::io::{AsyncRead, ReadBuf};

/// Size of each chunk read from a streamed object.
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Response body used by [`BlobHttpService`](crate::service::BlobHttpService).
///
/// Implements [`http_body::Body`] so it can be used directly with hyper responses.
#[derive(Debug, Default)]
pub enum BlobBody {
    /// Buffered body for small responses.
    Buffered(Full<Bytes>),
    /// Object content streamed from a reader.
    Streaming(ReaderBody),
    /// Empty body.
    #[default]
    Empty,
}

impl BlobBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Stream `len` bytes from `reader`.
    #[must_use]
    pub fn from_reader(reader: Box<dyn AsyncRead + Send + Unpin>, len: u64) -> Self {
        Self::Streaming(ReaderBody::new(reader, len))
    }
}

/// A body that pulls fixed-size chunks from an [`AsyncRead`].
pub struct ReaderBody {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    buf: Vec<u8>,
    remaining: u64,
    done: bool,
}

impl ReaderBody {
    fn new(reader: Box<dyn AsyncRead + Send + Unpin>, len: u64) -> Self {
        Self {
            reader,
            buf: vec![0; STREAM_CHUNK_SIZE],
            remaining: len,
            done: len == 0,
        }
    }

    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        if self.done {
            return Poll::Ready(None);
        }

        let mut read_buf = ReadBuf::new(&mut self.buf);
        if let Err(e) = ready!(Pin::new(&mut self.reader).poll_read(cx, &mut read_buf)) {
            self.done = true;
            return Poll::Ready(Some(Err(e)));
        }

        let filled = read_buf.filled();
        if filled.is_empty() {
            self.done = true;
            if self.remaining > 0 {
                return Poll::Ready(Some(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("object ended {} bytes early", self.remaining),
                ))));
            }
            return Poll::Ready(None);
        }

        let chunk = Bytes::copy_from_slice(filled);
        self.remaining = self.remaining.saturating_sub(chunk.len() as u64);
        if self.remaining == 0 {
            self.done = true;
        }
        Poll::Ready(Some(Ok(chunk)))
    }
}

impl fmt::Debug for ReaderBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderBody")
            .field("remaining", &self.remaining)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl http_body::Body for BlobBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Streaming(reader) => reader
                .poll_chunk(cx)
                .map(|chunk| chunk.map(|r| r.map(http_body::Frame::data))),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Streaming(reader) => reader.done,
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Streaming(reader) => http_body::SizeHint::with_exact(reader.remaining),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}
