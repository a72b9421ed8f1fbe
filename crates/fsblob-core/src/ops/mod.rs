//! Operation implementations for [`LocalFsStorage`](crate::storage::LocalFsStorage).
//!
//! Each submodule contributes one `impl LocalFsStorage` block.

mod assemble;
mod object;
mod part;
mod session;

#[cfg(test)]
pub(crate) mod test_support {
    use std::io;

    use bytes::Bytes;
    use futures::{Stream, stream};
    use tokio::io::AsyncReadExt;

    use crate::config::StorageConfig;
    use crate::storage::LocalFsStorage;

    pub(crate) fn test_config(dir: &tempfile::TempDir) -> StorageConfig {
        StorageConfig::builder()
            .uploads_dir(dir.path().join("uploads"))
            .temp_uploads_dir(dir.path().join("temp-uploads"))
            .sync_writes(false)
            .build()
    }

    pub(crate) async fn open_storage(dir: &tempfile::TempDir) -> LocalFsStorage {
        open_with(test_config(dir)).await
    }

    pub(crate) async fn open_with(config: StorageConfig) -> LocalFsStorage {
        LocalFsStorage::open(config)
            .await
            .unwrap_or_else(|e| panic!("open failed: {e}"))
    }

    pub(crate) fn body(
        data: &[u8],
        chunk_size: usize,
    ) -> impl Stream<Item = io::Result<Bytes>> + Unpin + Send + 'static {
        let chunks: Vec<io::Result<Bytes>> = data
            .chunks(chunk_size.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(chunks)
    }

    pub(crate) async fn read_object(storage: &LocalFsStorage, name: &str) -> Vec<u8> {
        let mut object = storage
            .get_object(name)
            .await
            .unwrap_or_else(|e| panic!("get_object failed: {e}"));
        let mut buf = Vec::new();
        object
            .reader
            .read_to_end(&mut buf)
            .await
            .unwrap_or_else(|e| panic!("read failed: {e}"));
        buf
    }
}
