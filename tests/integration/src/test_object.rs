//! Whole-object integration tests.

#[cfg(test)]
mod tests {
    use fsblob_core::checksums::compute_etag;
    use reqwest::StatusCode;

    use crate::TestServer;

    #[tokio::test]
    async fn test_should_put_get_head_delete_object() {
        let server = TestServer::start().await;
        let url = server.object_url("docs/report.txt");

        let put = server
            .client
            .put(&url)
            .body("hello fsblob")
            .send()
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));
        assert_eq!(put.status(), StatusCode::OK);
        let info: serde_json::Value = put
            .json()
            .await
            .unwrap_or_else(|e| panic!("put body: {e}"));
        assert_eq!(info["name"], "docs/report.txt");
        assert_eq!(info["size"], 12);
        assert_eq!(info["etag"], compute_etag(b"hello fsblob"));
        assert!(server.uploads_dir().join("docs/report.txt").is_file());

        let get = server
            .client
            .get(&url)
            .send()
            .await
            .unwrap_or_else(|e| panic!("get failed: {e}"));
        assert_eq!(get.status(), StatusCode::OK);
        let bytes = get
            .bytes()
            .await
            .unwrap_or_else(|e| panic!("get body: {e}"));
        assert_eq!(&bytes[..], b"hello fsblob");

        let head = server
            .client
            .head(&url)
            .send()
            .await
            .unwrap_or_else(|e| panic!("head failed: {e}"));
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(
            head.headers()
                .get("etag")
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned),
            Some(compute_etag(b"hello fsblob"))
        );
        assert_eq!(
            head.headers()
                .get("content-length")
                .and_then(|v| v.to_str().ok()),
            Some("12")
        );

        let delete = server
            .client
            .delete(&url)
            .send()
            .await
            .unwrap_or_else(|e| panic!("delete failed: {e}"));
        assert_eq!(delete.status(), StatusCode::NO_CONTENT);
        assert!(!server.uploads_dir().join("docs/report.txt").exists());

        let gone = server
            .client
            .get(&url)
            .send()
            .await
            .unwrap_or_else(|e| panic!("get failed: {e}"));
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_should_stream_large_object_round_trip() {
        let server = TestServer::start().await;
        let url = server.object_url("big.bin");
        let data: Vec<u8> = (0..5 * 1024 * 1024_u32).map(|i| (i % 251) as u8).collect();

        let put = server
            .client
            .put(&url)
            .body(data.clone())
            .send()
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));
        assert_eq!(put.status(), StatusCode::OK);

        let bytes = server
            .client
            .get(&url)
            .send()
            .await
            .unwrap_or_else(|e| panic!("get failed: {e}"))
            .bytes()
            .await
            .unwrap_or_else(|e| panic!("get body: {e}"));
        assert_eq!(bytes.len(), data.len());
        assert!(bytes[..] == data[..]);
    }

    #[tokio::test]
    async fn test_should_overwrite_existing_object() {
        let server = TestServer::start().await;
        let url = server.object_url("note.txt");
        for body in ["first version", "second"] {
            let resp = server
                .client
                .put(&url)
                .body(body)
                .send()
                .await
                .unwrap_or_else(|e| panic!("put failed: {e}"));
            assert_eq!(resp.status(), StatusCode::OK);
        }
        let text = server
            .client
            .get(&url)
            .send()
            .await
            .unwrap_or_else(|e| panic!("get failed: {e}"))
            .text()
            .await
            .unwrap_or_else(|e| panic!("get body: {e}"));
        assert_eq!(text, "second");
    }

    #[tokio::test]
    async fn test_should_delete_missing_object_quietly() {
        let server = TestServer::start().await;
        let resp = server
            .client
            .delete(server.object_url("never-written"))
            .send()
            .await
            .unwrap_or_else(|e| panic!("delete failed: {e}"));
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_should_decode_percent_encoded_names() {
        let server = TestServer::start().await;
        let resp = server
            .client
            .put(server.object_url("my%20folder/file%20one.txt"))
            .body("x")
            .send()
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(server.uploads_dir().join("my folder/file one.txt").is_file());
    }
}
