//! Multipart session integration tests.

#[cfg(test)]
mod tests {
    use fsblob_core::checksums::{compute_etag, compute_multipart_etag};
    use reqwest::StatusCode;

    use crate::{TestServer, complete_session, create_session, upload_part};

    #[tokio::test]
    async fn test_should_complete_multipart_upload() {
        let server = TestServer::start().await;
        let name = "videos/clip.mp4";
        let upload_id = create_session(&server, name).await;

        let part1 = vec![0xAA_u8; 64 * 1024];
        let part2 = vec![0xBB_u8; 1024];
        let etag1 = upload_part(&server, name, &upload_id, 1, part1.clone()).await;
        let etag2 = upload_part(&server, name, &upload_id, 2, part2.clone()).await;
        assert_eq!(etag1, compute_etag(&part1));
        assert_eq!(etag2, compute_etag(&part2));

        let resp = complete_session(
            &server,
            name,
            &upload_id,
            &[(2, etag2.as_str()), (1, etag1.as_str())],
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let info: serde_json::Value = resp
            .json()
            .await
            .unwrap_or_else(|e| panic!("complete body: {e}"));
        assert_eq!(info["name"], name);
        assert_eq!(info["size"], 64 * 1024 + 1024);
        assert_eq!(info["etag"], compute_multipart_etag(&[&etag1, &etag2]));

        let bytes = server
            .client
            .get(server.object_url(name))
            .send()
            .await
            .unwrap_or_else(|e| panic!("get failed: {e}"))
            .bytes()
            .await
            .unwrap_or_else(|e| panic!("get body: {e}"));
        let mut expected = part1;
        expected.extend_from_slice(&part2);
        assert!(bytes[..] == expected[..]);

        // Only the completion receipt stays behind, until it expires.
        assert_eq!(server.session_entries(), 1);
    }

    #[tokio::test]
    async fn test_should_replay_repeated_completion() {
        let server = TestServer::start().await;
        let name = "replay.bin";
        let upload_id = create_session(&server, name).await;
        let etag = upload_part(&server, name, &upload_id, 1, b"AAAA".to_vec()).await;

        let first = complete_session(&server, name, &upload_id, &[(1, etag.as_str())]).await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = complete_session(&server, name, &upload_id, &[(1, etag.as_str())]).await;
        assert_eq!(second.status(), StatusCode::OK);

        let a: serde_json::Value = first
            .json()
            .await
            .unwrap_or_else(|e| panic!("first body: {e}"));
        let b: serde_json::Value = second
            .json()
            .await
            .unwrap_or_else(|e| panic!("second body: {e}"));
        assert_eq!(a["etag"], b["etag"]);
        assert_eq!(a["size"], b["size"]);
    }

    #[tokio::test]
    async fn test_should_list_parts_in_order() {
        let server = TestServer::start().await;
        let name = "listing.bin";
        let upload_id = create_session(&server, name).await;
        upload_part(&server, name, &upload_id, 3, b"ccc".to_vec()).await;
        upload_part(&server, name, &upload_id, 1, b"a".to_vec()).await;

        let body: serde_json::Value = server
            .client
            .get(format!("{}?uploadId={upload_id}", server.object_url(name)))
            .send()
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"))
            .json()
            .await
            .unwrap_or_else(|e| panic!("list body: {e}"));
        assert_eq!(body["uploadId"], upload_id.as_str());
        let numbers: Vec<u64> = body["parts"]
            .as_array()
            .unwrap_or_else(|| panic!("parts not an array: {body}"))
            .iter()
            .filter_map(|p| p["partNumber"].as_u64())
            .collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_should_abort_session_and_remove_parts() {
        let server = TestServer::start().await;
        let name = "aborted.bin";
        let upload_id = create_session(&server, name).await;
        upload_part(&server, name, &upload_id, 1, b"data".to_vec()).await;
        assert_eq!(server.session_entries(), 1);

        let url = format!("{}?uploadId={upload_id}", server.object_url(name));
        for _ in 0..2 {
            let resp = server
                .client
                .delete(&url)
                .send()
                .await
                .unwrap_or_else(|e| panic!("abort failed: {e}"));
            assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        }
        assert_eq!(server.session_entries(), 0);
        assert!(!server.uploads_dir().join(name).exists());
    }

    #[tokio::test]
    async fn test_should_accept_sparse_parts_by_default() {
        let server = TestServer::start().await;
        let name = "sparse.bin";
        let upload_id = create_session(&server, name).await;
        let etag2 = upload_part(&server, name, &upload_id, 2, b"two".to_vec()).await;
        let etag5 = upload_part(&server, name, &upload_id, 5, b"five".to_vec()).await;

        let resp = complete_session(
            &server,
            name,
            &upload_id,
            &[(5, etag5.as_str()), (2, etag2.as_str())],
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let text = server
            .client
            .get(server.object_url(name))
            .send()
            .await
            .unwrap_or_else(|e| panic!("get failed: {e}"))
            .text()
            .await
            .unwrap_or_else(|e| panic!("get body: {e}"));
        assert_eq!(text, "twofive");
    }

    #[tokio::test]
    async fn test_should_reject_gaps_when_contiguity_required() {
        let server = TestServer::start_with(|config| fsblob_core::StorageConfig {
            require_contiguous_parts: true,
            ..config
        })
        .await;
        let name = "strict.bin";
        let upload_id = create_session(&server, name).await;
        let etag2 = upload_part(&server, name, &upload_id, 2, b"two".to_vec()).await;

        let resp = complete_session(&server, name, &upload_id, &[(2, etag2.as_str())]).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: serde_json::Value = resp
            .json()
            .await
            .unwrap_or_else(|e| panic!("error body: {e}"));
        assert_eq!(body["code"], "PartGap");
    }

    #[tokio::test]
    async fn test_should_reclaim_expired_completion_receipts() {
        let server = TestServer::start_with(|config| fsblob_core::StorageConfig {
            receipt_ttl_secs: 0,
            ..config
        })
        .await;

        for name in ["one.bin", "two.bin", "three.bin"] {
            let upload_id = create_session(&server, name).await;
            let etag = upload_part(&server, name, &upload_id, 1, name.as_bytes().to_vec()).await;
            let resp = complete_session(&server, name, &upload_id, &[(1, etag.as_str())]).await;
            assert_eq!(resp.status(), StatusCode::OK);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        // Each completion prunes the receipts that expired before it.
        assert_eq!(server.session_entries(), 1);
    }
}
