//! Error response integration tests.

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::{TestServer, complete_session, create_session, upload_part};

    async fn error_code(resp: reqwest::Response) -> (StatusCode, String) {
        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .unwrap_or_else(|e| panic!("error body: {e}"));
        assert!(body["requestId"].is_string(), "missing requestId: {body}");
        let code = body["code"]
            .as_str()
            .unwrap_or_else(|| panic!("missing code: {body}"))
            .to_owned();
        (status, code)
    }

    #[tokio::test]
    async fn test_should_return_not_found_for_missing_object() {
        let server = TestServer::start().await;
        let resp = server
            .client
            .get(server.object_url("absent.txt"))
            .send()
            .await
            .unwrap_or_else(|e| panic!("get failed: {e}"));
        assert_eq!(
            error_code(resp).await,
            (StatusCode::NOT_FOUND, "NotFound".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_reject_traversal_names() {
        let server = TestServer::start().await;
        let resp = server
            .client
            .put(server.object_url("a%2F..%2F..%2Fescape.txt"))
            .body("x")
            .send()
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));
        assert_eq!(
            error_code(resp).await,
            (StatusCode::BAD_REQUEST, "InvalidName".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_reject_name_that_is_not_utf8() {
        let server = TestServer::start().await;
        let resp = server
            .client
            .put(server.object_url("bad%FFname.txt"))
            .body("x")
            .send()
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));
        assert_eq!(
            error_code(resp).await,
            (StatusCode::BAD_REQUEST, "InvalidName".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_reject_unknown_session() {
        let server = TestServer::start().await;
        let resp = server
            .client
            .put(format!(
                "{}?uploadId=doesnotexist&partNumber=1",
                server.object_url("x.bin")
            ))
            .body("x")
            .send()
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));
        assert_eq!(
            error_code(resp).await,
            (StatusCode::NOT_FOUND, "InvalidSession".to_owned())
        );
        assert_eq!(server.session_entries(), 0);
    }

    #[tokio::test]
    async fn test_should_reject_out_of_range_part_number() {
        let server = TestServer::start().await;
        let upload_id = create_session(&server, "x.bin").await;
        let resp = server
            .client
            .put(format!(
                "{}?uploadId={upload_id}&partNumber=10001",
                server.object_url("x.bin")
            ))
            .body("x")
            .send()
            .await
            .unwrap_or_else(|e| panic!("put failed: {e}"));
        assert_eq!(
            error_code(resp).await,
            (StatusCode::BAD_REQUEST, "InvalidPartNumber".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_report_part_mismatch_and_allow_retry() {
        let server = TestServer::start().await;
        let name = "mismatch.bin";
        let upload_id = create_session(&server, name).await;
        let etag = upload_part(&server, name, &upload_id, 1, b"AAAA".to_vec()).await;

        let wrong = "\"00000000000000000000000000000000\"";
        let resp = complete_session(&server, name, &upload_id, &[(1, wrong)]).await;
        assert_eq!(
            error_code(resp).await,
            (StatusCode::CONFLICT, "PartMismatch".to_owned())
        );
        assert!(!server.uploads_dir().join(name).exists());

        let retry = complete_session(&server, name, &upload_id, &[(1, etag.as_str())]).await;
        assert_eq!(retry.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_should_report_missing_part() {
        let server = TestServer::start().await;
        let name = "missing.bin";
        let upload_id = create_session(&server, name).await;
        let etag = upload_part(&server, name, &upload_id, 1, b"one".to_vec()).await;

        let resp = complete_session(
            &server,
            name,
            &upload_id,
            &[(1, etag.as_str()), (2, etag.as_str())],
        )
        .await;
        assert_eq!(
            error_code(resp).await,
            (StatusCode::CONFLICT, "MissingPart".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_parts() {
        let server = TestServer::start().await;
        let name = "dupes.bin";
        let upload_id = create_session(&server, name).await;
        let etag = upload_part(&server, name, &upload_id, 1, b"one".to_vec()).await;

        let resp = complete_session(
            &server,
            name,
            &upload_id,
            &[(1, etag.as_str()), (1, etag.as_str())],
        )
        .await;
        assert_eq!(
            error_code(resp).await,
            (StatusCode::CONFLICT, "DuplicateParts".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_reject_malformed_completion_body() {
        let server = TestServer::start().await;
        let upload_id = create_session(&server, "x.bin").await;
        let resp = server
            .client
            .post(format!(
                "{}?uploadId={upload_id}",
                server.object_url("x.bin")
            ))
            .body("{not json")
            .send()
            .await
            .unwrap_or_else(|e| panic!("post failed: {e}"));
        assert_eq!(
            error_code(resp).await,
            (StatusCode::BAD_REQUEST, "MalformedBody".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_reject_unknown_routes() {
        let server = TestServer::start().await;
        let resp = server
            .client
            .get(format!("{}/nowhere", server.base_url))
            .send()
            .await
            .unwrap_or_else(|e| panic!("get failed: {e}"));
        assert_eq!(
            error_code(resp).await,
            (StatusCode::NOT_FOUND, "NoSuchResource".to_owned())
        );

        let resp = server
            .client
            .patch(server.object_url("x"))
            .send()
            .await
            .unwrap_or_else(|e| panic!("patch failed: {e}"));
        assert_eq!(
            error_code(resp).await,
            (StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed".to_owned())
        );
    }
}
