mod support;

use blobreport_cloud::auth::StorageAuth;
use blobreport_cloud::blob_client::BlobServiceClient;
use blobreport_cloud::error::CloudError;
use blobreport_sas::SharedKey;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::{ACCOUNT_KEY, StaticCredential, delegation_key_xml, list_xml};
use wiremock::matchers::{
    body_string_contains, header, header_exists, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn shared_key_client(server: &MockServer) -> BlobServiceClient {
    let key = SharedKey::new("acct", ACCOUNT_KEY).unwrap();
    BlobServiceClient::new(reqwest::Client::new(), server.uri(), StorageAuth::SharedKey(key))
}

// ── Put Blob ──

#[tokio::test]
async fn upload_sends_block_blob_headers() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/reports/build-42/actual/login.png"))
        .and(header("x-ms-blob-type", "BlockBlob"))
        .and(header("x-ms-blob-content-type", "image/png"))
        .and(header("x-ms-version", "2022-11-02"))
        .and(header_exists("x-ms-date"))
        .and(header_exists("x-ms-client-request-id"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let container = shared_key_client(&server).container("reports");
    container
        .upload_block_blob("build-42/actual/login.png", vec![1, 2, 3], "image/png")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
    assert!(auth.starts_with("SharedKey acct:"), "{auth}");
    assert_eq!(requests[0].body, vec![1, 2, 3]);
}

#[tokio::test]
async fn upload_encodes_key_segments() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/reports/build%2042/a%23b.png"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let container = shared_key_client(&server).container("reports");
    container
        .upload_block_blob("build 42/a#b.png", vec![0], "image/png")
        .await
        .unwrap();
}

#[tokio::test]
async fn storage_failure_carries_error_code() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ms-error-code", "AuthenticationFailed")
                .set_body_string(
                    "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>AuthenticationFailed</Code>\
                     <Message>Server failed to authenticate the request.</Message></Error>",
                ),
        )
        .mount(&server)
        .await;

    let container = shared_key_client(&server).container("reports");
    match container.upload_block_blob("k/index.html", vec![1], "text/html").await {
        Err(CloudError::Storage { status, code, message }) => {
            assert_eq!(status, 403);
            assert_eq!(code, "AuthenticationFailed");
            assert_eq!(message, "Server failed to authenticate the request.");
        }
        other => panic!("expected storage error, got {other:?}"),
    }
}

// ── List Blobs ──

#[tokio::test]
async fn list_sends_prefix_and_marker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports"))
        .and(query_param("restype", "container"))
        .and(query_param("comp", "list"))
        .and(query_param("prefix", "build-41/actual/"))
        .and(query_param("maxresults", "1000"))
        .and(query_param("marker", "m1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(list_xml(
            &["build-41/actual/a.png", "build-41/actual/b.png"],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let container = shared_key_client(&server).container("reports");
    let page = container
        .list_blobs_page("build-41/actual/", Some("m1"))
        .await
        .unwrap();
    let names: Vec<&str> = page.blobs.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["build-41/actual/a.png", "build-41/actual/b.png"]);
    assert!(page.is_last_page());
}

// ── Get Blob ──

#[tokio::test]
async fn download_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports/build-41/actual/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9, 8, 7]))
        .mount(&server)
        .await;

    let container = shared_key_client(&server).container("reports");
    let data = container.download_blob("build-41/actual/a.png").await.unwrap();
    assert_eq!(data, vec![9, 8, 7]);
}

#[tokio::test]
async fn download_missing_blob_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).insert_header("x-ms-error-code", "BlobNotFound"))
        .mount(&server)
        .await;

    let container = shared_key_client(&server).container("reports");
    assert!(matches!(
        container.download_blob("nope.png").await,
        Err(CloudError::NotFound(key)) if key == "nope.png"
    ));
}

// ── User delegation key ──

#[tokio::test]
async fn delegation_key_exchange_uses_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(query_param("restype", "service"))
        .and(query_param("comp", "userdelegationkey"))
        .and(header("authorization", "Bearer bearer-token"))
        .and(body_string_contains("<Start>2025-06-02T10:00:00Z</Start>"))
        .and(body_string_contains("<Expiry>2025-06-03T10:00:00Z</Expiry>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(delegation_key_xml()))
        .expect(1)
        .mount(&server)
        .await;

    let credential = Arc::new(StaticCredential::default());
    let service = BlobServiceClient::new(
        reqwest::Client::new(),
        server.uri(),
        StorageAuth::Bearer(credential.clone()),
    );
    let start = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let expiry = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
    let key = service.get_user_delegation_key(start, expiry).await.unwrap();

    assert_eq!(key.signed_oid, "11111111-1111-1111-1111-111111111111");
    assert_eq!(key.value, "ZGVsZWdhdGlvbmtleQ==");
    assert_eq!(credential.calls(), 1);
}

#[tokio::test]
async fn delegation_key_rejection_is_delegation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).insert_header("x-ms-error-code", "AuthorizationPermissionMismatch"))
        .mount(&server)
        .await;

    let service = BlobServiceClient::new(
        reqwest::Client::new(),
        server.uri(),
        StorageAuth::Bearer(Arc::new(StaticCredential::default())),
    );
    let start = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let expiry = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
    match service.get_user_delegation_key(start, expiry).await {
        Err(CloudError::Delegation(msg)) => {
            assert!(msg.contains("AuthorizationPermissionMismatch"), "{msg}")
        }
        other => panic!("expected delegation error, got {other:?}"),
    }
}

#[tokio::test]
async fn delegation_key_needs_delegated_identity() {
    let server = MockServer::start().await;
    let start = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let expiry = Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap();
    let result = shared_key_client(&server)
        .get_user_delegation_key(start, expiry)
        .await;
    assert!(matches!(result, Err(CloudError::Delegation(_))));
}
