//! HTTP client behaviour against a mock upstream.

mod common;

use serde_json::json;
use std::time::Duration;
use vitalgate_sync::api::MEASUREMENTS_PATH;
use vitalgate_sync::{HttpSyncApi, SyncApi, SyncApiConfig, SyncError};
use wiremock::matchers::{bearer_token, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HttpSyncApi {
    HttpSyncApi::new(
        SyncApiConfig::new(server.uri())
            .api_key("test-key")
            .location_id("loc-7")
            .request_timeout(Duration::from_millis(500)),
    )
    .unwrap()
}

#[tokio::test]
async fn test_submit_sends_idempotency_key_and_reads_id() {
    let server = MockServer::start().await;
    let m = common::measurement(76.6);
    let id = m.id().to_string();

    Mock::given(method("POST"))
        .and(path(MEASUREMENTS_PATH))
        .and(bearer_token("test-key"))
        .and(header("X-Location-ID", "loc-7"))
        .and(header("Idempotency-Key", id.as_str()))
        .and(body_partial_json(json!({
            "measurement_uuid": id,
            "device_type": "tanita_csv",
            "customer_phone": "0965385123",
            "body_composition": {"weight_kg": 76.6},
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 981})))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = client(&server).submit(&m).await.unwrap();
    assert_eq!(receipt.remote_id, "981");
    assert!(!receipt.duplicate);
}

#[tokio::test]
async fn test_conflict_with_id_counts_as_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"id": "srv-12"})))
        .mount(&server)
        .await;

    let receipt = client(&server)
        .submit(&common::measurement(70.0))
        .await
        .unwrap();
    assert_eq!(receipt.remote_id, "srv-12");
    assert!(receipt.duplicate);
}

#[tokio::test]
async fn test_conflict_without_id_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
        .mount(&server)
        .await;

    let err = client(&server)
        .submit(&common::measurement(70.0))
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.status(), Some(409));
}

#[tokio::test]
async fn test_status_classification_end_to_end() {
    for (status, retryable) in [(503, true), (429, true), (408, true), (422, false), (401, false)]
    {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("upstream says no"))
            .mount(&server)
            .await;

        let err = client(&server)
            .submit(&common::measurement(70.0))
            .await
            .unwrap_err();
        assert_eq!(err.is_retryable(), retryable, "status {status}");
        assert_eq!(err.status(), Some(status));
    }
}

#[tokio::test]
async fn test_success_without_id_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let err = client(&server)
        .submit(&common::measurement(70.0))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Permanent { status: Some(200), .. }));
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"id": "late"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .submit(&common::measurement(70.0))
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "{err}");
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let api = HttpSyncApi::new(SyncApiConfig::new(format!("http://127.0.0.1:{port}"))).unwrap();

    let err = api.submit(&common::measurement(70.0)).await.unwrap_err();
    assert!(err.is_retryable(), "{err}");
}
