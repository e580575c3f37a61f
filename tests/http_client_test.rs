//! HTTP adapter tests against a local mock service

use frost_verify::client::{HttpServiceClient, ServiceClient};
use frost_verify::config::VerifierConfig;
use frost_verify::error::{RequestError, TransportError};
use frost_verify::testing::{fast_config, health_json, signed_response, status_json};
use frost_verify::{RunOutcome, Verifier};
use mockito::Server;
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;

const TIMEOUT: Duration = Duration::from_secs(2);

fn config_for(server: &Server) -> VerifierConfig {
    VerifierConfig {
        base_url: server.url(),
        health_timeout_ms: 2_000,
        status_timeout_ms: 1_000,
        sign_timeout_ms: 5_000,
        ..fast_config()
    }
}

#[tokio::test]
async fn test_get_decodes_json_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/health")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(health_json().to_string())
        .create_async()
        .await;

    let client = HttpServiceClient::new(&server.url()).unwrap();
    let body = client.get("/health", TIMEOUT).await.unwrap();

    assert_eq!(body["service"], "frost-t-demo");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_post_sends_json_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/sign")
        .match_header("content-type", "application/json")
        .match_body(mockito::Matcher::Json(json!({
            "message": "hello",
            "signer_ids": [1, 2]
        })))
        .with_status(200)
        .with_body(signed_response().to_string())
        .create_async()
        .await;

    let client = HttpServiceClient::new(&server.url()).unwrap();
    let body = client
        .post("/sign", &json!({"message": "hello", "signer_ids": [1, 2]}), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(body["verified"], true);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_non_2xx_keeps_status_and_body() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/sign")
        .with_status(400)
        .with_body(r#"{"error":"not enough signers"}"#)
        .create_async()
        .await;

    let client = HttpServiceClient::new(&server.url()).unwrap();
    let err = client.post("/sign", &json!({}), TIMEOUT).await.unwrap_err();

    match err {
        RequestError::Service { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("not enough signers"));
        }
        other => panic!("expected a service error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_json_body_is_a_shape_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/status")
        .with_status(200)
        .with_body("<html>oops</html>")
        .create_async()
        .await;

    let client = HttpServiceClient::new(&server.url()).unwrap();
    let err = client.get("/status", TIMEOUT).await.unwrap_err();

    match err {
        RequestError::Shape { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected a shape error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    // Accept connections and never answer.
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let client = HttpServiceClient::new(&format!("http://{}", addr)).unwrap();
    let err = client
        .get("/health", Duration::from_millis(150))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err, RequestError::Transport(TransportError::Timeout));
}

#[tokio::test]
async fn test_full_run_against_mock_service() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(200)
        .with_body(health_json().to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/status")
        .with_status(200)
        .with_body(
            json!({
                "current_phase": "Complete",
                "progress": 1.0,
                "total_messages": 6,
                "total_bytes": 768,
                "total_retries": 2,
                "rssi": -82,
                "recent_events": [
                    {"type": "TransmitStart", "from": "Coordinator", "to": "Signer 2", "message_type": "Round1Commitment"},
                    {"TransmitComplete": {"total_time_ms": 1800, "retries": 2}}
                ],
                "by_type": {"Round1Commitment": 3, "Round2SignatureShare": 3}
            })
            .to_string(),
        )
        .expect_at_least(3)
        .create_async()
        .await;
    let sign = server
        .mock("POST", "/sign")
        .with_status(200)
        .with_body(signed_response().to_string())
        .expect(1)
        .create_async()
        .await;

    let config = config_for(&server);
    let client = HttpServiceClient::new(&config.base_url).unwrap();
    let outcome = Verifier::new(client, config).run().await;

    sign.assert_async().await;
    assert_eq!(outcome.exit_code(), 0);
    let summary = outcome.summary().unwrap();
    assert_eq!(summary.events.as_ref().unwrap().len(), 2);
    assert_eq!(summary.sign_monitor.max_retries(), Some(2));
}

#[tokio::test]
async fn test_failed_health_check_never_touches_status_or_sign() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;
    let status = server
        .mock("GET", "/status")
        .with_status(200)
        .with_body(status_json("Idle", 0.0, 0, 0, 0).to_string())
        .expect(0)
        .create_async()
        .await;
    let sign = server
        .mock("POST", "/sign")
        .with_status(200)
        .with_body(signed_response().to_string())
        .expect(0)
        .create_async()
        .await;

    let config = config_for(&server);
    let client = HttpServiceClient::new(&config.base_url).unwrap();
    let outcome = Verifier::new(client, config).run().await;

    assert!(matches!(
        outcome,
        RunOutcome::HealthFailed(RequestError::Service { status: 500, .. })
    ));
    assert_eq!(outcome.exit_code(), 1);
    status.assert_async().await;
    sign.assert_async().await;
}
