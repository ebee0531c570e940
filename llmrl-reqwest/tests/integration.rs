//! Integration test for [`ReqwestTransport`] against a real (mocked)
//! HTTP server, using `wiremock` for request/response fixtures.

use std::collections::HashMap;
use std::time::Duration;

use llmrl_core::transport::{Method, Transport, TransportError, TransportRequest};
use llmrl_reqwest::ReqwestTransport;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn forwards_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining-requests", "9999")
                .set_body_raw("{}", "application/json"),
        )
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new();
    let mut headers = HashMap::new();
    headers.insert("authorization".to_string(), "Bearer sk-test".to_string());

    let req = TransportRequest {
        method: Method::Get,
        url: format!("{}/v1/models", server.uri()),
        headers,
        body: vec![],
        timeout: Duration::from_secs(5),
    };

    let resp = transport.request(req).await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("x-ratelimit-remaining-requests"), Some("9999"));
    assert_eq!(resp.body, b"{}");
}

#[tokio::test]
async fn propagates_429_status_for_the_dialect_to_interpret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "2")
                .set_body_raw("{\"error\":\"rate limited\"}", "application/json"),
        )
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new();
    let req = TransportRequest {
        method: Method::Post,
        url: format!("{}/v1/chat/completions", server.uri()),
        headers: HashMap::new(),
        body: b"{}".to_vec(),
        timeout: Duration::from_secs(5),
    };

    let resp = transport.request(req).await.unwrap();
    assert_eq!(resp.status, 429);
    assert_eq!(resp.header("retry-after"), Some("2"));
}

#[tokio::test]
async fn non_timeout_network_error_is_other() {
    let transport = ReqwestTransport::new();
    let req = TransportRequest {
        method: Method::Get,
        url: "http://127.0.0.1:1".to_string(),
        headers: HashMap::new(),
        body: vec![],
        timeout: Duration::from_secs(1),
    };
    let err = transport.request(req).await.unwrap_err();
    assert!(matches!(err, TransportError::Other(_)));
}
