// Integration tests for `HttpTransport` using wiremock.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use bytes::Bytes;
use secrecy::SecretString;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use devlink_api::{BasicAuth, Error, HttpTransport, Transport};

// ── Helpers ─────────────────────────────────────────────────────────

fn transport_for(server: &MockServer) -> HttpTransport {
    let url = Url::parse(&format!("{}/api/v1/production", server.uri())).unwrap();
    HttpTransport::new(url).with_basic_auth(BasicAuth::new(
        "envoy",
        SecretString::from("123456".to_string()),
    ))
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_initial_body_is_first_frame() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/production"))
        .and(header("authorization", "Basic ZW52b3k6MTIzNDU2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"wattsNow":412}"#))
        .mount(&server)
        .await;

    let mut link = transport_for(&server).open().await.unwrap();
    let frame = link.recv().await.unwrap().unwrap();

    assert_eq!(frame, Bytes::from_static(br#"{"wattsNow":412}"#));
}

#[tokio::test]
async fn test_poll_interval_refetches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/production"))
        .respond_with(ResponseTemplate::new(200).set_body_string("tick"))
        .expect(2..)
        .mount(&server)
        .await;

    let mut link = transport_for(&server)
        .with_poll_interval(Duration::from_millis(20))
        .open()
        .await
        .unwrap();

    for _ in 0..2 {
        let frame = link.recv().await.unwrap().unwrap();
        assert_eq!(frame, Bytes::from_static(b"tick"));
    }
}

#[tokio::test]
async fn test_post_response_becomes_inbound_frame() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/production"))
        .respond_with(ResponseTemplate::new(200).set_body_string("initial"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/production"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ack"))
        .expect(1)
        .mount(&server)
        .await;

    let mut link = transport_for(&server).open().await.unwrap();
    assert_eq!(link.recv().await.unwrap().unwrap(), Bytes::from_static(b"initial"));

    link.send(Bytes::from_static(b"{\"cmd\":\"on\"}")).await.unwrap();
    assert_eq!(link.recv().await.unwrap().unwrap(), Bytes::from_static(b"ack"));
}

// ── Error paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_initial_get_is_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = transport_for(&server).open().await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "got {err:?}");
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn test_server_error_on_initial_get_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = transport_for(&server).open().await.unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 503, .. }), "got {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_failed_poll_ends_link_with_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut link = transport_for(&server)
        .with_poll_interval(Duration::from_millis(10))
        .open()
        .await
        .unwrap();

    assert!(link.recv().await.unwrap().is_ok());
    assert!(link.recv().await.unwrap().is_err());
}
