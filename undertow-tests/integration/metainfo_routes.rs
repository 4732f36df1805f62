//! Converting `.torrent` files into magnet links over HTTP

use std::net::SocketAddr;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use sha1::{Digest, Sha1};
use tower::ServiceExt;
use undertow_core::{Descriptor, SessionKey};

use crate::common::Harness;

const SAMPLE_INFO: &str =
    "d6:lengthi1000e4:name10:Sintel.mp412:piece lengthi16384e6:pieces20:xxxxxxxxxxxxxxxxxxxxe";

fn sample_torrent() -> Vec<u8> {
    format!("d8:announce21:udp://tracker.test:804:info{SAMPLE_INFO}e").into_bytes()
}

fn expected_magnet() -> String {
    let key = SessionKey::from_bytes(&Sha1::digest(SAMPLE_INFO.as_bytes()));
    format!("magnet:?xt=urn:btih:{key}&dn=Sintel.mp4&tr=udp%3A%2F%2Ftracker.test%3A80")
}

async fn post(harness: &Harness, uri: &str, body: impl Into<Body>) -> Response {
    let request = Request::post(uri).body(body.into()).unwrap();
    harness.router().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serves the sample torrent at `/sample.torrent` on an ephemeral port.
async fn serve_sample_torrent() -> SocketAddr {
    let torrent = sample_torrent();
    let app = axum::Router::new().route(
        "/sample.torrent",
        axum::routing::get(move || {
            let torrent = torrent.clone();
            async move { torrent }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    address
}

#[tokio::test]
async fn test_uploaded_torrent_becomes_magnet_link() {
    let harness = Harness::new();

    let response = post(&harness, "/upload-torrent", sample_torrent()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json")
    );
    let json = body_json(response).await;
    assert_eq!(json["magnetLink"], expected_magnet());

    let descriptor = Descriptor::parse(json["magnetLink"].as_str().unwrap()).unwrap();
    assert_eq!(descriptor.display_name(), Some("Sintel.mp4"));
}

#[tokio::test]
async fn test_malformed_torrent_upload_is_bad_request() {
    let harness = Harness::new();

    let bodies: [&[u8]; 3] = [b"", b"not a torrent", b"d4:infod4:name1:xee"];
    for body in bodies {
        let response = post(&harness, "/upload-torrent", body.to_vec()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("torrent"));
    }
}

#[tokio::test]
async fn test_metainfo_routes_only_accept_post() {
    let harness = Harness::new();

    for uri in ["/upload-torrent", "/fetch-torrent-url"] {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let response = harness.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{uri}");
    }
}

#[tokio::test]
async fn test_torrent_fetched_by_url() {
    let harness = Harness::new();
    let address = serve_sample_torrent().await;

    let body = json!({ "url": format!("http://{address}/sample.torrent") }).to_string();
    let response = post(&harness, "/fetch-torrent-url", body).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["magnetLink"], expected_magnet());
}

#[tokio::test]
async fn test_upstream_status_is_propagated() {
    let harness = Harness::new();
    let address = serve_sample_torrent().await;

    let body = json!({ "url": format!("http://{address}/missing.torrent") }).to_string();
    let response = post(&harness, "/fetch-torrent-url", body).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_fetch_request_failures() {
    let harness = Harness::new();

    let response = post(&harness, "/fetch-torrent-url", "{\"link\": 3}").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let body = json!({ "url": format!("http://{closed}/sample.torrent") }).to_string();
    let response = post(&harness, "/fetch-torrent-url", body).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
