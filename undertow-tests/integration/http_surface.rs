//! HTTP routes driven through the router without a socket

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::Value;
use tower::ServiceExt;

use crate::common::{Harness, MOVIE_SIZE, SAMPLE_SRT, movie_bytes};

async fn send(harness: &Harness, request: Request<Body>) -> Response {
    harness.router().oneshot(request).await.unwrap()
}

async fn get(harness: &Harness, uri: &str) -> Response {
    send(harness, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn encoded(magnet: &str) -> String {
    urlencoding::encode(magnet).into_owned()
}

#[tokio::test]
async fn test_range_request_returns_partial_content() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let request = Request::get(format!("/stream?url={}&index=0", encoded(&magnet)))
        .header(header::RANGE, "bytes=100-199")
        .body(Body::empty())
        .unwrap();
    let response = send(&harness, request).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 100-199/1000");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");

    let body = body_bytes(response).await;
    assert_eq!(body.len(), 100);
    assert_eq!(body, movie_bytes()[100..200].to_vec());
}

#[tokio::test]
async fn test_full_request_returns_whole_file() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let response = get(&harness, &format!("/stream?url={}", encoded(&magnet))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(response.headers()["x-filename"], "Sintel.mp4");
    assert_eq!(response.headers()["x-filesize"], "1000");
    assert!(response.headers().get(header::CONTENT_RANGE).is_none());

    let body = body_bytes(response).await;
    assert_eq!(body.len(), MOVIE_SIZE);
}

#[tokio::test]
async fn test_unparsable_index_selects_largest_file() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let response = get(&harness, &format!("/stream?url={}&index=abc", encoded(&magnet))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-filename"], "Sintel.mp4");
}

#[tokio::test]
async fn test_range_past_end_is_not_satisfiable() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let request = Request::get(format!("/stream?url={}", encoded(&magnet)))
        .header(header::RANGE, "bytes=5000-")
        .body(Body::empty())
        .unwrap();
    let response = send(&harness, request).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
}

#[tokio::test]
async fn test_missing_url_is_bad_request() {
    let harness = Harness::new();

    for route in ["/files", "/metadata", "/stream", "/status", "/extract-subtitles"] {
        let response = get(&harness, route).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{route}");
    }

    let json = body_json(get(&harness, "/files").await).await;
    assert!(json["error"].as_str().unwrap().contains("url"));
}

#[tokio::test]
async fn test_files_and_metadata_views() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let listing = body_json(get(&harness, &format!("/files?url={}", encoded(&magnet))).await).await;
    let files = listing["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["path"], "Sintel/Sintel.mp4");
    assert_eq!(files[0]["size_human"], "1000 B");
    assert!(files[0].get("isSubtitle").is_none());
    assert_eq!(files[1]["isSubtitle"], true);
    assert_eq!(listing["infoHash"].as_str().unwrap().len(), 40);

    let summary =
        body_json(get(&harness, &format!("/metadata?url={}", encoded(&magnet))).await).await;
    assert_eq!(summary["name"], "Sintel");
    assert_eq!(summary["fileCount"], 2);
    assert_eq!(summary["totalSize"], (MOVIE_SIZE + SAMPLE_SRT.len()) as u64);
    assert!(summary.get("totalSize_human").is_some());
}

#[tokio::test]
async fn test_status_of_uncached_session_is_not_found() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let response = get(&harness, &format!("/status?url={}", encoded(&magnet))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    get(&harness, &format!("/files?url={}", encoded(&magnet))).await;
    let response = get(&harness, &format!("/status?url={}&index=0", encoded(&magnet))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let status = body_json(response).await;
    assert_eq!(status["name"], "Sintel");
    assert_eq!(status["streamingFileSize"], 1000);
    assert_eq!(status["percentageCompleted"], 100.0);
}

#[tokio::test]
async fn test_cors_and_referrer_policy_headers() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let request = Request::get(format!("/stream?url={}", encoded(&magnet)))
        .header(header::ORIGIN, "http://player.example.com")
        .body(Body::empty())
        .unwrap();
    let response = send(&harness, request).await;

    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://player.example.com"
    );
    let exposed = headers[header::ACCESS_CONTROL_EXPOSE_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(exposed.contains("x-filename"));
    assert!(exposed.contains("x-filesize"));
    assert!(exposed.contains("x-content-type"));
    assert_eq!(
        headers[header::REFERRER_POLICY],
        "strict-origin-when-cross-origin"
    );
}

#[tokio::test]
async fn test_subtitle_conversion_round_trip() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let response = get(
        &harness,
        &format!(
            "/download-subtitle?url={}&filePath={}",
            encoded(&magnet),
            encoded("Sintel/Sintel.srt")
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let vtt_key = body_json(response).await["vttKey"]
        .as_str()
        .unwrap()
        .to_string();

    let response = get(&harness, &format!("/stream-vtt?key={}", encoded(&vtt_key))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/vtt")
    );
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert_eq!(body, "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nHello\n\n");

    let response = get(&harness, &format!("/subtitles?file={}", encoded(&vtt_key))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_subtitle_lookups_reject_bad_input() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let response = get(&harness, "/stream-vtt?key=missing.vtt").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&harness, &format!("/subtitles?file={}", encoded("../secret.log"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(
        &harness,
        &format!(
            "/download-subtitle?url={}&filePath={}",
            encoded(&magnet),
            encoded("Sintel/missing.srt")
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(
        &harness,
        &format!("/extract-subtitles?url={}&index=two", encoded(&magnet)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
