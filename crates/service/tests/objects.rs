mod harness;

use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use futures::{stream, StreamExt};
use http::{Request, StatusCode};
use tower::ServiceExt;

use crate::harness::{Gateway, NODES};

#[tokio::test]
async fn put_then_get_returns_identical_bytes() {
    let gw = Gateway::start(&NODES).await;

    let (status, _) = gw.put("/object/abc123", "hello shards").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = gw.get("/object/abc123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from("hello shards"));

    let primary = gw.primary("abc123");
    let stored = gw.cluster.node(&primary).unwrap().object("objects", "abc123");
    assert_eq!(stored, Some(Bytes::from("hello shards")));
}

#[tokio::test]
async fn put_overwrites_existing_object() {
    let gw = Gateway::start(&NODES).await;

    gw.put("/object/abc123", "first").await;
    gw.put("/object/abc123", "second").await;

    let (_, body) = gw.get("/object/abc123").await;
    assert_eq!(body, Bytes::from("second"));
}

#[tokio::test]
async fn get_missing_object_is_not_found() {
    let gw = Gateway::start(&NODES).await;

    let (status, _) = gw.get("/object/nothinghere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_ids_are_not_found() {
    let gw = Gateway::start(&NODES).await;

    let too_long = format!("/object/{}", "a".repeat(33));
    for uri in ["/object/bad-id", "/object/a_b", too_long.as_str()] {
        let (status, _) = gw.get(uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "GET {}", uri);
        let (status, _) = gw.put(uri, "data").await;
        assert_eq!(status, StatusCode::NOT_FOUND, "PUT {}", uri);
    }
    assert_eq!(gw.total_puts(), 0);
}

#[tokio::test]
async fn unknown_routes_fall_back_to_not_found() {
    let gw = Gateway::start(&NODES).await;

    let (status, body) = gw.get("/objects").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, Bytes::from("not found"));
}

#[tokio::test]
async fn existence_check_failure_is_server_error() {
    let gw = Gateway::start(&NODES).await;
    gw.put("/object/abc123", "hello").await;

    let primary = gw.primary("abc123");
    gw.cluster.node(&primary).unwrap().fail_stats(true);

    let (status, body) = gw.get("/object/abc123").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, Bytes::from("Server error"));
}

#[tokio::test]
async fn failure_during_fallback_scan_is_server_error() {
    let gw = Gateway::start(&NODES).await;

    let primary = gw.primary("missing");
    let other = NODES.iter().find(|n| **n != primary).unwrap();
    gw.cluster.node(other).unwrap().fail_stats(true);

    let (status, _) = gw.get("/object/missing").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn write_failure_is_server_error() {
    let gw = Gateway::start(&NODES).await;

    let primary = gw.primary("abc123");
    gw.cluster.node(&primary).unwrap().fail_puts(true);

    let (status, body) = gw.put("/object/abc123", "hello").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, Bytes::from("Server error"));
}

#[tokio::test]
async fn unreachable_presigned_url_is_bad_gateway() {
    let gw = Gateway::unserved(&NODES).await;
    gw.put("/object/abc123", "hello").await;

    let (status, _) = gw.get("/object/abc123").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn declared_oversized_payload_is_rejected_without_node_calls() {
    let gw = Gateway::with_limit(&NODES, 16).await;

    let (status, body) = gw.put("/object/abc123", vec![b'x'; 17]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, Bytes::from("File too large"));
    assert_eq!(gw.total_puts(), 0);
}

#[tokio::test]
async fn payload_at_limit_is_accepted() {
    let gw = Gateway::with_limit(&NODES, 16).await;

    let (status, _) = gw.put("/object/abc123", vec![b'x'; 16]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn undeclared_oversized_stream_is_rejected() {
    let gw = Gateway::with_limit(&NODES, 16).await;

    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from("0123456789")),
        Ok(Bytes::from("0123456789")),
    ];
    let request = Request::put("/object/abc123")
        .body(Body::from_stream(stream::iter(chunks)))
        .unwrap();

    let (status, _) = gw.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let primary = gw.primary("abc123");
    assert_eq!(gw.cluster.node(&primary).unwrap().object("objects", "abc123"), None);
}

#[tokio::test]
async fn unparseable_content_length_is_bad_request() {
    let gw = Gateway::start(&NODES).await;

    let request = Request::put("/object/abc123")
        .header(http::header::CONTENT_LENGTH, "lots")
        .body(Body::from("data"))
        .unwrap();
    let (status, _) = gw.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(gw.total_puts(), 0);
}

#[tokio::test]
async fn object_written_before_growth_is_still_readable() {
    let all = ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"];
    let gw = Gateway::start(&all).await;

    // start with three live nodes, then let the fourth join
    gw.discovery.set_nodes(&NODES);
    gw.state.pool().refresh().await.unwrap();

    let ids: Vec<String> = (0..40).map(|i| format!("obj{}", i)).collect();
    for id in &ids {
        let (status, _) = gw.put(&format!("/object/{}", id), id.clone()).await;
        assert_eq!(status, StatusCode::OK);
    }

    gw.discovery.set_nodes(&all);
    gw.state.pool().refresh().await.unwrap();
    assert_eq!(gw.state.pool().len(), 4);

    for id in &ids {
        let (status, body) = gw.get(&format!("/object/{}", id)).await;
        assert_eq!(status, StatusCode::OK, "object {}", id);
        assert_eq!(body, Bytes::from(id.clone()));
    }
}

#[tokio::test]
async fn objects_on_dropped_nodes_become_unreachable() {
    let gw = Gateway::start(&NODES).await;
    gw.put("/object/abc123", "hello").await;
    let primary = gw.primary("abc123");

    let remaining: Vec<&str> = NODES.iter().copied().filter(|n| *n != primary).collect();
    gw.discovery.set_nodes(&remaining);
    gw.state.pool().refresh().await.unwrap();

    let (status, _) = gw.get("/object/abc123").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dropping_response_mid_stream_releases_upstream_body() {
    let gw = Gateway::start(&NODES).await;
    gw.put("/object/abc123", vec![b'x'; 64 * 1024]).await;
    let node = gw.cluster.node(&gw.primary("abc123")).unwrap();
    node.throttle_downloads(1024, Duration::from_millis(10));

    let response = gw
        .app
        .clone()
        .oneshot(Request::get("/object/abc123").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(!first.is_empty());
    assert_eq!(node.downloads(), 1);
    assert_eq!(node.downloads_in_flight(), 1);

    drop(body);
    tokio::time::timeout(Duration::from_secs(5), async {
        while node.downloads_in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("upstream download still open after the client went away");
}

#[tokio::test]
async fn completed_read_closes_upstream_body() {
    let gw = Gateway::start(&NODES).await;
    gw.put("/object/abc123", "hello").await;
    let node = gw.cluster.node(&gw.primary("abc123")).unwrap();

    let (status, _) = gw.get("/object/abc123").await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::timeout(Duration::from_secs(5), async {
        while node.downloads_in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("upstream download still open after the read finished");
}

#[tokio::test]
async fn timed_out_lookup_cancels_the_node_call() {
    let gw = Gateway::with_timeout(&NODES, Duration::from_millis(100)).await;
    let node = gw.cluster.node(&gw.primary("abc123")).unwrap();
    node.stall_stats(true);

    let (status, _) = gw.get("/object/abc123").await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(node.stats(), 1);
    assert_eq!(node.stats_in_flight(), 0);
}
