use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use common::router::RouteError;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use http::{HeaderMap, StatusCode};
use storage::NodeError;

use super::ObjectIdPath;
use crate::http::handlers::not_found_response;
use crate::ServiceState;

// Upstream headers worth passing on to the caller.
const RELAYED_HEADERS: [http::HeaderName; 4] = [CONTENT_TYPE, CONTENT_LENGTH, ETAG, LAST_MODIFIED];

/// Find the node holding the id and relay the object from a presigned URL.
pub async fn handler(
    State(state): State<ServiceState>,
    ObjectIdPath(id): ObjectIdPath,
    headers: HeaderMap,
) -> Result<Response, ReadError> {
    let Some(node) = state.router().lookup(&id).await? else {
        tracing::debug!(object = %id, "object not found on any node");
        return Ok(not_found_response(&headers));
    };

    let url = node
        .presigned_url(id.as_str())
        .await
        .map_err(ReadError::Presign)?;
    let upstream = state
        .http()
        .get(url)
        .send()
        .await
        .map_err(ReadError::Proxy)?;

    tracing::debug!(object = %id, node = %node.id(), status = %upstream.status(), "relaying object");
    relay(upstream)
}

/// Stream the upstream response back unchanged. The upstream connection is
/// held by the body stream and released when it ends or is dropped.
fn relay(upstream: reqwest::Response) -> Result<Response, ReadError> {
    let mut builder = Response::builder().status(upstream.status());
    for name in RELAYED_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            builder = builder.header(name, value.clone());
        }
    }
    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(ReadError::Response)
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("lookup failed: {0}")]
    Route(#[from] RouteError),
    #[error("failed to presign object url: {0}")]
    Presign(NodeError),
    #[error("failed to fetch presigned url: {0}")]
    Proxy(reqwest::Error),
    #[error("failed to build response: {0}")]
    Response(http::Error),
}

impl IntoResponse for ReadError {
    fn into_response(self) -> Response {
        match self {
            ReadError::Proxy(e) => {
                tracing::error!("error when proxying object: {}", e);
                (StatusCode::BAD_GATEWAY, "Bad gateway").into_response()
            }
            e => {
                tracing::error!("problem accessing storage nodes: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response()
            }
        }
    }
}
