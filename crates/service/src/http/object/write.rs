use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use common::router::RouteError;
use http::{HeaderMap, StatusCode};
use storage::ObjectBody;

use super::payload::{declared_length, limit_body, PayloadError};
use super::ObjectIdPath;
use crate::ServiceState;

/// Store the request body under the id on its primary node.
pub async fn handler(
    State(state): State<ServiceState>,
    ObjectIdPath(id): ObjectIdPath,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, WriteError> {
    let limit = state.max_payload_bytes();
    let size = declared_length(&headers)?;
    let (stream, tripwire) = limit_body(body, limit);

    match state.router().put(&id, ObjectBody::new(stream, size)).await {
        Ok(node) => {
            tracing::debug!(object = %id, node = %node, "stored object");
            Ok(StatusCode::OK)
        }
        Err(_) if tripwire.tripped() => {
            tracing::warn!(object = %id, limit, "payload exceeded limit mid-stream");
            Err(WriteError::Payload(PayloadError::TooLarge { limit }))
        }
        Err(e) => Err(WriteError::Route(e)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("write failed: {0}")]
    Route(#[from] RouteError),
}

impl IntoResponse for WriteError {
    fn into_response(self) -> Response {
        match self {
            WriteError::Payload(e) => e.into_response(),
            WriteError::Route(e) => {
                tracing::error!(node = %e.node(), "object write failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response()
            }
        }
    }
}
