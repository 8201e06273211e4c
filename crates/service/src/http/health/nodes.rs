use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use crate::ServiceState;

#[derive(Serialize)]
pub struct NodesResponse {
    /// bucket every node stores objects in
    pub bucket: String,
    /// node ids in routing order
    pub nodes: Vec<String>,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> Response {
    let membership = state.pool().snapshot();
    let nodes = membership
        .ids()
        .iter()
        .map(|id| id.to_string())
        .collect();
    let body = NodesResponse {
        bucket: state.pool().bucket().to_string(),
        nodes,
    };
    (StatusCode::OK, Json(body)).into_response()
}
