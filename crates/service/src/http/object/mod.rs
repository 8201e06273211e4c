//! `GET` and `PUT /object/:id`.

use axum::async_trait;
use axum::extract::{FromRequestParts, Path};
use axum::middleware;
use axum::response::Response;
use axum::routing::put;
use axum::Router;
use common::object_id::ObjectId;
use http::request::Parts;

use crate::http::handlers::not_found_response;
use crate::ServiceState;

mod payload;
mod read;
mod write;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    // route_layer only wraps the methods registered before it, so the
    // declared length check guards PUT and not GET
    let object = put(write::handler)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            payload::enforce_declared_length,
        ))
        .get(read::handler);

    Router::new()
        .route("/object/:id", object)
        .with_state(state)
}

/// The `:id` path segment, validated. Anything that is not a valid object
/// id is answered like an unknown route.
#[derive(Debug)]
pub struct ObjectIdPath(pub ObjectId);

#[async_trait]
impl<S> FromRequestParts<S> for ObjectIdPath
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| not_found_response(&parts.headers))?;
        ObjectId::parse(&raw)
            .map(ObjectIdPath)
            .map_err(|e| {
                tracing::debug!(id = %raw, "rejecting object id: {}", e);
                not_found_response(&parts.headers)
            })
    }
}
