use axum::routing::get;
use axum::Router;

use crate::ServiceState;

mod data_source;
mod liveness;
mod nodes;
mod readiness;
mod version;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/livez", get(liveness::handler))
        .route("/readyz", get(readiness::handler))
        .route("/version", get(version::handler))
        .route("/nodes", get(nodes::handler))
        .with_state(state)
}
