use axum::Json;
use common::prelude::build_info;
use common::version::BuildInfo;
use serde::Serialize;

const SERVICE_NAME: &str = "shardgate";

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub service: &'static str,
    #[serde(flatten)]
    pub build: BuildInfo,
}

#[tracing::instrument]
pub async fn handler() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: SERVICE_NAME,
        build: build_info(),
    })
}
