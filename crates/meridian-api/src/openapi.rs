//! OpenAPI document generated from handler annotations

use axum::Json;
use utoipa::OpenApi;

use crate::error::ErrorBody;
use crate::handlers::health::{self, HealthResponse, LivenessResponse};

#[derive(OpenApi)]
#[openapi(
    info(title = "Meridian", description = "Meridian backend service"),
    paths(health::health_check, health::liveness),
    components(schemas(HealthResponse, LivenessResponse, ErrorBody)),
    tags((name = "health", description = "Liveness and readiness checks"))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
