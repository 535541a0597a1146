//! REST API layer: health, OpenAPI document, and the upstream event intake.
//!
//! The event intake is mounted under `/api/v1`.

pub mod handlers;

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    paths(handlers::system::health_handler, handlers::events::publish_event),
    components(schemas(
        handlers::system::HealthResponse,
        handlers::events::EventAccepted,
        crate::domain::EventKind,
        crate::domain::ResourceChange,
    )),
    tags((name = "System"), (name = "Events"))
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}
