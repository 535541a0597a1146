//! Intake for change notifications from the upstream data layer.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::{ArticleId, EventKind, ResourceChange};
use crate::error::RelayError;

/// Acknowledgement returned once a change is queued for fan-out.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventAccepted {
    /// Kind of the queued event.
    pub kind: EventKind,
    /// Identifier of the affected article.
    #[schema(value_type = String)]
    pub article_id: ArticleId,
}

/// `POST /events` — Queue an upstream change for broadcast.
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "Events",
    summary = "Publish a change",
    description = "Validates a `{kind, payload}` change and broadcasts it to every connected client.",
    request_body = ResourceChange,
    responses(
        (status = 202, description = "Change queued", body = EventAccepted),
        (status = 400, description = "Payload does not match its kind"),
    )
)]
pub async fn publish_event(
    State(state): State<AppState>,
    body: Result<Json<ResourceChange>, JsonRejection>,
) -> Result<impl IntoResponse, RelayError> {
    let Json(change) = body.map_err(|e| RelayError::InvalidRequest(e.body_text()))?;
    let event = state.change_feed.emit(change).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            kind: event.kind(),
            article_id: event.resource_id().clone(),
        }),
    ))
}

/// Event intake routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/events", post(publish_event))
}
