use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use uuid::Uuid;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/matches/{id}/events",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Snapshot followed by match changes", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown match"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Stream a match snapshot followed by every change to it.
pub async fn match_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, AppError> {
    Ok(sse_service::match_stream(&state, id).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/matches/{id}/events", get(match_events))
}
