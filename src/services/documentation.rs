use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the pool scoring backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::match_events,
        crate::routes::matches::get_match,
        crate::routes::matches::list_games,
        crate::routes::matches::get_queue,
        crate::routes::matches::score_game,
        crate::routes::matches::confirm_game,
        crate::routes::matches::deny_game,
        crate::routes::matches::request_vacate,
        crate::routes::matches::resolve_vacate,
        crate::routes::matches::submit_lineup,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::matches::ScoreGameRequest,
            crate::dto::matches::GameActionRequest,
            crate::dto::matches::ResolveVacateRequest,
            crate::dto::matches::LineupRequest,
            crate::dto::matches::GameRecordView,
            crate::dto::matches::MatchOverview,
            crate::dto::matches::ConfirmationQueueView,
            crate::dto::sse::MatchSnapshotEvent,
            crate::dto::sse::MatchChangedEvent,
            crate::dto::sse::LineupChangedEvent,
            crate::dto::sse::SystemStatus,
            crate::error::ErrorBody,
            crate::state::game_record::GameState,
            crate::state::game_record::Side,
            crate::state::queue::ConfirmationQueueItem,
            crate::state::projector::MatchProjection,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "matches", description = "Match reads and lineup hand-off"),
        (name = "games", description = "Per-game scoring and confirmation workflow"),
    )
)]
pub struct ApiDoc;
