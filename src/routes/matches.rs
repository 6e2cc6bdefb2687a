use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::matches::{
        ConfirmationQueueView, GameActionRequest, GameRecordView, LineupRequest, MatchOverview,
        QueueQuery, ResolveVacateRequest, ScoreGameRequest,
    },
    error::{AppError, ErrorBody},
    services::{lineup_service, scoring_service},
    state::SharedState,
};

/// Match reads, game workflow writes and the lineup hand-off.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/games", get(list_games))
        .route("/matches/{id}/queue", get(get_queue))
        .route("/matches/{id}/games/{game_number}/score", post(score_game))
        .route("/matches/{id}/games/{game_number}/confirm", post(confirm_game))
        .route("/matches/{id}/games/{game_number}/deny", post(deny_game))
        .route("/matches/{id}/games/{game_number}/vacate", post(request_vacate))
        .route(
            "/matches/{id}/games/{game_number}/vacate/resolve",
            post(resolve_vacate),
        )
        .route("/matches/{id}/lineups/{team_id}", put(submit_lineup))
}

/// Match row with thresholds and the live projection.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match overview", body = MatchOverview),
        (status = 404, description = "Unknown match", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchOverview>, AppError> {
    Ok(Json(scoring_service::match_overview(&state, id).await?))
}

/// Every game record of the match, used by clients to reconcile.
#[utoipa::path(
    get,
    path = "/matches/{id}/games",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Game records", body = [GameRecordView]),
        (status = 404, description = "Unknown match", body = ErrorBody)
    )
)]
pub async fn list_games(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<GameRecordView>>, AppError> {
    Ok(Json(scoring_service::list_games(&state, id).await?))
}

/// Games awaiting the given side.
#[utoipa::path(
    get,
    path = "/matches/{id}/queue",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier"), QueueQuery),
    responses(
        (status = 200, description = "Confirmation queue", body = ConfirmationQueueView),
        (status = 404, description = "Unknown match", body = ErrorBody)
    )
)]
pub async fn get_queue(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<ConfirmationQueueView>, AppError> {
    Ok(Json(
        scoring_service::confirmation_queue(&state, id, query.side).await?,
    ))
}

/// Submit the result of an unscored game.
#[utoipa::path(
    post,
    path = "/matches/{id}/games/{game_number}/score",
    tag = "games",
    params(
        ("id" = Uuid, Path, description = "Match identifier"),
        ("game_number" = u8, Path, description = "Game number, starting at 1")
    ),
    request_body = ScoreGameRequest,
    responses(
        (status = 200, description = "Stored record", body = GameRecordView),
        (status = 400, description = "Invalid input or option combination", body = ErrorBody),
        (status = 403, description = "Member not allowed to act", body = ErrorBody),
        (status = 409, description = "Invalid transition or stale write", body = ErrorBody)
    )
)]
pub async fn score_game(
    State(state): State<SharedState>,
    Path((id, game_number)): Path<(Uuid, u8)>,
    Json(payload): Json<ScoreGameRequest>,
) -> Result<Json<GameRecordView>, AppError> {
    payload.validate()?;
    let record = scoring_service::score_game(&state, id, game_number, payload).await?;
    Ok(Json(GameRecordView::from(&record)))
}

/// Confirm the other side's submission.
#[utoipa::path(
    post,
    path = "/matches/{id}/games/{game_number}/confirm",
    tag = "games",
    params(
        ("id" = Uuid, Path, description = "Match identifier"),
        ("game_number" = u8, Path, description = "Game number, starting at 1")
    ),
    request_body = GameActionRequest,
    responses(
        (status = 200, description = "Stored record", body = GameRecordView),
        (status = 403, description = "Member not allowed to act", body = ErrorBody),
        (status = 409, description = "Invalid transition or stale write", body = ErrorBody)
    )
)]
pub async fn confirm_game(
    State(state): State<SharedState>,
    Path((id, game_number)): Path<(Uuid, u8)>,
    Json(payload): Json<GameActionRequest>,
) -> Result<Json<GameRecordView>, AppError> {
    payload.validate()?;
    let record = scoring_service::confirm_game(&state, id, game_number, payload).await?;
    Ok(Json(GameRecordView::from(&record)))
}

/// Reject the other side's submission.
#[utoipa::path(
    post,
    path = "/matches/{id}/games/{game_number}/deny",
    tag = "games",
    params(
        ("id" = Uuid, Path, description = "Match identifier"),
        ("game_number" = u8, Path, description = "Game number, starting at 1")
    ),
    request_body = GameActionRequest,
    responses(
        (status = 200, description = "Cleared record", body = GameRecordView),
        (status = 403, description = "Member not allowed to act", body = ErrorBody),
        (status = 409, description = "Invalid transition or stale write", body = ErrorBody)
    )
)]
pub async fn deny_game(
    State(state): State<SharedState>,
    Path((id, game_number)): Path<(Uuid, u8)>,
    Json(payload): Json<GameActionRequest>,
) -> Result<Json<GameRecordView>, AppError> {
    payload.validate()?;
    let record = scoring_service::deny_game(&state, id, game_number, payload).await?;
    Ok(Json(GameRecordView::from(&record)))
}

/// Ask to undo a confirmed game.
#[utoipa::path(
    post,
    path = "/matches/{id}/games/{game_number}/vacate",
    tag = "games",
    params(
        ("id" = Uuid, Path, description = "Match identifier"),
        ("game_number" = u8, Path, description = "Game number, starting at 1")
    ),
    request_body = GameActionRequest,
    responses(
        (status = 200, description = "Record awaiting the vacate answer", body = GameRecordView),
        (status = 403, description = "Member not allowed to act", body = ErrorBody),
        (status = 409, description = "Invalid transition or stale write", body = ErrorBody)
    )
)]
pub async fn request_vacate(
    State(state): State<SharedState>,
    Path((id, game_number)): Path<(Uuid, u8)>,
    Json(payload): Json<GameActionRequest>,
) -> Result<Json<GameRecordView>, AppError> {
    payload.validate()?;
    let record = scoring_service::request_vacate(&state, id, game_number, payload).await?;
    Ok(Json(GameRecordView::from(&record)))
}

/// Approve or deny the other side's vacate request.
#[utoipa::path(
    post,
    path = "/matches/{id}/games/{game_number}/vacate/resolve",
    tag = "games",
    params(
        ("id" = Uuid, Path, description = "Match identifier"),
        ("game_number" = u8, Path, description = "Game number, starting at 1")
    ),
    request_body = ResolveVacateRequest,
    responses(
        (status = 200, description = "Resolved record", body = GameRecordView),
        (status = 403, description = "Member not allowed to act", body = ErrorBody),
        (status = 409, description = "Invalid transition or stale write", body = ErrorBody)
    )
)]
pub async fn resolve_vacate(
    State(state): State<SharedState>,
    Path((id, game_number)): Path<(Uuid, u8)>,
    Json(payload): Json<ResolveVacateRequest>,
) -> Result<Json<GameRecordView>, AppError> {
    payload.validate()?;
    let record = scoring_service::resolve_vacate(&state, id, game_number, payload).await?;
    Ok(Json(GameRecordView::from(&record)))
}

/// Hand over (and optionally lock) a team's lineup.
#[utoipa::path(
    put,
    path = "/matches/{id}/lineups/{team_id}",
    tag = "matches",
    params(
        ("id" = Uuid, Path, description = "Match identifier"),
        ("team_id" = Uuid, Path, description = "Team playing in the match")
    ),
    request_body = LineupRequest,
    responses(
        (status = 204, description = "Lineup stored"),
        (status = 400, description = "Lineup does not fit the match format", body = ErrorBody),
        (status = 409, description = "Lineup already locked", body = ErrorBody)
    )
)]
pub async fn submit_lineup(
    State(state): State<SharedState>,
    Path((id, team_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<LineupRequest>,
) -> Result<StatusCode, AppError> {
    lineup_service::submit_lineup(&state, id, team_id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}
