//! The scoring operations (`score`, `confirm`, `deny`, `request_vacate`,
//! `resolve_vacate`) and the match reads built on the same records.
//!
//! Every write follows the same path: load the match and its locked lineups,
//! work out the caller's side from the team rosters, apply the event to the
//! stored record, persist it conditionally, then refresh the match row from a
//! fresh projection.

use std::{sync::Arc, time::SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        match_store::MatchStore,
        models::{LeagueSettingsEntity, LineupEntity, MatchEntity, TeamRosterEntity},
        storage::StorageError,
    },
    dto::{
        matches::{
            ConfirmationQueueView, GameActionRequest, GameRecordView, MatchOverview,
            ResolveVacateRequest, ScoreGameRequest,
        },
        sse::MatchSnapshotEvent,
    },
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        game_record::{GameEvent, GameRecord, SUBSTITUTE_PLAYER_ID, Side},
        handicap::{MatchFormat, MatchThresholds, TeamHandicap},
        projector::{MatchProjection, MatchStateProjector, MatchTeams},
        queue::ConfirmationQueue,
        transitions::commit_game_event,
    },
};

/// Conditional writes of the match row before a refresh gives up.
const MATCH_REFRESH_ATTEMPTS: u32 = 5;

/// Everything an operation needs about a match in play.
struct PlayContext {
    store: Arc<dyn MatchStore>,
    entity: MatchEntity,
    settings: LeagueSettingsEntity,
    thresholds: MatchThresholds,
    home: LineupEntity,
    away: LineupEntity,
}

impl PlayContext {
    fn projector(&self) -> MatchStateProjector {
        MatchStateProjector::new(
            self.entity.teams(),
            self.thresholds,
            self.entity.format.game_count(),
            self.settings.golden_break_counts_as_win,
        )
    }
}

/// Submit a result for an unscored game on behalf of the caller's side.
pub async fn score_game(
    state: &SharedState,
    match_id: Uuid,
    game_number: u8,
    request: ScoreGameRequest,
) -> Result<GameRecord, ServiceError> {
    let action = GameActionRequest {
        acting_member_id: request.acting_member_id,
        expected_version: request.expected_version,
    };
    let options = request.options();

    run_game_event(state, match_id, game_number, action, |ctx, record, side| {
        let teams = ctx.entity.teams();
        let winner_side = teams.side_of(request.winner_team_id).ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "team {} does not play in match {}",
                request.winner_team_id, match_id
            ))
        })?;
        let seated = record.player(winner_side);
        if request.winner_player_id != seated && request.winner_player_id != SUBSTITUTE_PLAYER_ID {
            return Err(ServiceError::InvalidInput(format!(
                "player {} is not seated for the {} side in game {}",
                request.winner_player_id, winner_side, game_number
            )));
        }

        Ok(GameEvent::Score {
            side,
            member_id: request.acting_member_id,
            winner_team_id: request.winner_team_id,
            winner_player_id: request.winner_player_id,
            options,
        })
    })
    .await
}

/// Confirm the result the other side submitted.
pub async fn confirm_game(
    state: &SharedState,
    match_id: Uuid,
    game_number: u8,
    request: GameActionRequest,
) -> Result<GameRecord, ServiceError> {
    let member_id = request.acting_member_id;
    run_game_event(state, match_id, game_number, request, |_, _, side| {
        Ok(GameEvent::Confirm { side, member_id })
    })
    .await
}

/// Reject the result the other side submitted, clearing the game.
pub async fn deny_game(
    state: &SharedState,
    match_id: Uuid,
    game_number: u8,
    request: GameActionRequest,
) -> Result<GameRecord, ServiceError> {
    run_game_event(state, match_id, game_number, request, |_, _, side| {
        Ok(GameEvent::Deny { side })
    })
    .await
}

/// Ask for a confirmed game to be undone.
pub async fn request_vacate(
    state: &SharedState,
    match_id: Uuid,
    game_number: u8,
    request: GameActionRequest,
) -> Result<GameRecord, ServiceError> {
    run_game_event(state, match_id, game_number, request, |_, _, side| {
        Ok(GameEvent::RequestVacate { side })
    })
    .await
}

/// Approve or deny the other side's vacate request.
pub async fn resolve_vacate(
    state: &SharedState,
    match_id: Uuid,
    game_number: u8,
    request: ResolveVacateRequest,
) -> Result<GameRecord, ServiceError> {
    let approve = request.approve;
    run_game_event(state, match_id, game_number, request.into(), |_, _, side| {
        Ok(GameEvent::ResolveVacate { side, approve })
    })
    .await
}

async fn run_game_event<F>(
    state: &SharedState,
    match_id: Uuid,
    game_number: u8,
    action: GameActionRequest,
    build_event: F,
) -> Result<GameRecord, ServiceError>
where
    F: FnOnce(&PlayContext, &GameRecord, Side) -> Result<GameEvent, ServiceError>,
{
    let store = state.require_store().await?;
    let ctx = load_play_context(state, store, match_id).await?;
    let side = resolve_side(ctx.store.as_ref(), ctx.entity.teams(), action.acting_member_id).await?;
    let now = SystemTime::now();

    let games = ensure_games(&ctx, now).await?;
    let record = games
        .into_iter()
        .find(|record| record.game_number == game_number)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("game {game_number} of match {match_id}"))
        })?;

    if let Some(expected) = action.expected_version
        && expected != record.version
    {
        return Err(ServiceError::StaleWrite(format!(
            "game {game_number} is at version {}, request expected {expected}",
            record.version
        )));
    }

    let event = build_event(&ctx, &record, side)?;
    let stored = commit_game_event(state, ctx.store.as_ref(), &record, &event, now).await?;
    info!(
        match_id = %match_id,
        game_number,
        side = %side,
        event = event.name(),
        version = stored.version,
        "game transition applied"
    );

    if let Err(err) = refresh_match(state, &ctx, now).await {
        // The game write already succeeded; the row catches up on the next write.
        warn!(match_id = %match_id, error = %err, "failed to refresh match row");
    }

    Ok(stored)
}

async fn load_match(store: &dyn MatchStore, match_id: Uuid) -> Result<MatchEntity, ServiceError> {
    store
        .find_match(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match {match_id}")))
}

async fn league_settings(
    store: &dyn MatchStore,
    league_id: Uuid,
) -> Result<LeagueSettingsEntity, ServiceError> {
    Ok(store
        .find_league_settings(league_id)
        .await?
        .unwrap_or_else(|| LeagueSettingsEntity::fallback(league_id)))
}

async fn locked_lineup(
    store: &dyn MatchStore,
    entity: &MatchEntity,
    team_id: Uuid,
) -> Result<LineupEntity, ServiceError> {
    match store.find_lineup(entity.id, team_id).await? {
        Some(lineup) if lineup.locked => {
            let expected = entity.format.players_per_side();
            if lineup.players.len() != expected {
                return Err(ServiceError::InvalidInput(format!(
                    "lineup of team {team_id} seats {} players, match needs {expected}",
                    lineup.players.len()
                )));
            }
            Ok(lineup)
        }
        _ => Err(ServiceError::LineupNotLocked(format!(
            "team {team_id} has not locked its lineup for match {}",
            entity.id
        ))),
    }
}

async fn load_play_context(
    state: &SharedState,
    store: Arc<dyn MatchStore>,
    match_id: Uuid,
) -> Result<PlayContext, ServiceError> {
    let entity = load_match(store.as_ref(), match_id).await?;
    if entity.status.is_closed() {
        return Err(ServiceError::InvalidTransition(format!(
            "match {match_id} is {:?} and no longer accepts scoring",
            entity.status
        )));
    }

    let home = locked_lineup(store.as_ref(), &entity, entity.home_team_id).await?;
    let away = locked_lineup(store.as_ref(), &entity, entity.away_team_id).await?;
    let settings = league_settings(store.as_ref(), entity.league_id).await?;
    let thresholds = entity
        .thresholds
        .unwrap_or_else(|| compute_thresholds(state, &entity, &home, &away));

    Ok(PlayContext {
        store,
        entity,
        settings,
        thresholds,
        home,
        away,
    })
}

fn compute_thresholds(
    state: &SharedState,
    entity: &MatchEntity,
    home: &LineupEntity,
    away: &LineupEntity,
) -> MatchThresholds {
    let home_handicaps = home.handicaps();
    let away_handicaps = away.handicaps();
    let differential = entity.format.differential(
        TeamHandicap {
            handicaps: &home_handicaps,
            modifier: home.team_modifier,
        },
        TeamHandicap {
            handicaps: &away_handicaps,
            modifier: away.team_modifier,
        },
    );
    entity
        .format
        .thresholds(state.config().charts(), differential)
}

/// Side the member acts for, from the two team rosters.
async fn resolve_side(
    store: &dyn MatchStore,
    teams: MatchTeams,
    member_id: Uuid,
) -> Result<Side, ServiceError> {
    let on_team = |roster: Option<TeamRosterEntity>| {
        roster.is_some_and(|roster| roster.member_ids.contains(&member_id))
    };
    let home = on_team(store.find_roster(teams.home_team_id).await?);
    let away = on_team(store.find_roster(teams.away_team_id).await?);

    match (home, away) {
        (true, false) => Ok(Side::Home),
        (false, true) => Ok(Side::Away),
        (true, true) => Err(ServiceError::UnauthorizedSide(format!(
            "member {member_id} is rostered on both teams"
        ))),
        (false, false) => Err(ServiceError::UnauthorizedSide(format!(
            "member {member_id} plays for neither team"
        ))),
    }
}

/// Stored games of the match, generating them on first use.
async fn ensure_games(ctx: &PlayContext, now: SystemTime) -> Result<Vec<GameRecord>, ServiceError> {
    let games = ctx.store.list_games(ctx.entity.id).await?;
    if !games.is_empty() {
        return Ok(games);
    }

    let generated = generate_games(ctx, now)?;
    match ctx.store.insert_games(ctx.entity.id, generated.clone()).await {
        Ok(()) => {
            info!(
                match_id = %ctx.entity.id,
                count = generated.len(),
                "generated match games"
            );
            Ok(generated)
        }
        // Another client generated them first.
        Err(StorageError::Conflict { .. }) => Ok(ctx.store.list_games(ctx.entity.id).await?),
        Err(err) => Err(err.into()),
    }
}

fn generate_games(ctx: &PlayContext, now: SystemTime) -> Result<Vec<GameRecord>, ServiceError> {
    let format = ctx.entity.format;
    (1..=format.game_count())
        .map(|game_number| {
            let rotation = format.rotation(game_number).ok_or_else(|| {
                ServiceError::InvalidInput(format!("no seating for game {game_number}"))
            })?;
            let home_player = seat(&ctx.home, rotation.home_position)?;
            let away_player = seat(&ctx.away, rotation.away_position)?;

            Ok(GameRecord::unscored(
                ctx.entity.id,
                game_number,
                ctx.settings.game_type,
                format == MatchFormat::Tiebreaker,
                (home_player, rotation.home_position),
                (away_player, rotation.away_position),
                rotation.breaking_side,
                now,
            ))
        })
        .collect()
}

fn seat(lineup: &LineupEntity, position: u8) -> Result<Uuid, ServiceError> {
    lineup
        .players
        .get(position as usize)
        .map(|slot| slot.player_id)
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "lineup of team {} has no slot {position}",
                lineup.team_id
            ))
        })
}

/// Recompute the match row from the stored games and publish it when it moved.
///
/// The row is read before the games and written back conditionally on its
/// version, so a refresh racing a newer one retries against fresh games
/// instead of overwriting them with an older projection.
async fn refresh_match(
    state: &SharedState,
    ctx: &PlayContext,
    now: SystemTime,
) -> Result<(), ServiceError> {
    let mut attempt = 1;
    loop {
        let previous = load_match(ctx.store.as_ref(), ctx.entity.id).await?;
        let games = ctx.store.list_games(ctx.entity.id).await?;
        let projection = ctx.projector().project(&games);
        let status = projection.live_status();

        let mut next = previous.clone();
        next.status = status;
        next.home_games_won = projection.home_wins;
        next.away_games_won = projection.away_wins;
        next.thresholds = Some(ctx.thresholds);
        next.result = projection.match_result;

        if next == previous {
            return Ok(());
        }
        next.updated_at = now;
        next.version = previous.version + 1;

        match ctx.store.update_match(next, previous.version).await {
            Ok(_) => {}
            Err(StorageError::Conflict { .. }) if attempt < MATCH_REFRESH_ATTEMPTS => {
                debug!(match_id = %ctx.entity.id, attempt, "match row moved; refreshing again");
                attempt += 1;
                continue;
            }
            Err(err) => return Err(err.into()),
        }

        if previous.status != status {
            info!(
                match_id = %ctx.entity.id,
                from = ?previous.status,
                to = ?status,
                result = ?projection.match_result,
                "match status changed"
            );
        }
        sse_events::broadcast_match_changed(state, ctx.entity.id, status, projection);
        return Ok(());
    }
}

/// Thresholds and projection for a match, when both lineups are locked.
async fn projection_for(
    state: &SharedState,
    store: &dyn MatchStore,
    entity: &MatchEntity,
    games: &[GameRecord],
) -> Result<Option<(MatchThresholds, MatchProjection)>, ServiceError> {
    let thresholds = match entity.thresholds {
        Some(thresholds) => thresholds,
        None => {
            let home = store.find_lineup(entity.id, entity.home_team_id).await?;
            let away = store.find_lineup(entity.id, entity.away_team_id).await?;
            match (home, away) {
                (Some(home), Some(away)) if home.locked && away.locked => {
                    compute_thresholds(state, entity, &home, &away)
                }
                _ => return Ok(None),
            }
        }
    };

    let settings = league_settings(store, entity.league_id).await?;
    let projection = MatchStateProjector::new(
        entity.teams(),
        thresholds,
        entity.format.game_count(),
        settings.golden_break_counts_as_win,
    )
    .project(games);

    Ok(Some((thresholds, projection)))
}

/// Match row, thresholds and projection.
pub async fn match_overview(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchOverview, ServiceError> {
    Ok(match_snapshot(state, match_id).await?.overview)
}

/// Every stored game of the match, for reconciliation.
pub async fn list_games(
    state: &SharedState,
    match_id: Uuid,
) -> Result<Vec<GameRecordView>, ServiceError> {
    let store = state.require_store().await?;
    load_match(store.as_ref(), match_id).await?;
    let games = store.list_games(match_id).await?;
    Ok(games.iter().map(GameRecordView::from).collect())
}

/// Games currently awaiting `side`.
pub async fn confirmation_queue(
    state: &SharedState,
    match_id: Uuid,
    side: Side,
) -> Result<ConfirmationQueueView, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    let games = store.list_games(match_id).await?;
    let queue = ConfirmationQueue::derive(&games, side, &entity.teams());
    Ok(ConfirmationQueueView::new(side, &queue))
}

/// Full state of a match as sent to a freshly connected stream.
pub async fn match_snapshot(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchSnapshotEvent, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    let games = store.list_games(match_id).await?;
    let resolved = projection_for(state, store.as_ref(), &entity, &games).await?;
    let (thresholds, projection) = match resolved {
        Some((thresholds, projection)) => (Some(thresholds), Some(projection)),
        None => (None, None),
    };

    Ok(MatchSnapshotEvent {
        overview: MatchOverview::new(&entity, thresholds, projection),
        games: games.iter().map(GameRecordView::from).collect(),
        degraded: state.is_degraded(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::future::BoxFuture;

    use crate::{
        config::AppConfig,
        dao::{
            match_store::memory::MemoryMatchStore,
            models::{LineupSlotEntity, MatchStatus},
            storage::StorageResult,
        },
        state::{
            AppState,
            game_record::{
                GameState,
                tests::{
                    AWAY_CAPTAIN, AWAY_PLAYER, AWAY_TEAM, HOME_CAPTAIN, HOME_PLAYER, HOME_TEAM,
                },
            },
            projector::MatchResult,
        },
    };

    pub(crate) const MATCH_ID: Uuid = Uuid::from_u128(0xabc);
    pub(crate) const LEAGUE_ID: Uuid = Uuid::from_u128(0x100);

    fn slots(first: Uuid, team_base: u128, count: usize, handicap: i32) -> Vec<LineupSlotEntity> {
        (0..count)
            .map(|i| LineupSlotEntity {
                player_id: if i == 0 {
                    first
                } else {
                    Uuid::from_u128(team_base + 0x100 + i as u128)
                },
                handicap,
            })
            .collect()
    }

    /// Store with two rostered teams, locked lineups and a scheduled match.
    pub(crate) async fn seeded_state(format: MatchFormat, golden_counts: bool) -> SharedState {
        let state = AppState::new(AppConfig::default());
        let store = MemoryMatchStore::new();
        let players = format.players_per_side();

        store
            .save_match(MatchEntity {
                id: MATCH_ID,
                league_id: LEAGUE_ID,
                home_team_id: HOME_TEAM,
                away_team_id: AWAY_TEAM,
                format,
                status: MatchStatus::Scheduled,
                home_games_won: 0,
                away_games_won: 0,
                thresholds: None,
                result: None,
                updated_at: SystemTime::UNIX_EPOCH,
                version: 0,
            })
            .await
            .unwrap();
        for (team_id, player, base) in [
            (HOME_TEAM, HOME_PLAYER, 0x1000),
            (AWAY_TEAM, AWAY_PLAYER, 0x2000),
        ] {
            store
                .save_lineup(LineupEntity {
                    match_id: MATCH_ID,
                    team_id,
                    players: slots(player, base, players, 0),
                    team_modifier: 0,
                    locked: true,
                    locked_at: Some(SystemTime::UNIX_EPOCH),
                })
                .await
                .unwrap();
        }
        store
            .save_roster(TeamRosterEntity {
                team_id: HOME_TEAM,
                member_ids: vec![HOME_CAPTAIN, HOME_PLAYER],
            })
            .await
            .unwrap();
        store
            .save_roster(TeamRosterEntity {
                team_id: AWAY_TEAM,
                member_ids: vec![AWAY_CAPTAIN, AWAY_PLAYER],
            })
            .await
            .unwrap();
        store
            .save_league_settings(LeagueSettingsEntity {
                league_id: LEAGUE_ID,
                golden_break_counts_as_win: golden_counts,
                game_type: Default::default(),
            })
            .await
            .unwrap();

        state.install_match_store(Arc::new(store)).await;
        state
    }

    pub(crate) fn action(member: Uuid) -> GameActionRequest {
        GameActionRequest {
            acting_member_id: member,
            expected_version: None,
        }
    }

    pub(crate) fn home_win(golden_break: bool) -> ScoreGameRequest {
        ScoreGameRequest {
            acting_member_id: HOME_CAPTAIN,
            winner_team_id: HOME_TEAM,
            winner_player_id: SUBSTITUTE_PLAYER_ID,
            break_and_run: false,
            golden_break,
            expected_version: None,
        }
    }

    async fn win_for_home(state: &SharedState, game_number: u8) {
        score_game(state, MATCH_ID, game_number, home_win(false))
            .await
            .unwrap();
        confirm_game(state, MATCH_ID, game_number, action(AWAY_CAPTAIN))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_score_generates_games_and_starts_the_match() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let view = score_game(&state, MATCH_ID, 1, home_win(false))
            .await
            .unwrap();
        assert_eq!(
            view.state(),
            GameState::Pending {
                awaiting: Side::Away
            }
        );

        let games = list_games(&state, MATCH_ID).await.unwrap();
        assert_eq!(games.len(), 18);
        assert_eq!(games[0].home_player_id, HOME_PLAYER);
        assert_eq!(games[0].away_player_id, AWAY_PLAYER);

        let overview = match_overview(&state, MATCH_ID).await.unwrap();
        assert_eq!(overview.status, MatchStatus::InProgress);
        let thresholds = overview.thresholds.unwrap();
        assert_eq!(thresholds.home.games_to_win, 10);
        assert_eq!(thresholds.home.games_to_tie, Some(9));
        assert_eq!(thresholds.home.games_to_lose, 8);
    }

    #[tokio::test]
    async fn scoring_requires_locked_lineups() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let store = state.require_store().await.unwrap();
        let mut lineup = store
            .find_lineup(MATCH_ID, AWAY_TEAM)
            .await
            .unwrap()
            .unwrap();
        lineup.locked = false;
        store.save_lineup(lineup).await.unwrap();

        let err = score_game(&state, MATCH_ID, 1, home_win(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::LineupNotLocked(_)));
        assert!(store.list_games(MATCH_ID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submitting_side_cannot_confirm() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        score_game(&state, MATCH_ID, 2, home_win(false))
            .await
            .unwrap();
        let err = confirm_game(&state, MATCH_ID, 2, action(HOME_PLAYER))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnauthorizedSide(_)));
    }

    #[tokio::test]
    async fn outsiders_cannot_act() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let mut request = home_win(false);
        request.acting_member_id = Uuid::from_u128(0x9999);
        let err = score_game(&state, MATCH_ID, 1, request).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnauthorizedSide(_)));
    }

    #[tokio::test]
    async fn outdated_expected_version_is_a_stale_write() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        score_game(&state, MATCH_ID, 1, home_win(false))
            .await
            .unwrap();
        let err = confirm_game(
            &state,
            MATCH_ID,
            1,
            GameActionRequest {
                acting_member_id: AWAY_CAPTAIN,
                expected_version: Some(0),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::StaleWrite(_)));
    }

    #[tokio::test]
    async fn wrong_winner_player_is_rejected() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let mut request = home_win(false);
        request.winner_player_id = AWAY_PLAYER;
        let err = score_game(&state, MATCH_ID, 1, request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn ten_home_wins_decide_an_even_three_v_three() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        for game in 1..=10 {
            win_for_home(&state, game).await;
        }

        let overview = match_overview(&state, MATCH_ID).await.unwrap();
        assert_eq!(overview.result, Some(MatchResult::HomeWin));
        assert_eq!(overview.status, MatchStatus::AwaitingVerification);
        let projection = overview.projection.unwrap();
        assert_eq!(projection.home_wins, 10);
        assert_eq!(projection.home_points, 1);
    }

    #[tokio::test]
    async fn approved_vacate_reopens_a_decided_tiebreaker() {
        let state = seeded_state(MatchFormat::Tiebreaker, true).await;
        win_for_home(&state, 1).await;
        win_for_home(&state, 2).await;
        assert_eq!(
            match_overview(&state, MATCH_ID).await.unwrap().status,
            MatchStatus::AwaitingVerification
        );

        request_vacate(&state, MATCH_ID, 2, action(AWAY_CAPTAIN))
            .await
            .unwrap();
        let err = resolve_vacate(
            &state,
            MATCH_ID,
            2,
            ResolveVacateRequest {
                acting_member_id: AWAY_CAPTAIN,
                approve: true,
                expected_version: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::UnauthorizedSide(_)));

        let cleared = resolve_vacate(
            &state,
            MATCH_ID,
            2,
            ResolveVacateRequest {
                acting_member_id: HOME_CAPTAIN,
                approve: true,
                expected_version: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(cleared.state(), GameState::Unscored);

        let overview = match_overview(&state, MATCH_ID).await.unwrap();
        assert_eq!(overview.status, MatchStatus::InProgress);
        assert_eq!(overview.result, None);
    }

    #[tokio::test]
    async fn golden_break_does_not_count_when_league_says_so() {
        let state = seeded_state(MatchFormat::Tiebreaker, false).await;
        score_game(&state, MATCH_ID, 1, home_win(true))
            .await
            .unwrap();
        confirm_game(&state, MATCH_ID, 1, action(AWAY_CAPTAIN))
            .await
            .unwrap();

        let projection = match_overview(&state, MATCH_ID)
            .await
            .unwrap()
            .projection
            .unwrap();
        assert_eq!(projection.home_wins, 0);
    }

    #[tokio::test]
    async fn queue_lists_games_awaiting_the_viewer() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        for game in [7, 3] {
            score_game(&state, MATCH_ID, game, home_win(false))
                .await
                .unwrap();
        }

        let away = confirmation_queue(&state, MATCH_ID, Side::Away)
            .await
            .unwrap();
        let numbers: Vec<u8> = away.items.iter().map(|item| item.game_number).collect();
        assert_eq!(numbers, vec![3, 7]);
        assert_eq!(away.current.map(|item| item.game_number), Some(3));

        let home = confirmation_queue(&state, MATCH_ID, Side::Home)
            .await
            .unwrap();
        assert!(home.items.is_empty());
    }

    #[tokio::test]
    async fn closed_matches_reject_scoring() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let store = state.require_store().await.unwrap();
        let mut entity = store.find_match(MATCH_ID).await.unwrap().unwrap();
        entity.status = MatchStatus::Forfeited;
        store.save_match(entity).await.unwrap();

        let err = score_game(&state, MATCH_ID, 1, home_win(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn writes_are_broadcast_to_subscribers() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let mut subscription = state.sync().subscribe(MATCH_ID);
        score_game(&state, MATCH_ID, 1, home_win(false))
            .await
            .unwrap();

        match subscription.next().await {
            Some(crate::state::sync::SyncMessage::Event(
                crate::state::sync::MatchEvent::GameChanged { record },
            )) => {
                assert_eq!(record.game_number, 1);
                assert_eq!(record.version, 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    /// Memory store whose league reads can fail and whose match row can be
    /// moved by a competing writer right before a conditional update.
    #[derive(Clone, Default)]
    struct InterferingStore {
        inner: MemoryMatchStore,
        league_reads_fail: bool,
        competing_row_writes: Arc<AtomicU32>,
    }

    impl MatchStore for InterferingStore {
        fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
            self.inner.find_match(id)
        }

        fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.save_match(entity)
        }

        fn update_match(
            &self,
            entity: MatchEntity,
            expected_version: u64,
        ) -> BoxFuture<'static, StorageResult<MatchEntity>> {
            let competing = self
                .competing_row_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if !competing {
                return self.inner.update_match(entity, expected_version);
            }
            let inner = self.inner.clone();
            Box::pin(async move {
                let mut current = inner.find_match(entity.id).await?.ok_or_else(|| {
                    StorageError::conflict(format!("match::{}", entity.id))
                })?;
                let version = current.version;
                current.version += 1;
                inner.update_match(current, version).await?;
                inner.update_match(entity, expected_version).await
            })
        }

        fn find_lineup(
            &self,
            match_id: Uuid,
            team_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<LineupEntity>>> {
            self.inner.find_lineup(match_id, team_id)
        }

        fn save_lineup(&self, lineup: LineupEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.save_lineup(lineup)
        }

        fn save_lineup_if_unlocked(
            &self,
            lineup: LineupEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.save_lineup_if_unlocked(lineup)
        }

        fn find_league_settings(
            &self,
            league_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<LeagueSettingsEntity>>> {
            if self.league_reads_fail {
                return Box::pin(async {
                    Err(StorageError::unavailable(
                        "league settings".into(),
                        std::io::Error::other("connection refused"),
                    ))
                });
            }
            self.inner.find_league_settings(league_id)
        }

        fn save_league_settings(
            &self,
            settings: LeagueSettingsEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.save_league_settings(settings)
        }

        fn find_roster(
            &self,
            team_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<TeamRosterEntity>>> {
            self.inner.find_roster(team_id)
        }

        fn save_roster(&self, roster: TeamRosterEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.save_roster(roster)
        }

        fn list_games(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<GameRecord>>> {
            self.inner.list_games(match_id)
        }

        fn find_game(
            &self,
            match_id: Uuid,
            game_number: u8,
        ) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
            self.inner.find_game(match_id, game_number)
        }

        fn insert_games(
            &self,
            match_id: Uuid,
            records: Vec<GameRecord>,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.insert_games(match_id, records)
        }

        fn update_game(
            &self,
            record: GameRecord,
            expected_version: u64,
        ) -> BoxFuture<'static, StorageResult<GameRecord>> {
            self.inner.update_game(record, expected_version)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    /// Move the seeded store behind an [`InterferingStore`].
    async fn interfering_state(store: InterferingStore) -> SharedState {
        let seeded = seeded_state(MatchFormat::Tiebreaker, true).await;
        let source = seeded.require_store().await.unwrap();
        let entity = source.find_match(MATCH_ID).await.unwrap().unwrap();
        store.inner.save_match(entity).await.unwrap();
        for team_id in [HOME_TEAM, AWAY_TEAM] {
            let lineup = source.find_lineup(MATCH_ID, team_id).await.unwrap().unwrap();
            store.inner.save_lineup(lineup).await.unwrap();
            let roster = source.find_roster(team_id).await.unwrap().unwrap();
            store.inner.save_roster(roster).await.unwrap();
        }
        let settings = source.find_league_settings(LEAGUE_ID).await.unwrap().unwrap();
        store.inner.save_league_settings(settings).await.unwrap();

        let state = AppState::new(AppConfig::default());
        state.install_match_store(Arc::new(store)).await;
        state
    }

    #[tokio::test]
    async fn failed_league_read_is_an_error_not_a_default() {
        let state = interfering_state(InterferingStore {
            league_reads_fail: true,
            ..Default::default()
        })
        .await;

        let err = score_game(&state, MATCH_ID, 1, home_win(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        let err = match_overview(&state, MATCH_ID).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));

        let store = state.require_store().await.unwrap();
        assert!(store.list_games(MATCH_ID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_retries_when_the_row_moved() {
        let store = InterferingStore::default();
        let state = interfering_state(store.clone()).await;
        win_for_home(&state, 1).await;

        let before = store.inner.find_match(MATCH_ID).await.unwrap().unwrap();
        store.competing_row_writes.store(1, Ordering::SeqCst);
        win_for_home(&state, 2).await;

        let row = store.inner.find_match(MATCH_ID).await.unwrap().unwrap();
        assert_eq!(store.competing_row_writes.load(Ordering::SeqCst), 0);
        assert_eq!(row.home_games_won, 2);
        assert_eq!(row.result, Some(MatchResult::HomeWin));
        assert_eq!(row.status, MatchStatus::AwaitingVerification);
        // the competing bump plus the confirm's refresh
        assert_eq!(row.version, before.version + 2);
    }

    #[tokio::test]
    async fn overview_follows_the_games_when_the_row_lags() {
        let state = seeded_state(MatchFormat::Tiebreaker, true).await;
        let store = state.require_store().await.unwrap();
        win_for_home(&state, 1).await;
        let lagging = store.find_match(MATCH_ID).await.unwrap().unwrap();
        win_for_home(&state, 2).await;

        store.save_match(lagging.clone()).await.unwrap();
        let overview = match_overview(&state, MATCH_ID).await.unwrap();
        assert_eq!(overview.status, MatchStatus::AwaitingVerification);
        assert_eq!(overview.result, Some(MatchResult::HomeWin));

        request_vacate(&state, MATCH_ID, 2, action(AWAY_CAPTAIN))
            .await
            .unwrap();
        let row = store.find_match(MATCH_ID).await.unwrap().unwrap();
        assert_eq!(row.result, Some(MatchResult::HomeWin));
        assert_eq!(row.version, lagging.version + 1);
    }
}
