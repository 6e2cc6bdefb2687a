//! Hand-off point for the lineup entry flow. Lineups may be replaced until
//! they are locked; once locked they are read-only for the rest of the match.

use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{match_store::MatchStore, models::LineupEntity, storage::StorageError},
    dto::matches::LineupRequest,
    error::ServiceError,
    services::sse_events,
    state::SharedState,
};

/// Store (and optionally lock) a team's lineup for a match.
pub async fn submit_lineup(
    state: &SharedState,
    match_id: Uuid,
    team_id: Uuid,
    request: LineupRequest,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let lineup = prepare_lineup(store.as_ref(), match_id, team_id, request).await?;
    let locked = lineup.locked;
    store_unless_locked(store.as_ref(), lineup).await?;

    info!(match_id = %match_id, team_id = %team_id, locked, "lineup stored");
    sse_events::broadcast_lineup_changed(state, match_id, team_id, locked);
    Ok(())
}

/// Write `lineup` only if no locked lineup landed since it was prepared.
async fn store_unless_locked(
    store: &dyn MatchStore,
    lineup: LineupEntity,
) -> Result<(), ServiceError> {
    let (match_id, team_id) = (lineup.match_id, lineup.team_id);
    store
        .save_lineup_if_unlocked(lineup)
        .await
        .map_err(|err| match err {
            StorageError::Conflict { .. } => ServiceError::InvalidTransition(format!(
                "lineup of team {team_id} is locked for match {match_id}"
            )),
            other => other.into(),
        })
}

/// Validate `request` against the match and build the entity to store.
pub(crate) async fn prepare_lineup(
    store: &dyn MatchStore,
    match_id: Uuid,
    team_id: Uuid,
    request: LineupRequest,
) -> Result<LineupEntity, ServiceError> {
    let entity = store
        .find_match(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match {match_id}")))?;
    if entity.teams().side_of(team_id).is_none() {
        return Err(ServiceError::InvalidInput(format!(
            "team {team_id} does not play in match {match_id}"
        )));
    }

    request
        .validate_for(entity.format)
        .map_err(|err| ServiceError::InvalidInput(format!("validation failed: {err}")))?;

    if let Some(existing) = store.find_lineup(match_id, team_id).await?
        && existing.locked
    {
        return Err(ServiceError::InvalidTransition(format!(
            "lineup of team {team_id} is locked for match {match_id}"
        )));
    }

    Ok(LineupEntity {
        match_id,
        team_id,
        players: request.players,
        team_modifier: request.team_modifier,
        locked: request.lock,
        locked_at: request.lock.then(SystemTime::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::LineupSlotEntity,
        services::scoring_service::tests::{MATCH_ID, seeded_state},
        state::{
            game_record::tests::{AWAY_TEAM, HOME_TEAM},
            handicap::MatchFormat,
            sync::{MatchEvent, SyncMessage},
        },
    };

    fn request(lock: bool) -> LineupRequest {
        LineupRequest {
            players: (1..=3)
                .map(|i| LineupSlotEntity {
                    player_id: Uuid::from_u128(0x3000 + i),
                    handicap: 1,
                })
                .collect(),
            team_modifier: 0,
            lock,
        }
    }

    #[tokio::test]
    async fn locked_lineups_are_immutable() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let err = submit_lineup(&state, MATCH_ID, HOME_TEAM, request(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn unlocked_lineup_can_be_replaced_and_is_broadcast() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let store = state.require_store().await.unwrap();
        let mut lineup = store
            .find_lineup(MATCH_ID, AWAY_TEAM)
            .await
            .unwrap()
            .unwrap();
        lineup.locked = false;
        store.save_lineup(lineup).await.unwrap();

        let mut subscription = state.sync().subscribe(MATCH_ID);
        submit_lineup(&state, MATCH_ID, AWAY_TEAM, request(true))
            .await
            .unwrap();

        let stored = store
            .find_lineup(MATCH_ID, AWAY_TEAM)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.locked);
        assert!(stored.locked_at.is_some());
        assert_eq!(
            subscription.next().await,
            Some(SyncMessage::Event(MatchEvent::LineupChanged {
                team_id: AWAY_TEAM,
                locked: true
            }))
        );
    }

    #[tokio::test]
    async fn foreign_team_is_rejected() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let err = submit_lineup(&state, MATCH_ID, Uuid::from_u128(0x7777), request(true))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn lock_landing_after_validation_wins() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let store = state.require_store().await.unwrap();
        let mut current = store
            .find_lineup(MATCH_ID, AWAY_TEAM)
            .await
            .unwrap()
            .unwrap();
        current.locked = false;
        store.save_lineup(current.clone()).await.unwrap();

        let replacement = prepare_lineup(store.as_ref(), MATCH_ID, AWAY_TEAM, request(false))
            .await
            .unwrap();
        current.locked = true;
        store.save_lineup(current.clone()).await.unwrap();

        let err = store_unless_locked(store.as_ref(), replacement)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
        let stored = store
            .find_lineup(MATCH_ID, AWAY_TEAM)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, current);
    }
}
