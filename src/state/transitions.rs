use std::time::SystemTime;

use tracing::debug;

use crate::{
    dao::match_store::MatchStore,
    error::ServiceError,
    services::sse_events::broadcast_game_changed,
    state::{
        SharedState,
        game_record::{GameEvent, GameRecord},
    },
};

/// Apply `event` to `current`, persist it conditionally on `current.version`,
/// then broadcast the stored record.
///
/// Nothing is written or published when the state machine rejects the event,
/// and a lost conditional write surfaces as [`ServiceError::StaleWrite`].
pub async fn commit_game_event(
    state: &SharedState,
    store: &dyn MatchStore,
    current: &GameRecord,
    event: &GameEvent,
    now: SystemTime,
) -> Result<GameRecord, ServiceError> {
    let next = current.apply(event, now).map_err(|err| {
        debug!(
            match_id = %current.match_id,
            game_number = current.game_number,
            side = %event.side(),
            event = event.name(),
            error = %err,
            "game transition rejected"
        );
        ServiceError::from(err)
    })?;

    let stored = store
        .update_game(next, current.version)
        .await
        .map_err(|err| {
            debug!(
                match_id = %current.match_id,
                game_number = current.game_number,
                expected_version = current.version,
                error = %err,
                "conditional game write failed"
            );
            ServiceError::from(err)
        })?;

    broadcast_game_changed(state, &stored);
    Ok(stored)
}
