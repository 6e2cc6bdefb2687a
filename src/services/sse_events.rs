use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::MatchStatus,
    dto::{
        matches::GameRecordView,
        sse::{
            GameChangedEvent, LineupChangedEvent, MatchChangedEvent, MatchSnapshotEvent,
            ServerEvent, SystemStatus,
        },
    },
    state::{
        SharedState,
        game_record::GameRecord,
        projector::MatchProjection,
        sync::{MatchEvent, SyncMessage},
    },
};

pub(crate) const EVENT_MATCH_SNAPSHOT: &str = "match.snapshot";
const EVENT_GAME_CHANGED: &str = "game.changed";
const EVENT_MATCH_CHANGED: &str = "match.changed";
const EVENT_LINEUP_CHANGED: &str = "lineup.changed";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Broadcast a stored game record to both sides of its match.
pub fn broadcast_game_changed(state: &SharedState, record: &GameRecord) {
    let delivered = state.sync().publish(
        record.match_id,
        MatchEvent::GameChanged {
            record: record.clone(),
        },
    );
    debug!(
        match_id = %record.match_id,
        game_number = record.game_number,
        version = record.version,
        delivered,
        "game change published"
    );
}

/// Broadcast refreshed match counters and status.
pub fn broadcast_match_changed(
    state: &SharedState,
    match_id: Uuid,
    status: MatchStatus,
    projection: MatchProjection,
) {
    state.sync().publish(
        match_id,
        MatchEvent::MatchChanged { status, projection },
    );
}

/// Broadcast that a lineup was stored or locked.
pub fn broadcast_lineup_changed(state: &SharedState, match_id: Uuid, team_id: Uuid, locked: bool) {
    state
        .sync()
        .publish(match_id, MatchEvent::LineupChanged { team_id, locked });
}

/// Broadcast the degraded flag on every open match stream.
pub fn broadcast_system_status(state: &SharedState) {
    state.sync().publish_all(MatchEvent::StorageStatus {
        degraded: state.is_degraded(),
    });
}

/// Render a full match snapshot as an SSE payload.
pub fn snapshot_event(snapshot: &MatchSnapshotEvent) -> Option<ServerEvent> {
    encode(EVENT_MATCH_SNAPSHOT, snapshot)
}

/// Render a sync message as an SSE payload. Resync requests carry no payload
/// of their own; the caller answers them with a fresh snapshot.
pub fn to_server_event(message: &SyncMessage) -> Option<ServerEvent> {
    match message {
        SyncMessage::Event(MatchEvent::GameChanged { record }) => encode(
            EVENT_GAME_CHANGED,
            &GameChangedEvent(GameRecordView::from(record)),
        ),
        SyncMessage::Event(MatchEvent::MatchChanged { status, projection }) => encode(
            EVENT_MATCH_CHANGED,
            &MatchChangedEvent {
                status: *status,
                projection: *projection,
            },
        ),
        SyncMessage::Event(MatchEvent::LineupChanged { team_id, locked }) => encode(
            EVENT_LINEUP_CHANGED,
            &LineupChangedEvent {
                team_id: *team_id,
                locked: *locked,
            },
        ),
        SyncMessage::Event(MatchEvent::StorageStatus { degraded }) => encode(
            EVENT_SYSTEM_STATUS,
            &SystemStatus {
                degraded: *degraded,
            },
        ),
        SyncMessage::Resync { .. } => None,
    }
}

fn encode(event: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize match SSE payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game_record::tests::confirmed_home_win;

    #[test]
    fn game_change_is_named_and_flattened() {
        let record = confirmed_home_win(3);
        let event = to_server_event(&SyncMessage::Event(MatchEvent::GameChanged { record }))
            .expect("event");
        assert_eq!(event.event.as_deref(), Some(EVENT_GAME_CHANGED));

        let data: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(data["game_number"], 3);
        assert_eq!(data["state"]["state"], "confirmed");
    }

    #[test]
    fn resync_has_no_payload() {
        assert!(to_server_event(&SyncMessage::Resync { missed: 4 }).is_none());
    }
}
