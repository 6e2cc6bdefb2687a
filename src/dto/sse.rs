use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::MatchStatus,
    dto::matches::{GameRecordView, MatchOverview},
    state::projector::MatchProjection,
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Full match state, sent first on every connection and again after a resync.
pub struct MatchSnapshotEvent {
    pub overview: MatchOverview,
    pub games: Vec<GameRecordView>,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast whenever a game record is written.
pub struct GameChangedEvent(pub GameRecordView);

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the match row counters or status move.
pub struct MatchChangedEvent {
    pub status: MatchStatus,
    pub projection: MatchProjection,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a lineup is stored or locked.
pub struct LineupChangedEvent {
    pub team_id: Uuid,
    pub locked: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}
