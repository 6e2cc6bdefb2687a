use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{LineupSlotEntity, MatchEntity, MatchStatus},
    dto::{
        format_system_time,
        validation::{validate_handicap, validate_lineup_size, validate_member_id},
    },
    state::{
        game_record::{BreakAction, GameRecord, GameState, GameType, ScoringOptions, Side},
        handicap::{MatchFormat, MatchThresholds},
        projector::{MatchProjection, MatchResult},
        queue::{ConfirmationQueue, ConfirmationQueueItem},
    },
};

/// Result submitted by one side for an unscored game.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ScoreGameRequest {
    /// Member submitting the result; their team decides the submitting side.
    #[validate(custom(function = "validate_member_id"))]
    pub acting_member_id: Uuid,
    /// Team credited with the win.
    pub winner_team_id: Uuid,
    /// Player credited with the win (the nil id for a substitute).
    pub winner_player_id: Uuid,
    /// Winner broke and ran the table.
    #[serde(default)]
    pub break_and_run: bool,
    /// Game-deciding ball went down on the break.
    #[serde(default)]
    pub golden_break: bool,
    /// Version the client last saw; the write fails with `stale_write` if it moved.
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl ScoreGameRequest {
    /// Scoring flags carried by the request.
    pub fn options(&self) -> ScoringOptions {
        ScoringOptions {
            break_and_run: self.break_and_run,
            golden_break: self.golden_break,
        }
    }
}

/// Payload for confirm, deny and vacate requests.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema, Validate)]
pub struct GameActionRequest {
    /// Member acting; their team decides the acting side.
    #[validate(custom(function = "validate_member_id"))]
    pub acting_member_id: Uuid,
    /// Version the client last saw.
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// Answer to a vacate request.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema, Validate)]
pub struct ResolveVacateRequest {
    /// Member answering; must belong to the side that did not ask.
    #[validate(custom(function = "validate_member_id"))]
    pub acting_member_id: Uuid,
    /// `true` clears the game, `false` keeps the confirmed result.
    pub approve: bool,
    /// Version the client last saw.
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl From<ResolveVacateRequest> for GameActionRequest {
    fn from(value: ResolveVacateRequest) -> Self {
        Self {
            acting_member_id: value.acting_member_id,
            expected_version: value.expected_version,
        }
    }
}

/// Lineup handed over by the lineup entry flow.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LineupRequest {
    /// Seats in lineup order.
    pub players: Vec<LineupSlotEntity>,
    /// Team-level handicap adjustment.
    #[serde(default)]
    pub team_modifier: i32,
    /// Freeze the lineup; it can no longer change afterwards.
    #[serde(default)]
    pub lock: bool,
}

impl LineupRequest {
    /// Check seat count and handicap ranges against the match format.
    pub fn validate_for(&self, format: MatchFormat) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_lineup_size(format, self.players.len()) {
            errors.add("players", e);
        }
        for slot in &self.players {
            if let Err(e) = validate_handicap(format, slot.handicap) {
                errors.add("handicap", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Query string selecting whose queue to build.
#[derive(Debug, Deserialize, IntoParams)]
pub struct QueueQuery {
    /// Viewer side.
    pub side: Side,
}

/// Game record as exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameRecordView {
    pub match_id: Uuid,
    pub game_number: u8,
    pub game_type: GameType,
    pub is_tiebreaker: bool,
    pub home_player_id: Uuid,
    pub away_player_id: Uuid,
    pub home_position: u8,
    pub away_position: u8,
    pub home_action: BreakAction,
    pub away_action: BreakAction,
    pub winner_team_id: Option<Uuid>,
    pub winner_player_id: Option<Uuid>,
    pub break_and_run: bool,
    pub golden_break: bool,
    pub confirmed_by_home: Option<Uuid>,
    pub confirmed_by_away: Option<Uuid>,
    pub vacate_requested_by: Option<Side>,
    /// Workflow state derived from the fields above.
    pub state: GameState,
    /// RFC 3339 time both sides had confirmed.
    pub confirmed_at: Option<String>,
    /// Record version; send it back as `expected_version`.
    pub version: u64,
    /// RFC 3339 time of the last write.
    pub updated_at: String,
}

impl From<&GameRecord> for GameRecordView {
    fn from(record: &GameRecord) -> Self {
        Self {
            match_id: record.match_id,
            game_number: record.game_number,
            game_type: record.game_type,
            is_tiebreaker: record.is_tiebreaker,
            home_player_id: record.home_player_id,
            away_player_id: record.away_player_id,
            home_position: record.home_position,
            away_position: record.away_position,
            home_action: record.home_action,
            away_action: record.away_action,
            winner_team_id: record.winner_team_id,
            winner_player_id: record.winner_player_id,
            break_and_run: record.break_and_run,
            golden_break: record.golden_break,
            confirmed_by_home: record.confirmed_by_home,
            confirmed_by_away: record.confirmed_by_away,
            vacate_requested_by: record.vacate_requested_by,
            state: record.state(),
            confirmed_at: record.confirmed_at.map(format_system_time),
            version: record.version,
            updated_at: format_system_time(record.updated_at),
        }
    }
}

/// Match row, thresholds and live projection.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatchOverview {
    pub id: Uuid,
    pub league_id: Uuid,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
    pub format: MatchFormat,
    pub status: MatchStatus,
    pub game_count: u8,
    /// Resolved once both lineups are locked.
    pub thresholds: Option<MatchThresholds>,
    /// Present once thresholds are known.
    pub projection: Option<MatchProjection>,
    pub result: Option<MatchResult>,
    pub updated_at: String,
}

impl MatchOverview {
    /// Combine the stored row with a freshly computed projection.
    ///
    /// While the match is open, status and result follow the projection so a
    /// row that lags behind its games is never reported.
    pub fn new(
        entity: &MatchEntity,
        thresholds: Option<MatchThresholds>,
        projection: Option<MatchProjection>,
    ) -> Self {
        let (status, result) = match projection {
            Some(projection)
                if !entity.status.is_closed()
                    && (entity.status != MatchStatus::Scheduled
                        || projection.completed_count > 0) =>
            {
                (projection.live_status(), projection.match_result)
            }
            _ => (entity.status, entity.result),
        };

        Self {
            id: entity.id,
            league_id: entity.league_id,
            home_team_id: entity.home_team_id,
            away_team_id: entity.away_team_id,
            format: entity.format,
            status,
            game_count: entity.format.game_count(),
            thresholds,
            projection,
            result,
            updated_at: format_system_time(entity.updated_at),
        }
    }
}

/// Confirmation queue for one viewer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConfirmationQueueView {
    pub side: Side,
    /// The one item the viewer should be prompted with.
    pub current: Option<ConfirmationQueueItem>,
    pub items: Vec<ConfirmationQueueItem>,
}

impl ConfirmationQueueView {
    /// Render `queue` for `side`.
    pub fn new(side: Side, queue: &ConfirmationQueue) -> Self {
        Self {
            side,
            current: queue.current().cloned(),
            items: queue.items().to_vec(),
        }
    }
}
