use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    game_record::GameType,
    handicap::{MatchFormat, MatchThresholds},
    projector::{MatchResult, MatchTeams},
};

/// Lifecycle of a scheduled match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Waiting for both lineups to lock.
    Scheduled,
    /// Games are being scored.
    InProgress,
    /// A result exists and awaits sign-off on the results page.
    AwaitingVerification,
    /// Results signed off.
    Completed,
    /// One team forfeited.
    Forfeited,
    /// Moved to a later date.
    Postponed,
}

impl MatchStatus {
    /// Scoring is closed for matches in these states.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            MatchStatus::Completed | MatchStatus::Forfeited | MatchStatus::Postponed
        )
    }
}

/// Match row owned by the schedule; scoring only touches counters and result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Primary key.
    pub id: Uuid,
    /// League the match belongs to.
    pub league_id: Uuid,
    /// Home team.
    pub home_team_id: Uuid,
    /// Away team.
    pub away_team_id: Uuid,
    /// Format deciding game count and thresholds.
    pub format: MatchFormat,
    /// Current lifecycle state.
    pub status: MatchStatus,
    /// Confirmed home wins.
    #[serde(default)]
    pub home_games_won: u8,
    /// Confirmed away wins.
    #[serde(default)]
    pub away_games_won: u8,
    /// Thresholds resolved when play started.
    #[serde(default)]
    pub thresholds: Option<MatchThresholds>,
    /// Decided outcome.
    #[serde(default)]
    pub result: Option<MatchResult>,
    /// Last time the row was updated.
    pub updated_at: SystemTime,
    /// Bumped on every conditional update of the row.
    #[serde(default)]
    pub version: u64,
}

impl MatchEntity {
    /// Home and away team ids.
    pub fn teams(&self) -> MatchTeams {
        MatchTeams {
            home_team_id: self.home_team_id,
            away_team_id: self.away_team_id,
        }
    }
}

/// One seat in a locked lineup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct LineupSlotEntity {
    /// Seated player (may be the substitute placeholder).
    pub player_id: Uuid,
    /// Handicap frozen at lock time.
    pub handicap: i32,
}

/// Frozen roster for one team in one match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineupEntity {
    /// Match the lineup belongs to.
    pub match_id: Uuid,
    /// Team fielding the lineup.
    pub team_id: Uuid,
    /// Seats in lineup order.
    pub players: Vec<LineupSlotEntity>,
    /// Team-level handicap adjustment.
    #[serde(default)]
    pub team_modifier: i32,
    /// Whether the lineup is frozen.
    pub locked: bool,
    /// When it was frozen.
    #[serde(default)]
    pub locked_at: Option<SystemTime>,
}

impl LineupEntity {
    /// Handicaps in lineup order.
    pub fn handicaps(&self) -> Vec<i32> {
        self.players.iter().map(|slot| slot.handicap).collect()
    }
}

/// League policy consulted by the scoring engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeagueSettingsEntity {
    /// League id.
    pub league_id: Uuid,
    /// Whether a golden break wins the game outright.
    pub golden_break_counts_as_win: bool,
    /// Discipline played in the league.
    #[serde(default)]
    pub game_type: GameType,
}

impl LeagueSettingsEntity {
    /// Policy applied when a league has no stored settings.
    pub fn fallback(league_id: Uuid) -> Self {
        Self {
            league_id,
            golden_break_counts_as_win: true,
            game_type: GameType::EightBall,
        }
    }
}

/// Members allowed to act for a team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamRosterEntity {
    /// Team id.
    pub team_id: Uuid,
    /// Member ids on the team.
    pub member_ids: Vec<Uuid>,
}
