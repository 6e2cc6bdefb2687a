use serde::Deserialize;
use uuid::Uuid;

use crate::{
    dao::models::{LeagueSettingsEntity, MatchStatus, TeamRosterEntity},
    dto::matches::LineupRequest,
    state::handicap::MatchFormat,
};

/// Fixture document loaded into the in-memory store at startup.
#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub leagues: Vec<LeagueSettingsEntity>,
    #[serde(default)]
    pub rosters: Vec<TeamRosterEntity>,
    #[serde(default)]
    pub matches: Vec<SeedMatch>,
}

/// Scheduled match with the lineups handed over for it.
#[derive(Debug, Deserialize)]
pub struct SeedMatch {
    pub id: Uuid,
    pub league_id: Uuid,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
    pub format: MatchFormat,
    #[serde(default = "scheduled")]
    pub status: MatchStatus,
    #[serde(default)]
    pub lineups: Vec<SeedLineup>,
}

/// One team's lineup inside a [`SeedMatch`].
#[derive(Debug, Deserialize)]
pub struct SeedLineup {
    pub team_id: Uuid,
    #[serde(flatten)]
    pub lineup: LineupRequest,
}

fn scheduled() -> MatchStatus {
    MatchStatus::Scheduled
}
