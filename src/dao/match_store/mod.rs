#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{LeagueSettingsEntity, LineupEntity, MatchEntity, TeamRosterEntity};
use crate::dao::storage::StorageResult;
use crate::state::game_record::GameRecord;

/// Abstraction over the shared store holding matches, lineups and game records.
///
/// Game writes are conditional: [`MatchStore::update_game`] succeeds only when
/// the stored version equals `expected_version`, otherwise it fails with
/// [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict).
/// That check is the only concurrency control between the two team clients.
pub trait MatchStore: Send + Sync {
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace a match row if its stored version is still `expected_version`.
    fn update_match(
        &self,
        entity: MatchEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<MatchEntity>>;
    fn find_lineup(
        &self,
        match_id: Uuid,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<LineupEntity>>>;
    fn save_lineup(&self, lineup: LineupEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Store a lineup unless the stored one is already locked, in which case
    /// the write fails with a conflict and nothing changes.
    fn save_lineup_if_unlocked(
        &self,
        lineup: LineupEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_league_settings(
        &self,
        league_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<LeagueSettingsEntity>>>;
    fn save_league_settings(
        &self,
        settings: LeagueSettingsEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_roster(&self, team_id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<TeamRosterEntity>>>;
    fn save_roster(&self, roster: TeamRosterEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Every game of a match, ordered by game number.
    fn list_games(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<GameRecord>>>;
    fn find_game(
        &self,
        match_id: Uuid,
        game_number: u8,
    ) -> BoxFuture<'static, StorageResult<Option<GameRecord>>>;
    /// Create the games of a match; conflicts if any of them already exists.
    fn insert_games(
        &self,
        match_id: Uuid,
        records: Vec<GameRecord>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace a game if its stored version is still `expected_version`.
    fn update_game(
        &self,
        record: GameRecord,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<GameRecord>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
