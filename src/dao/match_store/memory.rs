//! Process-local store backed by concurrent maps. Used when no database is
//! configured and by the test suites.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{LeagueSettingsEntity, LineupEntity, MatchEntity, TeamRosterEntity},
    storage::{StorageError, StorageResult},
};
use crate::state::game_record::GameRecord;

#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    matches: DashMap<Uuid, MatchEntity>,
    lineups: DashMap<(Uuid, Uuid), LineupEntity>,
    leagues: DashMap<Uuid, LeagueSettingsEntity>,
    rosters: DashMap<Uuid, TeamRosterEntity>,
    games: DashMap<(Uuid, u8), GameRecord>,
}

impl MemoryMatchStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn game_key(match_id: Uuid, game_number: u8) -> String {
    format!("game::{match_id}::{game_number}")
}

fn lineup_key(match_id: Uuid, team_id: Uuid) -> String {
    format!("lineup::{match_id}::{team_id}")
}

impl MatchStore for MemoryMatchStore {
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let found = self.inner.matches.get(&id).map(|entry| entry.clone());
        Box::pin(async move { Ok(found) })
    }

    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.matches.insert(entity.id, entity);
        Box::pin(async { Ok(()) })
    }

    fn update_match(
        &self,
        entity: MatchEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<MatchEntity>> {
        let result = match self.inner.matches.get_mut(&entity.id) {
            Some(mut current) if current.version == expected_version => {
                *current = entity.clone();
                Ok(entity)
            }
            _ => Err(StorageError::conflict(format!("match::{}", entity.id))),
        };
        Box::pin(async move { result })
    }

    fn find_lineup(
        &self,
        match_id: Uuid,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<LineupEntity>>> {
        let found = self
            .inner
            .lineups
            .get(&(match_id, team_id))
            .map(|entry| entry.clone());
        Box::pin(async move { Ok(found) })
    }

    fn save_lineup(&self, lineup: LineupEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner
            .lineups
            .insert((lineup.match_id, lineup.team_id), lineup);
        Box::pin(async { Ok(()) })
    }

    fn save_lineup_if_unlocked(
        &self,
        lineup: LineupEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = match self.inner.lineups.entry((lineup.match_id, lineup.team_id)) {
            Entry::Occupied(slot) if slot.get().locked => {
                Err(StorageError::conflict(lineup_key(lineup.match_id, lineup.team_id)))
            }
            Entry::Occupied(mut slot) => {
                slot.insert(lineup);
                Ok(())
            }
            Entry::Vacant(slot) => {
                slot.insert(lineup);
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn find_league_settings(
        &self,
        league_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<LeagueSettingsEntity>>> {
        let found = self.inner.leagues.get(&league_id).map(|entry| *entry);
        Box::pin(async move { Ok(found) })
    }

    fn save_league_settings(
        &self,
        settings: LeagueSettingsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.leagues.insert(settings.league_id, settings);
        Box::pin(async { Ok(()) })
    }

    fn find_roster(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamRosterEntity>>> {
        let found = self.inner.rosters.get(&team_id).map(|entry| entry.clone());
        Box::pin(async move { Ok(found) })
    }

    fn save_roster(&self, roster: TeamRosterEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.rosters.insert(roster.team_id, roster);
        Box::pin(async { Ok(()) })
    }

    fn list_games(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<GameRecord>>> {
        let mut games = self
            .inner
            .games
            .iter()
            .filter(|entry| entry.key().0 == match_id)
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        games.sort_by_key(|record| record.game_number);
        Box::pin(async move { Ok(games) })
    }

    fn find_game(
        &self,
        match_id: Uuid,
        game_number: u8,
    ) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let found = self
            .inner
            .games
            .get(&(match_id, game_number))
            .map(|entry| entry.clone());
        Box::pin(async move { Ok(found) })
    }

    fn insert_games(
        &self,
        match_id: Uuid,
        records: Vec<GameRecord>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = (|| {
            if let Some(existing) = records
                .iter()
                .find(|record| self.inner.games.contains_key(&(match_id, record.game_number)))
            {
                return Err(StorageError::conflict(game_key(
                    match_id,
                    existing.game_number,
                )));
            }
            for record in records {
                match self.inner.games.entry((match_id, record.game_number)) {
                    Entry::Occupied(_) => {
                        return Err(StorageError::conflict(game_key(
                            match_id,
                            record.game_number,
                        )));
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(record);
                    }
                }
            }
            Ok(())
        })();
        Box::pin(async move { result })
    }

    fn update_game(
        &self,
        record: GameRecord,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<GameRecord>> {
        let key = (record.match_id, record.game_number);
        let result = match self.inner.games.get_mut(&key) {
            Some(mut current) if current.version == expected_version => {
                *current = record.clone();
                Ok(record)
            }
            _ => Err(StorageError::conflict(game_key(
                record.match_id,
                record.game_number,
            ))),
        };
        Box::pin(async move { result })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
