//! Fixture loading for stores that start empty.

use std::{fs, path::Path, time::SystemTime};

use thiserror::Error;
use tracing::info;

use crate::{
    dao::{match_store::MatchStore, models::MatchEntity, storage::StorageError},
    dto::seed::SeedFile,
    error::ServiceError,
    services::lineup_service::prepare_lineup,
};

/// Reasons a fixture file could not be loaded.
#[derive(Debug, Error)]
pub enum SeedError {
    /// File could not be read.
    #[error("failed to read seed file `{path}`")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// File is not a valid fixture document.
    #[error("failed to parse seed file")]
    Parse(#[from] serde_json::Error),
    /// A lineup in the file was rejected.
    #[error("invalid seed lineup")]
    Lineup(#[from] ServiceError),
    /// Store rejected a write.
    #[error("failed to store seed data")]
    Storage(#[from] StorageError),
}

/// Counts of what a seed load wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub leagues: usize,
    pub rosters: usize,
    pub matches: usize,
    pub lineups: usize,
}

/// Read `path` and load it into `store`.
pub async fn load_file(store: &dyn MatchStore, path: &Path) -> Result<SeedSummary, SeedError> {
    let contents = fs::read_to_string(path).map_err(|source| SeedError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let seed = serde_json::from_str::<SeedFile>(&contents)?;
    let summary = load(store, seed).await?;
    info!(
        path = %path.display(),
        leagues = summary.leagues,
        rosters = summary.rosters,
        matches = summary.matches,
        lineups = summary.lineups,
        "seed data loaded"
    );
    Ok(summary)
}

/// Write every fixture of `seed` into `store`. Lineups go through the same
/// validation as lineups handed over at runtime.
pub async fn load(store: &dyn MatchStore, seed: SeedFile) -> Result<SeedSummary, SeedError> {
    let mut summary = SeedSummary::default();

    for league in seed.leagues {
        store.save_league_settings(league).await?;
        summary.leagues += 1;
    }
    for roster in seed.rosters {
        store.save_roster(roster).await?;
        summary.rosters += 1;
    }

    for seeded in seed.matches {
        store
            .save_match(MatchEntity {
                id: seeded.id,
                league_id: seeded.league_id,
                home_team_id: seeded.home_team_id,
                away_team_id: seeded.away_team_id,
                format: seeded.format,
                status: seeded.status,
                home_games_won: 0,
                away_games_won: 0,
                thresholds: None,
                result: None,
                updated_at: SystemTime::now(),
                version: 0,
            })
            .await?;
        summary.matches += 1;

        for lineup in seeded.lineups {
            let entity = prepare_lineup(store, seeded.id, lineup.team_id, lineup.lineup).await?;
            store.save_lineup_if_unlocked(entity).await?;
            summary.lineups += 1;
        }
    }

    Ok(summary)
}
