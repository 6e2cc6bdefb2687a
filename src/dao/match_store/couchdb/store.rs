use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{LeagueSettingsEntity, LineupEntity, MatchEntity, TeamRosterEntity},
    storage::{StorageError, StorageResult},
};
use crate::state::game_record::GameRecord;

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchDocument, END_SUFFIX, game_doc_id, league_doc_id, lineup_doc_id,
        match_doc_id, match_games_prefix, roster_doc_id,
    },
};

/// CouchDB-backed store. Conditional game writes rely on both the record
/// version and CouchDB's `_rev`, so a concurrent writer surfaces as a conflict.
#[derive(Clone)]
pub struct CouchMatchStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchMatchStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<CouchDocument<T>>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CouchDocument<T>>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: doc_id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Write a document. With `rev = None` the write only succeeds if the
    /// document does not exist yet.
    async fn put_document<T>(&self, document: &CouchDocument<T>) -> CouchResult<()>
    where
        T: Serialize,
    {
        let response = self
            .request(Method::PUT, &document.id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: document.id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                path: document.id.clone(),
            }),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: document.id.clone(),
                status: other,
            }),
        }
    }

    /// Write `body` under `doc_id`, overwriting whatever revision is current.
    async fn upsert<T>(&self, doc_id: String, body: T) -> CouchResult<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let rev = self
            .get_document::<serde_json::Value>(&doc_id)
            .await?
            .and_then(|existing| existing.rev);
        self.put_document(&CouchDocument::new(doc_id, rev, body))
            .await
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        let mut documents = Vec::new();
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed: CouchDocument<T> =
                    from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                        path: ALL_DOCS.to_string(),
                        source,
                    })?;
                documents.push(parsed.body);
            }
        }

        Ok(documents)
    }

    async fn find_body<T>(&self, doc_id: String) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let found = self.get_document::<T>(&doc_id).await?;
        Ok(found.map(|doc| doc.body))
    }
}

impl MatchStore for CouchMatchStore {
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_body(match_doc_id(id)).await })
    }

    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(match_doc_id(entity.id), entity)
                .await
                .map_err(Into::into)
        })
    }

    fn update_match(
        &self,
        entity: MatchEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<MatchEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = match_doc_id(entity.id);
            let Some(current) = store.get_document::<MatchEntity>(&doc_id).await? else {
                return Err(StorageError::conflict(doc_id));
            };
            if current.body.version != expected_version {
                return Err(StorageError::conflict(doc_id));
            }

            store
                .put_document(&CouchDocument::new(doc_id, current.rev, entity.clone()))
                .await?;
            Ok(entity)
        })
    }

    fn find_lineup(
        &self,
        match_id: Uuid,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<LineupEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_body(lineup_doc_id(match_id, team_id)).await })
    }

    fn save_lineup(&self, lineup: LineupEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(lineup_doc_id(lineup.match_id, lineup.team_id), lineup)
                .await
                .map_err(Into::into)
        })
    }

    fn save_lineup_if_unlocked(
        &self,
        lineup: LineupEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = lineup_doc_id(lineup.match_id, lineup.team_id);
            let current = store.get_document::<LineupEntity>(&doc_id).await?;
            // the revision check rejects a lock written after this read
            let rev = match current {
                Some(existing) if existing.body.locked => {
                    return Err(StorageError::conflict(doc_id));
                }
                Some(existing) => existing.rev,
                None => None,
            };
            store
                .put_document(&CouchDocument::new(doc_id, rev, lineup))
                .await
                .map_err(Into::into)
        })
    }

    fn find_league_settings(
        &self,
        league_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<LeagueSettingsEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_body(league_doc_id(league_id)).await })
    }

    fn save_league_settings(
        &self,
        settings: LeagueSettingsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(league_doc_id(settings.league_id), settings)
                .await
                .map_err(Into::into)
        })
    }

    fn find_roster(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TeamRosterEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_body(roster_doc_id(team_id)).await })
    }

    fn save_roster(&self, roster: TeamRosterEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(roster_doc_id(roster.team_id), roster)
                .await
                .map_err(Into::into)
        })
    }

    fn list_games(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<GameRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_documents::<GameRecord>(&match_games_prefix(match_id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_game(
        &self,
        match_id: Uuid,
        game_number: u8,
    ) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let store = self.clone();
        Box::pin(async move { store.find_body(game_doc_id(match_id, game_number)).await })
    }

    fn insert_games(
        &self,
        match_id: Uuid,
        records: Vec<GameRecord>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            for record in records {
                let doc_id = game_doc_id(match_id, record.game_number);
                store
                    .put_document(&CouchDocument::new(doc_id, None, record))
                    .await?;
            }
            Ok(())
        })
    }

    fn update_game(
        &self,
        record: GameRecord,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<GameRecord>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = game_doc_id(record.match_id, record.game_number);
            let Some(current) = store.get_document::<GameRecord>(&doc_id).await? else {
                return Err(StorageError::conflict(doc_id));
            };
            if current.body.version != expected_version {
                return Err(StorageError::conflict(doc_id));
            }

            store
                .put_document(&CouchDocument::new(doc_id, current.rev, record.clone()))
                .await?;
            Ok(record)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
