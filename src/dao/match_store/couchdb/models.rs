use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const MATCH_PREFIX: &str = "match::";
pub const LINEUP_PREFIX: &str = "lineup::";
pub const LEAGUE_PREFIX: &str = "league::";
pub const ROSTER_PREFIX: &str = "roster::";
pub const GAME_PREFIX: &str = "game::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Any stored entity wrapped with CouchDB's identity and revision fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> CouchDocument<T> {
    pub fn new(id: String, rev: Option<String>, body: T) -> Self {
        Self { id, rev, body }
    }
}

pub fn match_doc_id(id: Uuid) -> String {
    format!("{}{}", MATCH_PREFIX, id)
}

pub fn lineup_doc_id(match_id: Uuid, team_id: Uuid) -> String {
    format!("{}{}:{}", LINEUP_PREFIX, match_id, team_id)
}

pub fn league_doc_id(league_id: Uuid) -> String {
    format!("{}{}", LEAGUE_PREFIX, league_id)
}

pub fn roster_doc_id(team_id: Uuid) -> String {
    format!("{}{}", ROSTER_PREFIX, team_id)
}

/// Prefix shared by every game of a match.
pub fn match_games_prefix(match_id: Uuid) -> String {
    format!("{}{}:", GAME_PREFIX, match_id)
}

/// Game numbers are zero padded so `_all_docs` returns them in play order.
pub fn game_doc_id(match_id: Uuid, game_number: u8) -> String {
    format!("{}{:02}", match_games_prefix(match_id), game_number)
}
