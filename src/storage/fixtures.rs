//! Loading the in-memory backend from a data directory.
//!
//! Layout:
//! ```text
//! <data_dir>/ipedia_20040707.json      one file per article database
//! <data_dir>/ipedia_de_20040801.json
//! <data_dir>/registration_codes.json   ["1234...", ...] (optional)
//! <data_dir>/server_state.json         users and lookup history (written on shutdown)
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::routing::dbname::DbName;
use crate::storage::memory::{
    MemoryArticleStore, MemoryCatalog, MemoryRequestLog, MemoryUserStore,
};
use crate::storage::{Article, RequestLogEntry, StorageResult, UserId, UserRecord};

const REG_CODES_FILE: &str = "registration_codes.json";
const STATE_FILE: &str = "server_state.json";

/// On-disk form of one article database.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseFixture {
    pub articles: Vec<ArticleFixture>,
    pub redirects: Vec<RedirectFixture>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArticleFixture {
    pub id: u64,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedirectFixture {
    pub from: String,
    pub to: String,
}

impl DatabaseFixture {
    pub fn into_store(self) -> MemoryArticleStore {
        let articles = self
            .articles
            .into_iter()
            .map(|a| Article {
                id: a.id,
                title: a.title,
                body: a.body,
            })
            .collect();
        let redirects = self.redirects.into_iter().map(|r| (r.from, r.to)).collect();
        MemoryArticleStore::new(articles, redirects)
    }
}

/// Load every `*.json` file named like an article database into `catalog`.
/// Returns the number of databases loaded.
pub fn load_databases(dir: &Path, catalog: &MemoryCatalog) -> StorageResult<usize> {
    let mut loaded = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if DbName::parse(stem).is_none() {
            continue;
        }

        let content = fs::read_to_string(&path)?;
        let fixture: DatabaseFixture = serde_json::from_str(&content)?;
        let store = fixture.into_store();
        tracing::info!(
            database = %stem,
            articles = store.stats().article_count,
            redirects = store.stats().redirects_count,
            "Loaded article database"
        );
        catalog.insert(stem, store);
        loaded += 1;
    }
    Ok(loaded)
}

/// Load valid registration codes, if the directory has any.
pub fn load_reg_codes(dir: &Path, users: &MemoryUserStore) -> StorageResult<usize> {
    let path = dir.join(REG_CODES_FILE);
    if !path.exists() {
        return Ok(0);
    }
    let content = fs::read_to_string(&path)?;
    let codes: Vec<String> = serde_json::from_str(&content)?;
    let count = codes.len();
    for code in codes {
        users.add_reg_code(code);
    }
    tracing::info!(count, "Loaded registration codes");
    Ok(count)
}

/// On-disk form of the user table and request history.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StateFixture {
    pub users: Vec<UserRecord>,
    pub lookup_totals: Vec<LookupTotal>,
    pub recent_requests: Vec<RequestLogEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct LookupTotal {
    pub user_id: UserId,
    pub lookups: u64,
}

/// Restore users and request history saved by [`save_state`]. Returns false
/// if there is no state file yet.
pub fn load_state(
    dir: &Path,
    users: &MemoryUserStore,
    request_log: &MemoryRequestLog,
) -> StorageResult<bool> {
    let path = dir.join(STATE_FILE);
    if !path.exists() {
        return Ok(false);
    }
    let content = fs::read_to_string(&path)?;
    let state: StateFixture = serde_json::from_str(&content)?;
    let user_count = state.users.len();
    for user in state.users {
        users.restore(user)?;
    }
    let totals = state
        .lookup_totals
        .into_iter()
        .map(|t| (t.user_id, t.lookups))
        .collect();
    request_log.restore(totals, state.recent_requests);
    tracing::info!(users = user_count, "Loaded server state");
    Ok(true)
}

/// Write users and request history to the state file. The file is replaced
/// atomically so a crash mid-write keeps the previous state.
pub fn save_state(
    dir: &Path,
    users: &MemoryUserStore,
    request_log: &MemoryRequestLog,
) -> StorageResult<()> {
    let state = StateFixture {
        users: users.users(),
        lookup_totals: request_log
            .lookup_totals()
            .into_iter()
            .map(|(user_id, lookups)| LookupTotal { user_id, lookups })
            .collect(),
        recent_requests: request_log.entries(),
    };
    let path = dir.join(STATE_FILE);
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(&state)?)?;
    fs::rename(&tmp, &path)?;
    tracing::info!(users = state.users.len(), path = %path.display(), "Saved server state");
    Ok(())
}
