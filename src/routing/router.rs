//! Database router.
//!
//! # Responsibilities
//! - Track the current article database of every supported language
//! - Pick the newest usable database per language at startup
//! - Switch a language to another database while requests are in flight
//!
//! # Design Decisions
//! - State is an immutable map behind `ArcSwap`; a switch builds a new map and
//!   swaps it in with `rcu`, so readers see either the old or the new entry
//! - A session loads one snapshot and keeps it for the whole request
//! - Databases under the article-count guard are never made current

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::StorageConfig;
use crate::observability::metrics;
use crate::routing::dbname::{DbName, Lang};
use crate::storage::{ArticleStore, DatabaseCatalog, DatabaseStats, StorageError};

/// Amount subtracted from raw article counts so coverage isn't overstated
/// relative to the upstream encyclopedia.
pub const ARTICLE_COUNT_DELTA: u64 = 10_000;

/// Databases with fewer (corrected) articles are considered broken imports.
pub const MIN_ARTICLE_COUNT: u64 = 100_000;

/// Metadata of one article database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInfo {
    pub db_name: String,
    pub lang: Lang,
    /// Raw count minus the correction delta.
    pub article_count: u64,
    /// Snapshot date, `YYYYMMDD`.
    pub db_date: String,
    pub redirects_count: u64,
    pub min_id: u64,
    pub max_id: u64,
}

impl DbInfo {
    pub fn new(name: &DbName, stats: DatabaseStats, article_count_delta: u64) -> Self {
        Self {
            db_name: name.as_str().to_owned(),
            lang: name.lang(),
            article_count: stats.article_count.saturating_sub(article_count_delta),
            db_date: name.date().to_owned(),
            redirects_count: stats.redirects_count,
            min_id: stats.min_id,
            max_id: stats.max_id,
        }
    }
}

/// A current database: its metadata plus an open query handle.
pub struct ActiveDatabase {
    pub info: DbInfo,
    pub store: Arc<dyn ArticleStore>,
}

impl std::fmt::Debug for ActiveDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveDatabase")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of the per-language current databases.
#[derive(Debug, Clone, Default)]
pub struct RouterState {
    current: HashMap<Lang, Arc<ActiveDatabase>>,
}

impl RouterState {
    pub fn current(&self, lang: Lang) -> Option<&Arc<ActiveDatabase>> {
        self.current.get(&lang)
    }

    /// Languages with a current database, in reporting order.
    pub fn available_langs(&self) -> Vec<Lang> {
        Lang::ALL
            .iter()
            .copied()
            .filter(|l| self.current.contains_key(l))
            .collect()
    }

    pub fn is_current(&self, db_name: &str) -> bool {
        self.current.values().any(|db| db.info.db_name == db_name)
    }
}

/// Reasons a database can't be made current.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("unknown database '{0}'")]
    UnknownDatabase(String),

    #[error("database '{db_name}' has only {article_count} articles, at least {min} required")]
    TooFewArticles {
        db_name: String,
        article_count: u64,
        min: u64,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Listing entry for the administrative channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseListing {
    pub info: DbInfo,
    pub current: bool,
}

/// Owner of the process-wide routing state.
pub struct DatabaseRouter {
    catalog: Arc<dyn DatabaseCatalog>,
    state: ArcSwap<RouterState>,
    min_article_count: u64,
    article_count_delta: u64,
}

impl std::fmt::Debug for DatabaseRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRouter")
            .field("state", &self.state.load())
            .field("min_article_count", &self.min_article_count)
            .finish_non_exhaustive()
    }
}

impl DatabaseRouter {
    /// Create a router with no current databases.
    pub fn new(catalog: Arc<dyn DatabaseCatalog>, config: &StorageConfig) -> Self {
        Self {
            catalog,
            state: ArcSwap::from_pointee(RouterState::default()),
            min_article_count: config.min_article_count,
            article_count_delta: config.article_count_delta,
        }
    }

    /// Create a router and select the starting database of every language.
    ///
    /// A database pinned in the config is used if it passes the guard;
    /// otherwise the newest database that passes is picked. Languages with no
    /// usable database are left unavailable.
    pub async fn initialize(
        catalog: Arc<dyn DatabaseCatalog>,
        config: &StorageConfig,
    ) -> Result<Self, StorageError> {
        let router = Self::new(catalog, config);

        let mut by_lang: HashMap<Lang, Vec<DbName>> = HashMap::new();
        for name in router.known_databases().await? {
            by_lang.entry(name.lang()).or_default().push(name);
        }

        for lang in Lang::ALL {
            let mut candidates = by_lang.remove(&lang).unwrap_or_default();
            candidates.sort_by(|a, b| b.as_str().cmp(a.as_str()));

            if let Some(pinned) = config.default_database.get(lang.as_str()) {
                match router.switch_to(pinned).await {
                    Ok(info) => {
                        tracing::info!(lang = %lang, database = %info.db_name, "Using pinned database");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(lang = %lang, database = %pinned, error = %e, "Pinned database unusable");
                    }
                }
            }

            let mut selected = false;
            for name in candidates {
                match router.switch_to(name.as_str()).await {
                    Ok(info) => {
                        tracing::info!(
                            lang = %lang,
                            database = %info.db_name,
                            articles = info.article_count,
                            "Selected database"
                        );
                        selected = true;
                        break;
                    }
                    Err(SwitchError::Storage(e)) => return Err(e),
                    Err(e) => {
                        tracing::warn!(lang = %lang, database = %name, error = %e, "Skipping database");
                    }
                }
            }
            if !selected {
                tracing::warn!(lang = %lang, "No usable database, language unavailable");
            }
        }

        Ok(router)
    }

    /// Take a consistent snapshot for one request.
    pub fn snapshot(&self) -> Arc<RouterState> {
        self.state.load_full()
    }

    pub fn current(&self, lang: Lang) -> Option<DbInfo> {
        self.state.load().current(lang).map(|db| db.info.clone())
    }

    /// Make `db_name` the current database of its language.
    pub async fn switch_to(&self, db_name: &str) -> Result<DbInfo, SwitchError> {
        let name = self
            .known_databases()
            .await?
            .into_iter()
            .find(|n| n.as_str() == db_name)
            .ok_or_else(|| SwitchError::UnknownDatabase(db_name.to_owned()))?;

        let stats = self.catalog.stats(db_name).await?;
        let info = DbInfo::new(&name, stats, self.article_count_delta);
        if info.article_count < self.min_article_count {
            return Err(SwitchError::TooFewArticles {
                db_name: info.db_name,
                article_count: info.article_count,
                min: self.min_article_count,
            });
        }

        let store = self.catalog.open(db_name).await?;
        let active = Arc::new(ActiveDatabase {
            info: info.clone(),
            store,
        });
        let lang = info.lang;
        self.state.rcu(|old| {
            let mut next = RouterState::clone(old);
            next.current.insert(lang, Arc::clone(&active));
            next
        });

        metrics::record_database_switch(lang.as_str());
        tracing::info!(lang = %lang, database = %info.db_name, "Current database switched");
        Ok(info)
    }

    /// Every known database with its live statistics, sorted by name.
    pub async fn list(&self) -> Result<Vec<DatabaseListing>, StorageError> {
        let state = self.snapshot();
        let mut listings = Vec::new();
        for name in self.known_databases().await? {
            let stats = self.catalog.stats(name.as_str()).await?;
            listings.push(DatabaseListing {
                current: state.is_current(name.as_str()),
                info: DbInfo::new(&name, stats, self.article_count_delta),
            });
        }
        listings.sort_by(|a, b| a.info.db_name.cmp(&b.info.db_name));
        Ok(listings)
    }

    async fn known_databases(&self) -> Result<Vec<DbName>, StorageError> {
        Ok(self
            .catalog
            .list_databases()
            .await?
            .iter()
            .filter_map(|n| DbName::parse(n))
            .collect())
    }
}
