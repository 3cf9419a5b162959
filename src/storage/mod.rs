//! Storage layer abstractions.
//!
//! The server treats the article databases, the user table and the request
//! history as external services. Everything it needs from them goes through
//! the traits below; `memory` provides an in-process implementation backed
//! by `fixtures` loaded from disk.

pub mod fixtures;
pub mod memory;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Window of the daily lookup allowance. `count_lookups` must be exact for
/// any `since` inside it.
pub const LOOKUP_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be reached or refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// No database with that name exists.
    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    /// Stored data failed a consistency check.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// User identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<UserId> for u64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An article as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: u64,
    pub title: String,
    pub body: String,
}

/// Raw statistics of one article database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatabaseStats {
    pub article_count: u64,
    pub redirects_count: u64,
    pub min_id: u64,
    pub max_id: u64,
}

/// Queries against a single article database.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Exact title lookup (case-insensitive), following redirects.
    async fn find_article(&self, title: &str) -> StorageResult<Option<Article>>;

    /// Full-text search, returning at most `limit` article titles.
    async fn search(&self, term: &str, limit: usize) -> StorageResult<Vec<String>>;

    /// Pick an arbitrary article. `None` means the pick landed on a hole and
    /// the caller may retry.
    async fn random_article(&self) -> StorageResult<Option<Article>>;

    /// Titles of the articles linking to `article_id`.
    async fn reverse_links(&self, article_id: u64) -> StorageResult<Vec<String>>;
}

/// The set of article databases known to the server.
#[async_trait]
pub trait DatabaseCatalog: Send + Sync {
    /// Names of all databases, in no particular order.
    async fn list_databases(&self) -> StorageResult<Vec<String>>;

    /// Live statistics of `db_name`.
    async fn stats(&self, db_name: &str) -> StorageResult<DatabaseStats>;

    /// Open a query handle on `db_name`.
    async fn open(&self, db_name: &str) -> StorageResult<Arc<dyn ArticleStore>>;
}

/// A row of the user table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub cookie: String,
    pub device_info: Option<String>,
    pub user_name: Option<String>,
    pub reg_code: Option<String>,
    pub disabled: bool,
}

impl UserRecord {
    pub fn is_registered(&self) -> bool {
        self.reg_code.is_some()
    }
}

/// Values for a user row about to be created.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub cookie: String,
    pub device_info: String,
    pub user_name: Option<String>,
}

/// Persistent user identities.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_cookie(&self, cookie: &str) -> StorageResult<Option<UserRecord>>;

    async fn find_by_reg_code(&self, reg_code: &str) -> StorageResult<Option<UserRecord>>;

    /// Oldest user created with exactly this device info token.
    async fn find_by_device_info(&self, token: &str) -> StorageResult<Option<UserRecord>>;

    async fn cookie_exists(&self, cookie: &str) -> StorageResult<bool>;

    /// Insert a user. Returns `None` if another row took the cookie first.
    async fn create_user(&self, user: NewUser) -> StorageResult<Option<UserRecord>>;

    /// Whether `reg_code` is a code that was sold.
    async fn is_valid_reg_code(&self, reg_code: &str) -> StorageResult<bool>;

    /// Bind `reg_code` to the user, making them registered. A code binds to
    /// one user only: returns false if it is unknown or already bound to
    /// someone else. Binding again to the same user succeeds.
    async fn mark_registered(&self, user_id: UserId, reg_code: &str) -> StorageResult<bool>;
}

/// One line of request history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RequestLogEntry {
    pub client_ip: Option<IpAddr>,
    pub transaction_id: Option<String>,
    pub has_get_cookie: bool,
    pub user_id: Option<UserId>,
    pub has_registration_code: bool,
    /// Title asked for with `Get-Article`.
    pub requested_article: Option<String>,
    /// Title actually returned (after redirects, or the random pick).
    pub article_title: Option<String>,
    pub error: Option<u32>,
    pub timestamp: SystemTime,
}

/// Request history, also the source of lookup counts.
#[async_trait]
pub trait RequestLog: Send + Sync {
    async fn record(&self, entry: RequestLogEntry) -> StorageResult<()>;

    /// Number of logged `Get-Article` requests by `user_id`, optionally only
    /// those at or after `since`. Random-article requests never count.
    async fn count_lookups(&self, user_id: UserId, since: Option<SystemTime>) -> StorageResult<u64>;
}

/// Handles to every store, shared by all sessions.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn DatabaseCatalog>,
    pub users: Arc<dyn UserStore>,
    pub request_log: Arc<dyn RequestLog>,
}

impl fmt::Debug for Stores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
