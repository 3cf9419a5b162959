//! In-memory storage backend.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;

use crate::storage::{
    Article, ArticleStore, DatabaseCatalog, DatabaseStats, NewUser, RequestLog, RequestLogEntry,
    StorageError, StorageResult, UserId, UserRecord, UserStore, LOOKUP_WINDOW,
};

/// Redirect chains longer than this are treated as broken.
const MAX_REDIRECT_DEPTH: usize = 16;

/// Cap on reverse links kept per article.
const REVERSE_LINK_LIMIT: usize = 200;

/// One article database held in memory.
#[derive(Debug, Default)]
pub struct MemoryArticleStore {
    articles: BTreeMap<u64, Article>,
    /// Lowercased title -> article id.
    by_title: HashMap<String, u64>,
    /// Lowercased source title -> target title.
    redirects: HashMap<String, String>,
    reverse_links: HashMap<u64, Vec<String>>,
}

impl MemoryArticleStore {
    /// Build a store and its reverse-link index.
    pub fn new(articles: Vec<Article>, redirects: Vec<(String, String)>) -> Self {
        let mut store = Self::default();
        for article in articles {
            store.by_title.insert(article.title.to_lowercase(), article.id);
            store.articles.insert(article.id, article);
        }
        for (from, to) in redirects {
            store.redirects.insert(from.to_lowercase(), to);
        }
        store.build_reverse_links();
        store
    }

    fn build_reverse_links(&mut self) {
        let mut index: HashMap<u64, Vec<String>> = HashMap::new();
        for article in self.articles.values() {
            for target in wiki_links(&article.body) {
                let Some(target_id) = self.resolve_title(target) else {
                    continue;
                };
                if target_id == article.id {
                    continue;
                }
                let links = index.entry(target_id).or_default();
                if links.len() < REVERSE_LINK_LIMIT && !links.contains(&article.title) {
                    links.push(article.title.clone());
                }
            }
        }
        self.reverse_links = index;
    }

    fn resolve_title(&self, title: &str) -> Option<u64> {
        let mut key = title.trim().to_lowercase();
        for _ in 0..=MAX_REDIRECT_DEPTH {
            if let Some(id) = self.by_title.get(&key) {
                return Some(*id);
            }
            key = self.redirects.get(&key)?.to_lowercase();
        }
        tracing::debug!(title = %title, "Redirect chain too long or circular");
        None
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            article_count: self.articles.len() as u64,
            redirects_count: self.redirects.len() as u64,
            min_id: self.articles.keys().next().copied().unwrap_or_default(),
            max_id: self.articles.keys().next_back().copied().unwrap_or_default(),
        }
    }
}

/// Targets of `[[Target]]` and `[[Target|label]]` links in a body.
fn wiki_links(body: &str) -> impl Iterator<Item = &str> {
    body.split("[[").skip(1).filter_map(|chunk| {
        let inner = &chunk[..chunk.find("]]")?];
        let target = inner.split('|').next().unwrap_or(inner).trim();
        (!target.is_empty()).then_some(target)
    })
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn find_article(&self, title: &str) -> StorageResult<Option<Article>> {
        Ok(self
            .resolve_title(title)
            .and_then(|id| self.articles.get(&id))
            .cloned())
    }

    async fn search(&self, term: &str, limit: usize) -> StorageResult<Vec<String>> {
        let words: Vec<String> = term
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let mut title_hits = Vec::new();
        let mut body_hits = Vec::new();
        for article in self.articles.values() {
            let title = article.title.to_lowercase();
            let body = article.body.to_lowercase();
            if words.iter().all(|w| title.contains(w.as_str())) {
                title_hits.push(article.title.clone());
            } else if words
                .iter()
                .all(|w| title.contains(w.as_str()) || body.contains(w.as_str()))
            {
                body_hits.push(article.title.clone());
            }
        }
        title_hits.sort();
        body_hits.sort();
        title_hits.extend(body_hits);
        title_hits.truncate(limit);
        Ok(title_hits)
    }

    async fn random_article(&self) -> StorageResult<Option<Article>> {
        let stats = self.stats();
        if self.articles.is_empty() {
            return Ok(None);
        }
        let pick = rand::thread_rng().gen_range(stats.min_id..=stats.max_id);
        Ok(self.articles.range(pick..).next().map(|(_, a)| a.clone()))
    }

    async fn reverse_links(&self, article_id: u64) -> StorageResult<Vec<String>> {
        Ok(self
            .reverse_links
            .get(&article_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// All article databases, keyed by database name.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    databases: Arc<DashMap<String, Arc<MemoryArticleStore>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, db_name: impl Into<String>, store: MemoryArticleStore) {
        self.databases.insert(db_name.into(), Arc::new(store));
    }

    pub fn remove(&self, db_name: &str) {
        self.databases.remove(db_name);
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    fn get(&self, db_name: &str) -> StorageResult<Arc<MemoryArticleStore>> {
        self.databases
            .get(db_name)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| StorageError::UnknownDatabase(db_name.to_owned()))
    }
}

#[async_trait]
impl DatabaseCatalog for MemoryCatalog {
    async fn list_databases(&self) -> StorageResult<Vec<String>> {
        Ok(self.databases.iter().map(|r| r.key().clone()).collect())
    }

    async fn stats(&self, db_name: &str) -> StorageResult<DatabaseStats> {
        Ok(self.get(db_name)?.stats())
    }

    async fn open(&self, db_name: &str) -> StorageResult<Arc<dyn ArticleStore>> {
        let store: Arc<dyn ArticleStore> = self.get(db_name)?;
        Ok(store)
    }
}

/// User table held in memory.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<UserId, UserRecord>,
    /// Cookie -> owner; the entry API makes insert-if-absent atomic.
    cookies: DashMap<String, UserId>,
    /// Registration code -> the user it is bound to, if any.
    reg_codes: DashMap<String, Option<UserId>>,
    next_id: AtomicU64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// Make `reg_code` a valid registration code.
    pub fn add_reg_code(&self, reg_code: impl Into<String>) {
        self.reg_codes.entry(reg_code.into()).or_insert(None);
    }

    /// Every user row, oldest first.
    pub fn users(&self) -> Vec<UserRecord> {
        let mut users: Vec<UserRecord> = self.users.iter().map(|r| r.value().clone()).collect();
        users.sort_by_key(|u| u.user_id);
        users
    }

    /// Put back a row saved with [`users`](Self::users), including its cookie
    /// and registration code binding.
    pub fn restore(&self, user: UserRecord) -> StorageResult<()> {
        if let Some(owner) = self.cookies.get(&user.cookie) {
            if *owner.value() != user.user_id {
                return Err(StorageError::Corrupt(format!(
                    "cookie of user {} already belongs to user {}",
                    user.user_id,
                    owner.value()
                )));
            }
        }
        self.cookies.insert(user.cookie.clone(), user.user_id);
        if let Some(code) = &user.reg_code {
            self.reg_codes.insert(code.clone(), Some(user.user_id));
        }
        self.next_id.fetch_max(user.user_id.0 + 1, Ordering::Relaxed);
        self.users.insert(user.user_id, user);
        Ok(())
    }

    /// Mark a user disabled (or re-enable them).
    pub fn set_disabled(&self, user_id: UserId, disabled: bool) {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.disabled = disabled;
        }
    }

    pub fn get(&self, user_id: UserId) -> Option<UserRecord> {
        self.users.get(&user_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn find(&self, pred: impl Fn(&UserRecord) -> bool) -> Option<UserRecord> {
        self.users
            .iter()
            .filter(|r| pred(r.value()))
            .min_by_key(|r| *r.key())
            .map(|r| r.value().clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_cookie(&self, cookie: &str) -> StorageResult<Option<UserRecord>> {
        Ok(self
            .cookies
            .get(cookie)
            .and_then(|id| self.get(*id.value())))
    }

    async fn find_by_reg_code(&self, reg_code: &str) -> StorageResult<Option<UserRecord>> {
        let owner = self.reg_codes.get(reg_code).and_then(|r| *r.value());
        Ok(owner.and_then(|user_id| self.get(user_id)))
    }

    async fn find_by_device_info(&self, token: &str) -> StorageResult<Option<UserRecord>> {
        Ok(self.find(|u| u.device_info.as_deref() == Some(token)))
    }

    async fn cookie_exists(&self, cookie: &str) -> StorageResult<bool> {
        Ok(self.cookies.contains_key(cookie))
    }

    async fn create_user(&self, user: NewUser) -> StorageResult<Option<UserRecord>> {
        match self.cookies.entry(user.cookie.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let user_id = UserId(self.next_id.fetch_add(1, Ordering::Relaxed));
                let record = UserRecord {
                    user_id,
                    cookie: user.cookie,
                    device_info: Some(user.device_info),
                    user_name: user.user_name,
                    reg_code: None,
                    disabled: false,
                };
                self.users.insert(user_id, record.clone());
                slot.insert(user_id);
                Ok(Some(record))
            }
        }
    }

    async fn is_valid_reg_code(&self, reg_code: &str) -> StorageResult<bool> {
        Ok(self.reg_codes.contains_key(reg_code))
    }

    async fn mark_registered(&self, user_id: UserId, reg_code: &str) -> StorageResult<bool> {
        if !self.users.contains_key(&user_id) {
            return Err(StorageError::Corrupt(format!("no user {user_id}")));
        }
        {
            // The shard lock on the code makes check-and-bind atomic.
            let Some(mut owner) = self.reg_codes.get_mut(reg_code) else {
                return Ok(false);
            };
            if owner.is_some_and(|bound| bound != user_id) {
                return Ok(false);
            }
            *owner = Some(user_id);
        }
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.reg_code = Some(reg_code.to_owned());
        }
        Ok(true)
    }
}

/// Request history held in memory.
///
/// Only entries inside the retention window are kept. Older lookups survive
/// as per-user lifetime totals.
#[derive(Debug)]
pub struct MemoryRequestLog {
    retention: Duration,
    recent: Mutex<VecDeque<RequestLogEntry>>,
    lifetime: DashMap<UserId, u64>,
}

impl Default for MemoryRequestLog {
    fn default() -> Self {
        Self::with_retention(LOOKUP_WINDOW)
    }
}

impl MemoryRequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            retention,
            recent: Mutex::new(VecDeque::new()),
            lifetime: DashMap::new(),
        }
    }

    /// Entries still inside the retention window, oldest first.
    pub fn entries(&self) -> Vec<RequestLogEntry> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Lifetime lookup totals, by user id.
    pub fn lookup_totals(&self) -> Vec<(UserId, u64)> {
        let mut totals: Vec<(UserId, u64)> =
            self.lifetime.iter().map(|r| (*r.key(), *r.value())).collect();
        totals.sort();
        totals
    }

    /// Put back state saved with [`lookup_totals`](Self::lookup_totals) and
    /// [`entries`](Self::entries). Totals already include the entries.
    pub fn restore(&self, totals: Vec<(UserId, u64)>, entries: Vec<RequestLogEntry>) {
        for (user_id, count) in totals {
            *self.lifetime.entry(user_id).or_insert(0) += count;
        }
        let cutoff = self.cutoff(SystemTime::now());
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.extend(entries.into_iter().filter(|e| e.timestamp >= cutoff));
        recent.make_contiguous().sort_by_key(|e| e.timestamp);
    }

    fn cutoff(&self, now: SystemTime) -> SystemTime {
        now.checked_sub(self.retention).unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

#[async_trait]
impl RequestLog for MemoryRequestLog {
    async fn record(&self, entry: RequestLogEntry) -> StorageResult<()> {
        if let (Some(user_id), Some(_)) = (entry.user_id, &entry.requested_article) {
            *self.lifetime.entry(user_id).or_insert(0) += 1;
        }

        let cutoff = self.cutoff(SystemTime::now());
        let mut recent = self
            .recent
            .lock()
            .map_err(|_| StorageError::Unavailable("request log lock poisoned".into()))?;
        while recent.front().is_some_and(|e| e.timestamp < cutoff) {
            recent.pop_front();
        }
        if entry.timestamp >= cutoff {
            recent.push_back(entry);
        }
        Ok(())
    }

    async fn count_lookups(&self, user_id: UserId, since: Option<SystemTime>) -> StorageResult<u64> {
        let Some(since) = since else {
            return Ok(self.lifetime.get(&user_id).map_or(0, |r| *r.value()));
        };
        let recent = self
            .recent
            .lock()
            .map_err(|_| StorageError::Unavailable("request log lock poisoned".into()))?;
        let count = recent
            .iter()
            .filter(|e| e.user_id == Some(user_id) && e.requested_article.is_some())
            .filter(|e| e.timestamp >= since)
            .count();
        Ok(count as u64)
    }
}
