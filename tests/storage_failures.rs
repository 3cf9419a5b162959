//! Backend failures surface as `serverFailure`, never as dropped connections.

mod common;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use ipedia_server::protocol::{FieldName, ResponseField, ServerError};
use ipedia_server::storage::memory::{MemoryCatalog, MemoryUserStore};
use ipedia_server::storage::{
    Article, ArticleStore, DatabaseCatalog, DatabaseStats, NewUser, RequestLog, RequestLogEntry,
    StorageError, StorageResult, Stores, UserId, UserRecord, UserStore,
};

use common::*;

/// A request history whose backend is down.
struct BrokenRequestLog;

#[async_trait]
impl RequestLog for BrokenRequestLog {
    async fn record(&self, _entry: RequestLogEntry) -> StorageResult<()> {
        Err(StorageError::Unavailable("request log offline".into()))
    }

    async fn count_lookups(&self, _user_id: UserId, _since: Option<SystemTime>) -> StorageResult<u64> {
        Err(StorageError::Unavailable("request log offline".into()))
    }
}

fn offline<T>(what: &str) -> StorageResult<T> {
    Err(StorageError::Unavailable(format!("{what} offline")))
}

/// An article database that accepts connections but fails every query.
struct BrokenArticles;

#[async_trait]
impl ArticleStore for BrokenArticles {
    async fn find_article(&self, _title: &str) -> StorageResult<Option<Article>> {
        offline("articles")
    }

    async fn search(&self, _term: &str, _limit: usize) -> StorageResult<Vec<String>> {
        offline("articles")
    }

    async fn random_article(&self) -> StorageResult<Option<Article>> {
        offline("articles")
    }

    async fn reverse_links(&self, _article_id: u64) -> StorageResult<Vec<String>> {
        offline("articles")
    }
}

/// Lists and counts like the memory catalog, but hands out broken databases.
struct BrokenCatalog(MemoryCatalog);

#[async_trait]
impl DatabaseCatalog for BrokenCatalog {
    async fn list_databases(&self) -> StorageResult<Vec<String>> {
        self.0.list_databases().await
    }

    async fn stats(&self, db_name: &str) -> StorageResult<DatabaseStats> {
        self.0.stats(db_name).await
    }

    async fn open(&self, _db_name: &str) -> StorageResult<Arc<dyn ArticleStore>> {
        Ok(Arc::new(BrokenArticles))
    }
}

/// A user table that still answers cookie lookups and fails everything else.
struct BrokenUsers(Arc<MemoryUserStore>);

#[async_trait]
impl UserStore for BrokenUsers {
    async fn find_by_cookie(&self, cookie: &str) -> StorageResult<Option<UserRecord>> {
        self.0.find_by_cookie(cookie).await
    }

    async fn find_by_reg_code(&self, _reg_code: &str) -> StorageResult<Option<UserRecord>> {
        offline("users")
    }

    async fn find_by_device_info(&self, _token: &str) -> StorageResult<Option<UserRecord>> {
        offline("users")
    }

    async fn cookie_exists(&self, _cookie: &str) -> StorageResult<bool> {
        offline("users")
    }

    async fn create_user(&self, _user: NewUser) -> StorageResult<Option<UserRecord>> {
        offline("users")
    }

    async fn is_valid_reg_code(&self, _reg_code: &str) -> StorageResult<bool> {
        offline("users")
    }

    async fn mark_registered(&self, _user_id: UserId, _reg_code: &str) -> StorageResult<bool> {
        offline("users")
    }
}

const SEEDED_COOKIE: &str = "0123456789abcdef0123456789abcdef";

async fn server_with_broken_log() -> TestServer {
    let memory = memory_stores();
    let stores = Stores {
        request_log: Arc::new(BrokenRequestLog),
        ..memory.stores()
    };
    TestServer::start_on(test_config(), memory, stores).await
}

#[tokio::test]
async fn failed_logging_does_not_affect_the_response() {
    let server = server_with_broken_log().await;

    let cookie = server.cookie_for(UNIQUE_DEVICE).await;
    let response = server
        .with_cookie(&cookie, &[(FieldName::GetArticleCount, None)])
        .await;
    assert_eq!(response.error(), None);
    assert_eq!(response.text(ResponseField::ArticleCount), Some("5"));

    // Unlimited lookups never consult the history.
    let response = server
        .with_cookie(&cookie, &[(FieldName::GetRandomArticle, None)])
        .await;
    assert_eq!(response.error(), None);

    server.stop().await;
}

#[tokio::test]
async fn failed_lookup_count_is_a_server_failure() {
    let server = server_with_broken_log().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let response = server
        .with_cookie(&cookie, &[(FieldName::GetArticle, Some("Seattle"))])
        .await;
    assert_eq!(response.error(), Some(ServerError::ServerFailure));
    assert!(!response.has(ResponseField::ArticleBody));

    server.stop().await;
}

#[tokio::test]
async fn failed_article_queries_are_server_failures() {
    let memory = memory_stores();
    let stores = Stores {
        catalog: Arc::new(BrokenCatalog(memory.catalog.clone())),
        ..memory.stores()
    };
    let server = TestServer::start_on(test_config(), memory, stores).await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    // Counts come from the catalog, which still works.
    let response = server
        .with_cookie(&cookie, &[(FieldName::GetArticleCount, None)])
        .await;
    assert_eq!(response.error(), None);

    for fields in [
        [(FieldName::GetArticle, Some("Seattle"))],
        [(FieldName::Search, Some("Seattle"))],
        [(FieldName::GetRandomArticle, None)],
    ] {
        let response = server.with_cookie(&cookie, &fields).await;
        assert_eq!(response.error(), Some(ServerError::ServerFailure), "{fields:?}");
        assert!(!response.has(ResponseField::ArticleBody));
    }

    server.stop().await;
}

#[tokio::test]
async fn failed_user_queries_are_server_failures() {
    let memory = memory_stores();
    memory
        .users
        .create_user(NewUser {
            cookie: SEEDED_COOKIE.into(),
            device_info: UNIQUE_DEVICE.into(),
            user_name: None,
        })
        .await
        .unwrap()
        .unwrap();
    let stores = Stores {
        users: Arc::new(BrokenUsers(Arc::clone(&memory.users))),
        ..memory.stores()
    };
    let server = TestServer::start_on(test_config(), memory, stores).await;

    let response = server
        .request(&[(FieldName::GetCookie, Some(UNIQUE_DEVICE))])
        .await;
    assert_eq!(response.error(), Some(ServerError::ServerFailure));
    assert!(!response.has(ResponseField::Cookie));

    let response = server
        .with_cookie(
            SEEDED_COOKIE,
            &[(FieldName::VerifyRegistrationCode, Some(VALID_REG_CODE))],
        )
        .await;
    assert_eq!(response.error(), Some(ServerError::ServerFailure));
    assert!(!response.has(ResponseField::RegistrationCodeValid));

    // Cookie lookups still work, so plain requests are answered.
    let response = server
        .with_cookie(SEEDED_COOKIE, &[(FieldName::GetArticleCount, None)])
        .await;
    assert_eq!(response.error(), None);

    server.stop().await;
}
