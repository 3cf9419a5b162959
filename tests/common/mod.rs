//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use ipedia_server::client::{AdminClient, IpediaClient};
use ipedia_server::config::ServerConfig;
use ipedia_server::lifecycle::{self, MemoryStores, RunningServer};
use ipedia_server::protocol::{DecodedResponse, FieldName, ResponseField};
use ipedia_server::storage::memory::MemoryArticleStore;
use ipedia_server::storage::{Article, Stores};

pub const VALID_REG_CODE: &str = "2345";
pub const UNIQUE_DEVICE: &str = "PN50616C6D204F5320456D756C61746F72:PL3030";
pub const NON_UNIQUE_DEVICE: &str = "OC70616C6D:OD00000000:PL3030";
pub const EXAMPLE_DEVICE: &str = "HS50616C6D204F5320456D756C61746F72:OC70616C6D:OD00000000:PL3030";

/// Newest English database.
pub const EN_CURRENT: &str = "ipedia_20041001";
/// Older English database.
pub const EN_OLD: &str = "ipedia_20040707";
/// English database under the test article-count guard.
pub const EN_SMALL: &str = "ipedia_20050101";

fn article(id: u64, title: &str, body: &str) -> Article {
    Article {
        id,
        title: title.into(),
        body: body.into(),
    }
}

fn numbered(prefix: &str, count: u64) -> MemoryArticleStore {
    let articles = (1..=count)
        .map(|id| article(id, &format!("{prefix} {id}"), "Filler."))
        .collect();
    MemoryArticleStore::new(articles, Vec::new())
}

/// The English database most tests query.
pub fn seattle_database() -> MemoryArticleStore {
    MemoryArticleStore::new(
        vec![
            article(
                1,
                "Seattle",
                "Seattle is a city in [[Washington (state)|Washington]]. \
                 This encyclopedia has {{NUMBEROFARTICLES}} articles.",
            ),
            article(2, "Washington (state)", "A state. Its largest city is [[Seattle]]."),
            article(3, "Poland", "A country in Europe."),
            article(4, "Brazil", "A country in South America, far from [[Seattle]]."),
            article(5, "Comedy", "A genre of humour."),
        ],
        vec![("Emerald City".into(), "Seattle".into())],
    )
}

/// Stores with every test database and a valid registration code.
pub fn memory_stores() -> MemoryStores {
    let stores = MemoryStores::new();
    stores.catalog.insert(EN_OLD, numbered("Old", 4));
    stores.catalog.insert(EN_CURRENT, seattle_database());
    stores.catalog.insert(EN_SMALL, numbered("Small", 1));
    stores.catalog.insert("ipedia_de_20040801", numbered("Artikel", 3));
    stores.catalog.insert("ipedia_fr_20040801", numbered("Article", 6));
    stores.users.add_reg_code(VALID_REG_CODE);
    stores
}

/// Config for a test server on ephemeral ports with a 3-article guard.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.admin.bind_address = "127.0.0.1:0".into();
    config.storage.min_article_count = 3;
    config.storage.article_count_delta = 0;
    config.protocol.request_timeout_secs = 5;
    config
}

pub struct TestServer {
    pub server: RunningServer,
    pub stores: MemoryStores,
    pub client: IpediaClient,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(test_config()).await
    }

    pub async fn start_with(config: ServerConfig) -> Self {
        let stores = memory_stores();
        let server = Self::boot(config, stores.stores()).await;
        let client = IpediaClient::new(server.client_addr());
        Self {
            server,
            stores,
            client,
        }
    }

    /// Start on `backend`, which may replace some of the `memory` stores.
    pub async fn start_on(config: ServerConfig, memory: MemoryStores, backend: Stores) -> Self {
        let server = Self::boot(config, backend).await;
        let client = IpediaClient::new(server.client_addr());
        Self {
            server,
            stores: memory,
            client,
        }
    }

    async fn boot(config: ServerConfig, stores: Stores) -> RunningServer {
        lifecycle::start(config, stores).await.unwrap()
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.client_addr()
    }

    pub async fn admin(&self) -> AdminClient {
        AdminClient::connect(self.server.admin_addr().unwrap())
            .await
            .unwrap()
    }

    /// Send `fields` after the context fields and check the id is echoed.
    pub async fn request(&self, fields: &[(FieldName, Option<&str>)]) -> DecodedResponse {
        let (transaction_id, response) = self.client.request(fields).await.unwrap();
        assert_eq!(
            response.text(ResponseField::TransactionId),
            Some(transaction_id.as_str())
        );
        response
    }

    pub async fn raw(&self, request: &str) -> Vec<u8> {
        self.client.send_raw(request.as_bytes()).await.unwrap()
    }

    /// Issue a new cookie for `device_info`.
    pub async fn cookie_for(&self, device_info: &str) -> String {
        let response = self
            .request(&[(FieldName::GetCookie, Some(device_info))])
            .await;
        assert_eq!(response.error(), None);
        response.text(ResponseField::Cookie).unwrap().to_owned()
    }

    /// Request `fields` identified by `cookie`.
    pub async fn with_cookie(
        &self,
        cookie: &str,
        fields: &[(FieldName, Option<&str>)],
    ) -> DecodedResponse {
        let mut all = vec![(FieldName::Cookie, Some(cookie))];
        all.extend_from_slice(fields);
        self.request(&all).await
    }

    pub async fn stop(self) {
        self.server.shutdown(Duration::from_secs(2)).await;
    }
}
