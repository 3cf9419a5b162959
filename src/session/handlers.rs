//! Answering a parsed request.
//!
//! # Data Flow
//! ```text
//! ParsedRequest + accumulation error
//!     → echo Transaction-ID
//!     → accumulation error / required fields / force upgrade / protocol version
//!     → identity (Cookie | Get-Cookie | Registration-Code)
//!     → language + one router snapshot
//!     → Verify-Registration-Code
//!     → Get-Article (lookup limit) / Get-Random-Article / Search
//!     → Article-Count / Database-Time / Available-Langs
//!     → Error field, end of response
//! ```
//!
//! Dispatch walks fields in [`FieldName`] order, so identity changes made by
//! `Verify-Registration-Code` are visible to the lookup limiter.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::Local;

use crate::article::expand_macros;
use crate::identity::{Credential, Identity};
use crate::protocol::{
    FieldName, FieldWriter, ParsedRequest, ProtocolResult, RequestField, ResponseField,
    ServerError,
};
use crate::routing::dbname::Lang;
use crate::routing::router::{ActiveDatabase, RouterState};
use crate::session::SessionContext;
use crate::storage::{Article, RequestLogEntry};

/// Titles returned by one search.
pub const SEARCH_RESULTS_LIMIT: usize = 200;

/// Random picks tried before giving up on `Get-Random-Article`.
pub const RANDOM_ARTICLE_ATTEMPTS: usize = 32;

/// Everything produced by answering one request.
#[derive(Debug)]
pub struct Answer {
    /// Complete response bytes, terminating empty line included.
    pub response: Vec<u8>,
    pub error: Option<ServerError>,
    pub log_entry: RequestLogEntry,
}

/// Per-request scratch state while answering.
struct Responder<'a> {
    ctx: &'a SessionContext,
    request: &'a ParsedRequest,
    out: FieldWriter,
    identity: Option<Identity>,
    article_title: Option<String>,
}

/// Answer `request`. `error` is the first problem found while accumulating.
pub async fn answer(
    ctx: &SessionContext,
    request: &ParsedRequest,
    error: Option<ServerError>,
    client_ip: Option<IpAddr>,
) -> Answer {
    let mut responder = Responder {
        ctx,
        request,
        out: FieldWriter::new(),
        identity: None,
        article_title: None,
    };

    if let Some(transaction_id) = request.argument(FieldName::TransactionId) {
        responder
            .out
            .emit_field(ResponseField::TransactionId, Some(transaction_id));
    }

    let result = match error {
        Some(err) => Err(err),
        None => responder.process().await,
    };
    let error = result.err();

    if let Some(err) = error {
        responder
            .out
            .emit_field(ResponseField::Error, Some(err.code().to_string().as_str()));
    }
    responder.out.emit_end();

    let log_entry = RequestLogEntry {
        client_ip,
        transaction_id: request.argument(FieldName::TransactionId).map(str::to_owned),
        has_get_cookie: request.contains(FieldName::GetCookie),
        user_id: responder.identity.map(|i| i.user_id),
        has_registration_code: request.contains(FieldName::RegistrationCode),
        requested_article: request.argument(FieldName::GetArticle).map(str::to_owned),
        article_title: responder.article_title,
        error: error.map(ServerError::code),
        timestamp: SystemTime::now(),
    };

    Answer {
        response: responder.out.take(),
        error,
        log_entry,
    }
}

impl Responder<'_> {
    async fn process(&mut self) -> ProtocolResult<()> {
        let request = self.request;
        for required in [
            FieldName::TransactionId,
            FieldName::ProtocolVersion,
            FieldName::ClientInfo,
        ] {
            if !request.contains(required) {
                tracing::debug!(field = required.as_str(), "Required field missing");
                return Err(ServerError::MalformedRequest);
            }
        }

        let switches = self.ctx.switches.load_full();
        if switches.force_upgrade {
            return Err(ServerError::ForceUpgrade);
        }

        if request.argument(FieldName::ProtocolVersion)
            != Some(self.ctx.protocol.protocol_version.as_str())
        {
            return Err(ServerError::InvalidProtocolVersion);
        }

        let credential = Credential::from_request(request)?;
        let resolved = self.ctx.identity.resolve(credential).await?;
        self.identity = Some(resolved.identity);
        if let Some(cookie) = &resolved.cookie {
            self.out.emit_field(ResponseField::Cookie, Some(cookie.as_str()));
        }
        let mut identity = resolved.identity;

        let snapshot = self.ctx.router.snapshot();
        let lang = match request.argument(FieldName::UseLang) {
            Some(code) => Lang::from_code(code).ok_or(ServerError::LangNotAvailable)?,
            None => Lang::default(),
        };
        let db = snapshot
            .current(lang)
            .cloned()
            .ok_or(ServerError::LangNotAvailable)?;

        for field in request.iter() {
            match field {
                RequestField::VerifyRegistrationCode(code) => {
                    let valid = self
                        .ctx
                        .identity
                        .verify_registration_code(&mut identity, code)
                        .await?;
                    self.identity = Some(identity);
                    self.out.emit_field(
                        ResponseField::RegistrationCodeValid,
                        Some(if valid { "1" } else { "0" }),
                    );
                }
                RequestField::GetArticle(title) => {
                    self.ctx
                        .limiter
                        .check(
                            identity.user_id,
                            identity.registered,
                            &switches.limits,
                            SystemTime::now(),
                        )
                        .await?;
                    self.get_article(&db, title).await?;
                }
                RequestField::GetRandomArticle => self.get_random_article(&db).await?,
                RequestField::Search(term) => self.search(&db, term).await?,
                RequestField::GetArticleCount => {
                    let count = db.info.article_count.to_string();
                    self.out.emit_field(ResponseField::ArticleCount, Some(count.as_str()));
                }
                RequestField::GetDatabaseTime => {
                    self.out
                        .emit_field(ResponseField::DatabaseTime, Some(db.info.db_date.as_str()));
                }
                RequestField::GetAvailableLangs => self.available_langs(&snapshot),
                RequestField::TransactionId(_)
                | RequestField::ProtocolVersion(_)
                | RequestField::ClientInfo(_)
                | RequestField::UseLang(_)
                | RequestField::Cookie(_)
                | RequestField::GetCookie(_)
                | RequestField::RegistrationCode(_) => {}
            }
        }
        Ok(())
    }

    async fn get_article(&mut self, db: &ActiveDatabase, title: &str) -> ProtocolResult<()> {
        if let Some(article) = db.store.find_article(title).await? {
            return self.emit_article(db, article).await;
        }

        let hits = db.store.search(title, SEARCH_RESULTS_LIMIT).await?;
        if hits.is_empty() {
            tracing::debug!(title = %title, "Article not found");
            self.out.emit_field(ResponseField::NotFound, None);
        } else {
            tracing::debug!(title = %title, hits = hits.len(), "Article not found, returning search results");
            self.emit_search_results(title, &hits);
        }
        Ok(())
    }

    async fn get_random_article(&mut self, db: &ActiveDatabase) -> ProtocolResult<()> {
        for _ in 0..RANDOM_ARTICLE_ATTEMPTS {
            if let Some(article) = db.store.random_article().await? {
                return self.emit_article(db, article).await;
            }
        }
        tracing::warn!(
            database = %db.info.db_name,
            attempts = RANDOM_ARTICLE_ATTEMPTS,
            "No random article found"
        );
        self.out.emit_field(ResponseField::NotFound, None);
        Ok(())
    }

    async fn search(&mut self, db: &ActiveDatabase, term: &str) -> ProtocolResult<()> {
        let hits = db.store.search(term, SEARCH_RESULTS_LIMIT).await?;
        if hits.is_empty() {
            self.out.emit_field(ResponseField::NotFound, None);
        } else {
            self.emit_search_results(term, &hits);
        }
        Ok(())
    }

    async fn emit_article(&mut self, db: &ActiveDatabase, article: Article) -> ProtocolResult<()> {
        let reverse_links = db.store.reverse_links(article.id).await?;
        let body = expand_macros(&article.body, db.info.article_count, &Local::now());

        self.out.emit_field(
            ResponseField::FormatVersion,
            Some(self.ctx.protocol.format_version.as_str()),
        );
        self.out
            .emit_field(ResponseField::ArticleTitle, Some(article.title.as_str()));
        self.out
            .emit_payload_field(ResponseField::ArticleBody, body.as_bytes());
        if !reverse_links.is_empty() {
            self.out.emit_payload_field(
                ResponseField::ReverseLinks,
                reverse_links.join("\n").as_bytes(),
            );
        }
        self.article_title = Some(article.title);
        Ok(())
    }

    fn emit_search_results(&mut self, term: &str, hits: &[String]) {
        self.out.emit_field(ResponseField::ArticleTitle, Some(term));
        self.out
            .emit_payload_field(ResponseField::SearchResults, hits.join("\n").as_bytes());
    }

    fn available_langs(&mut self, snapshot: &Arc<RouterState>) {
        let langs: Vec<&str> = snapshot
            .available_langs()
            .into_iter()
            .map(Lang::as_str)
            .collect();
        self.out
            .emit_field(ResponseField::AvailableLangs, Some(langs.join(" ").as_str()));
    }
}
