//! Field catalog.
//!
//! Every request field the server understands is a variant of [`FieldName`].
//! Parsing a line produces a [`RequestField`] carrying its argument, so an
//! unknown field or a field with the wrong argument shape can't make it past
//! the codec.

use std::collections::BTreeMap;
use std::fmt;

use crate::protocol::error::{ProtocolResult, ServerError};

/// Names of the request fields, in dispatch order.
///
/// The derived `Ord` follows declaration order: context fields, then
/// identity fields, then handlers, then simple output fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldName {
    TransactionId,
    ProtocolVersion,
    ClientInfo,
    UseLang,
    Cookie,
    GetCookie,
    RegistrationCode,
    VerifyRegistrationCode,
    GetArticle,
    GetRandomArticle,
    Search,
    GetArticleCount,
    GetDatabaseTime,
    GetAvailableLangs,
}

impl FieldName {
    pub const ALL: [FieldName; 14] = [
        FieldName::TransactionId,
        FieldName::ProtocolVersion,
        FieldName::ClientInfo,
        FieldName::UseLang,
        FieldName::Cookie,
        FieldName::GetCookie,
        FieldName::RegistrationCode,
        FieldName::VerifyRegistrationCode,
        FieldName::GetArticle,
        FieldName::GetRandomArticle,
        FieldName::Search,
        FieldName::GetArticleCount,
        FieldName::GetDatabaseTime,
        FieldName::GetAvailableLangs,
    ];

    /// Name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::TransactionId => "Transaction-ID",
            FieldName::ProtocolVersion => "Protocol-Version",
            FieldName::ClientInfo => "Client-Info",
            FieldName::UseLang => "Use-Lang",
            FieldName::Cookie => "Cookie",
            FieldName::GetCookie => "Get-Cookie",
            FieldName::RegistrationCode => "Registration-Code",
            FieldName::VerifyRegistrationCode => "Verify-Registration-Code",
            FieldName::GetArticle => "Get-Article",
            FieldName::GetRandomArticle => "Get-Random-Article",
            FieldName::Search => "Search",
            FieldName::GetArticleCount => "Get-Article-Count",
            FieldName::GetDatabaseTime => "Get-Database-Time",
            FieldName::GetAvailableLangs => "Get-Available-Langs",
        }
    }

    /// Look up a wire name. Matching is exact and case-sensitive.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == name)
    }

    pub fn requires_argument(self) -> bool {
        !matches!(
            self,
            FieldName::GetRandomArticle
                | FieldName::GetArticleCount
                | FieldName::GetDatabaseTime
                | FieldName::GetAvailableLangs
        )
    }

    /// Fields that carry caller identity. At most one may be present.
    pub fn is_identity(self) -> bool {
        matches!(
            self,
            FieldName::Cookie | FieldName::GetCookie | FieldName::RegistrationCode
        )
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request field together with its argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestField {
    TransactionId(String),
    ProtocolVersion(String),
    ClientInfo(String),
    UseLang(String),
    Cookie(String),
    GetCookie(String),
    RegistrationCode(String),
    VerifyRegistrationCode(String),
    GetArticle(String),
    GetRandomArticle,
    Search(String),
    GetArticleCount,
    GetDatabaseTime,
    GetAvailableLangs,
}

impl RequestField {
    /// Build a field from a known name and the raw argument, checking the
    /// argument against the catalog.
    pub fn new(name: FieldName, value: Option<String>) -> ProtocolResult<Self> {
        let value = match (name.requires_argument(), value) {
            (true, None) => return Err(ServerError::RequestArgumentMissing),
            (false, Some(_)) => return Err(ServerError::UnexpectedRequestArgument),
            (_, value) => value.unwrap_or_default(),
        };

        let field = match name {
            FieldName::TransactionId => RequestField::TransactionId(value),
            FieldName::ProtocolVersion => RequestField::ProtocolVersion(value),
            FieldName::ClientInfo => RequestField::ClientInfo(value),
            FieldName::UseLang => RequestField::UseLang(value),
            FieldName::Cookie => RequestField::Cookie(value),
            FieldName::GetCookie => RequestField::GetCookie(value),
            FieldName::RegistrationCode => RequestField::RegistrationCode(value),
            FieldName::VerifyRegistrationCode => RequestField::VerifyRegistrationCode(value),
            FieldName::GetArticle => RequestField::GetArticle(value),
            FieldName::GetRandomArticle => RequestField::GetRandomArticle,
            FieldName::Search => RequestField::Search(value),
            FieldName::GetArticleCount => RequestField::GetArticleCount,
            FieldName::GetDatabaseTime => RequestField::GetDatabaseTime,
            FieldName::GetAvailableLangs => RequestField::GetAvailableLangs,
        };
        Ok(field)
    }

    pub fn name(&self) -> FieldName {
        match self {
            RequestField::TransactionId(_) => FieldName::TransactionId,
            RequestField::ProtocolVersion(_) => FieldName::ProtocolVersion,
            RequestField::ClientInfo(_) => FieldName::ClientInfo,
            RequestField::UseLang(_) => FieldName::UseLang,
            RequestField::Cookie(_) => FieldName::Cookie,
            RequestField::GetCookie(_) => FieldName::GetCookie,
            RequestField::RegistrationCode(_) => FieldName::RegistrationCode,
            RequestField::VerifyRegistrationCode(_) => FieldName::VerifyRegistrationCode,
            RequestField::GetArticle(_) => FieldName::GetArticle,
            RequestField::GetRandomArticle => FieldName::GetRandomArticle,
            RequestField::Search(_) => FieldName::Search,
            RequestField::GetArticleCount => FieldName::GetArticleCount,
            RequestField::GetDatabaseTime => FieldName::GetDatabaseTime,
            RequestField::GetAvailableLangs => FieldName::GetAvailableLangs,
        }
    }

    /// Argument of the field, if it takes one.
    pub fn argument(&self) -> Option<&str> {
        match self {
            RequestField::TransactionId(v)
            | RequestField::ProtocolVersion(v)
            | RequestField::ClientInfo(v)
            | RequestField::UseLang(v)
            | RequestField::Cookie(v)
            | RequestField::GetCookie(v)
            | RequestField::RegistrationCode(v)
            | RequestField::VerifyRegistrationCode(v)
            | RequestField::GetArticle(v)
            | RequestField::Search(v) => Some(v),
            RequestField::GetRandomArticle
            | RequestField::GetArticleCount
            | RequestField::GetDatabaseTime
            | RequestField::GetAvailableLangs => None,
        }
    }
}

/// Fields accumulated over one connection.
///
/// Iteration follows [`FieldName`] order, never arrival order.
#[derive(Debug, Default, Clone)]
pub struct ParsedRequest {
    fields: BTreeMap<FieldName, RequestField>,
}

impl ParsedRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. A second occurrence of the same name is malformed.
    pub fn insert(&mut self, field: RequestField) -> ProtocolResult<()> {
        let name = field.name();
        if self.fields.contains_key(&name) {
            return Err(ServerError::MalformedRequest);
        }
        self.fields.insert(name, field);
        Ok(())
    }

    pub fn contains(&self, name: FieldName) -> bool {
        self.fields.contains_key(&name)
    }

    pub fn get(&self, name: FieldName) -> Option<&RequestField> {
        self.fields.get(&name)
    }

    /// Argument of `name`, if present and argument-bearing.
    pub fn argument(&self, name: FieldName) -> Option<&str> {
        self.get(name).and_then(RequestField::argument)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestField> {
        self.fields.values()
    }

    /// Identity fields present in the request.
    pub fn identity_fields(&self) -> impl Iterator<Item = &RequestField> {
        self.iter().filter(|f| f.name().is_identity())
    }
}

/// Names of the response fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseField {
    TransactionId,
    Cookie,
    RegistrationCodeValid,
    FormatVersion,
    ArticleTitle,
    ArticleBody,
    ReverseLinks,
    NotFound,
    SearchResults,
    ArticleCount,
    DatabaseTime,
    AvailableLangs,
    Error,
}

impl ResponseField {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseField::TransactionId => "Transaction-ID",
            ResponseField::Cookie => "Cookie",
            ResponseField::RegistrationCodeValid => "Registration-Code-Valid",
            ResponseField::FormatVersion => "Format-Version",
            ResponseField::ArticleTitle => "Article-Title",
            ResponseField::ArticleBody => "Article-Body",
            ResponseField::ReverseLinks => "Reverse-Links",
            ResponseField::NotFound => "Not-Found",
            ResponseField::SearchResults => "Search-Results",
            ResponseField::ArticleCount => "Article-Count",
            ResponseField::DatabaseTime => "Database-Time",
            ResponseField::AvailableLangs => "Available-Langs",
            ResponseField::Error => "Error",
        }
    }

    /// Fields whose value is a byte length followed by a raw payload.
    pub fn is_payload(self) -> bool {
        matches!(
            self,
            ResponseField::ArticleBody | ResponseField::ReverseLinks | ResponseField::SearchResults
        )
    }

    pub fn is_payload_name(name: &str) -> bool {
        [
            ResponseField::ArticleBody,
            ResponseField::ReverseLinks,
            ResponseField::SearchResults,
        ]
        .iter()
        .any(|f| f.as_str() == name)
    }
}

impl fmt::Display for ResponseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
