//! End-to-end client protocol scenarios against a live server.

mod common;

use std::time::Duration;

use ipedia_server::config::RuntimeSwitches;
use ipedia_server::protocol::{decode_response, FieldName, ResponseField, ServerError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::*;

const CONTEXT: &str = "Transaction-ID: 42\nProtocol-Version: 1\nClient-Info: tests\n";

async fn raw_response(server: &TestServer, body: &str) -> ipedia_server::protocol::DecodedResponse {
    let raw = server.raw(&format!("{CONTEXT}{body}")).await;
    decode_response(&raw).unwrap()
}

#[tokio::test]
async fn get_cookie_issues_a_hex_cookie() {
    let server = TestServer::start().await;

    let response = server
        .request(&[(FieldName::GetCookie, Some("PL3030"))])
        .await;
    assert_eq!(response.error(), None);
    let cookie = response.text(ResponseField::Cookie).unwrap();
    assert_eq!(cookie.len(), 32);
    assert!(cookie.bytes().all(|b| b.is_ascii_hexdigit()));

    server.stop().await;
}

#[tokio::test]
async fn get_cookie_is_idempotent_for_unique_devices() {
    let server = TestServer::start().await;

    let first = server.cookie_for(UNIQUE_DEVICE).await;
    let second = server.cookie_for(UNIQUE_DEVICE).await;
    assert_eq!(first, second);

    let a = server.cookie_for(NON_UNIQUE_DEVICE).await;
    let b = server.cookie_for(NON_UNIQUE_DEVICE).await;
    assert_ne!(a, b);

    server.stop().await;
}

#[tokio::test]
async fn unsupported_device_is_rejected() {
    let server = TestServer::start().await;

    for token in ["PN50616C6D", "XX3030:PL3030", "PL303", "PL3030:PL3030"] {
        let response = server.request(&[(FieldName::GetCookie, Some(token))]).await;
        assert_eq!(response.error(), Some(ServerError::UnsupportedDevice), "{token}");
        assert!(!response.has(ResponseField::Cookie));
    }

    server.stop().await;
}

#[tokio::test]
async fn unknown_cookie_is_rejected() {
    let server = TestServer::start().await;

    let response = server
        .with_cookie("baloney", &[(FieldName::GetArticleCount, None)])
        .await;
    assert_eq!(response.error(), Some(ServerError::InvalidCookie));
    assert!(!response.has(ResponseField::ArticleCount));

    server.stop().await;
}

#[tokio::test]
async fn malformed_lines() {
    let server = TestServer::start().await;

    for body in [
        "Get-Cookie: PL3030\nmalformed\n\n",
        "Get-Cookie:  PL3030\n\n",
        "Get-Cookie:PL3030\n\n",
        "Get-Cookie: PL3030\nGet-Cookie: PL3030\n\n",
    ] {
        let response = raw_response(&server, body).await;
        assert_eq!(response.error(), Some(ServerError::MalformedRequest), "{body:?}");
        assert_eq!(response.text(ResponseField::TransactionId), Some("42"));
    }

    server.stop().await;
}

#[tokio::test]
async fn field_shape_errors() {
    let server = TestServer::start().await;

    let cases = [
        ("Get-Cookie: PL3030\nGet-Bananas: 3\n\n", ServerError::InvalidRequest),
        ("Get-Cookie: PL3030\nGet-Article-Count: 3\n\n", ServerError::UnexpectedRequestArgument),
        ("Get-Cookie: PL3030\nGet-Article:\n\n", ServerError::RequestArgumentMissing),
    ];
    for (body, expected) in cases {
        let response = raw_response(&server, body).await;
        assert_eq!(response.error(), Some(expected), "{body:?}");
    }

    server.stop().await;
}

#[tokio::test]
async fn missing_context_fields_are_malformed() {
    let server = TestServer::start().await;

    for request in [
        "Protocol-Version: 1\nClient-Info: tests\nGet-Cookie: PL3030\n\n",
        "Transaction-ID: 7\nClient-Info: tests\nGet-Cookie: PL3030\n\n",
        "Transaction-ID: 7\nProtocol-Version: 1\nGet-Cookie: PL3030\n\n",
    ] {
        let response = decode_response(&server.raw(request).await).unwrap();
        assert_eq!(response.error(), Some(ServerError::MalformedRequest), "{request:?}");
    }

    server.stop().await;
}

#[tokio::test]
async fn identity_must_be_exactly_one_field() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let none = server.request(&[(FieldName::GetArticleCount, None)]).await;
    assert_eq!(none.error(), Some(ServerError::MalformedRequest));

    let two = server
        .with_cookie(&cookie, &[(FieldName::GetCookie, Some("PL3030"))])
        .await;
    assert_eq!(two.error(), Some(ServerError::MalformedRequest));

    let with_code = server
        .with_cookie(&cookie, &[(FieldName::RegistrationCode, Some(VALID_REG_CODE))])
        .await;
    assert_eq!(with_code.error(), Some(ServerError::MalformedRequest));

    server.stop().await;
}

#[tokio::test]
async fn invalid_protocol_version_echoes_transaction_id() {
    let server = TestServer::start().await;
    let client = server.client.clone().with_protocol_version("2");

    let (transaction_id, response) = client
        .request(&[(FieldName::GetCookie, Some("PL3030"))])
        .await
        .unwrap();
    assert_eq!(response.error(), Some(ServerError::InvalidProtocolVersion));
    assert_eq!(
        response.text(ResponseField::TransactionId),
        Some(transaction_id.as_str())
    );
    assert!(!response.has(ResponseField::Cookie));

    server.stop().await;
}

#[tokio::test]
async fn get_article_returns_title_body_and_links() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let response = server
        .with_cookie(&cookie, &[(FieldName::GetArticle, Some("seattle"))])
        .await;
    assert_eq!(response.error(), None);
    assert_eq!(response.text(ResponseField::FormatVersion), Some("1"));
    assert_eq!(response.text(ResponseField::ArticleTitle), Some("Seattle"));
    let body = response.text(ResponseField::ArticleBody).unwrap();
    assert!(body.starts_with("Seattle is a city"));
    assert!(body.ends_with("This encyclopedia has 5 articles."), "{body}");
    assert_eq!(
        response.text(ResponseField::ReverseLinks),
        Some("Washington (state)\nBrazil")
    );

    server.stop().await;
}

#[tokio::test]
async fn get_article_follows_redirects() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let response = server
        .with_cookie(&cookie, &[(FieldName::GetArticle, Some("Emerald City"))])
        .await;
    assert_eq!(response.text(ResponseField::ArticleTitle), Some("Seattle"));

    let entries = server.stores.request_log.entries();
    let last = entries.last().unwrap();
    assert_eq!(last.requested_article.as_deref(), Some("Emerald City"));
    assert_eq!(last.article_title.as_deref(), Some("Seattle"));

    server.stop().await;
}

#[tokio::test]
async fn missing_article_falls_back_to_search() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let response = server
        .with_cookie(&cookie, &[(FieldName::GetArticle, Some("country"))])
        .await;
    assert_eq!(response.error(), None);
    assert_eq!(response.text(ResponseField::ArticleTitle), Some("country"));
    assert_eq!(response.text(ResponseField::SearchResults), Some("Brazil\nPoland"));
    assert!(!response.has(ResponseField::ArticleBody));

    let response = server
        .with_cookie(&cookie, &[(FieldName::GetArticle, Some("Tiber Septim"))])
        .await;
    assert_eq!(response.error(), None);
    assert!(response.has(ResponseField::NotFound));
    assert!(!response.has(ResponseField::ArticleTitle));

    server.stop().await;
}

#[tokio::test]
async fn search_and_random() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let response = server
        .with_cookie(&cookie, &[(FieldName::Search, Some("seattle"))])
        .await;
    assert_eq!(response.text(ResponseField::ArticleTitle), Some("seattle"));
    let hits = response.text(ResponseField::SearchResults).unwrap();
    assert_eq!(hits.split('\n').next(), Some("Seattle"));
    assert_eq!(hits.split('\n').count(), 3);

    let response = server
        .with_cookie(&cookie, &[(FieldName::Search, Some("zanzibar"))])
        .await;
    assert!(response.has(ResponseField::NotFound));

    let response = server
        .with_cookie(&cookie, &[(FieldName::GetRandomArticle, None)])
        .await;
    assert_eq!(response.error(), None);
    assert!(response.has(ResponseField::ArticleTitle));
    assert!(response.has(ResponseField::ArticleBody));

    server.stop().await;
}

#[tokio::test]
async fn database_info_fields() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let response = server
        .with_cookie(
            &cookie,
            &[
                (FieldName::GetArticleCount, None),
                (FieldName::GetDatabaseTime, None),
                (FieldName::GetAvailableLangs, None),
            ],
        )
        .await;
    assert_eq!(response.error(), None);
    assert_eq!(response.text(ResponseField::ArticleCount), Some("5"));
    assert_eq!(response.text(ResponseField::DatabaseTime), Some("20041001"));
    assert_eq!(response.text(ResponseField::AvailableLangs), Some("en de fr"));

    server.stop().await;
}

#[tokio::test]
async fn use_lang_selects_database() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let response = server
        .with_cookie(
            &cookie,
            &[(FieldName::UseLang, Some("fr")), (FieldName::GetArticleCount, None)],
        )
        .await;
    assert_eq!(response.text(ResponseField::ArticleCount), Some("6"));

    let response = server
        .with_cookie(
            &cookie,
            &[(FieldName::UseLang, Some("xx")), (FieldName::GetArticleCount, None)],
        )
        .await;
    assert_eq!(response.error(), Some(ServerError::LangNotAvailable));

    server.stop().await;
}

#[tokio::test]
async fn language_without_database_is_unavailable() {
    let mut config = test_config();
    // German has only three articles.
    config.storage.min_article_count = 4;
    let server = TestServer::start_with(config).await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let response = server
        .with_cookie(&cookie, &[(FieldName::GetAvailableLangs, None)])
        .await;
    assert_eq!(response.text(ResponseField::AvailableLangs), Some("en fr"));

    let response = server
        .with_cookie(
            &cookie,
            &[(FieldName::UseLang, Some("de")), (FieldName::GetArticleCount, None)],
        )
        .await;
    assert_eq!(response.error(), Some(ServerError::LangNotAvailable));

    server.stop().await;
}

#[tokio::test]
async fn unregistered_lookup_limit() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    for n in 0..10 {
        let response = server
            .with_cookie(&cookie, &[(FieldName::GetArticle, Some("Poland"))])
            .await;
        assert_eq!(response.error(), None, "lookup {n}");
    }
    let response = server
        .with_cookie(&cookie, &[(FieldName::GetArticle, Some("Poland"))])
        .await;
    assert_eq!(response.error(), Some(ServerError::LookupLimitReached));
    assert!(!response.has(ResponseField::ArticleBody));

    // Random articles and searches are never limited.
    let response = server
        .with_cookie(&cookie, &[(FieldName::GetRandomArticle, None)])
        .await;
    assert_eq!(response.error(), None);
    let response = server
        .with_cookie(&cookie, &[(FieldName::Search, Some("country"))])
        .await;
    assert_eq!(response.error(), None);

    server.stop().await;
}

#[tokio::test]
async fn lookup_limit_follows_runtime_switches() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let mut switches = RuntimeSwitches::default();
    switches.limits.unregistered_lookups_limit = 1;
    switches.limits.unregistered_lookups_daily_limit = 1;
    server.server.switches().store(switches.clone().into());

    let lookup = [(FieldName::GetArticle, Some("Poland"))];
    assert_eq!(server.with_cookie(&cookie, &lookup).await.error(), None);
    assert_eq!(
        server.with_cookie(&cookie, &lookup).await.error(),
        Some(ServerError::LookupLimitReached)
    );

    switches.limits.lookup_limit_enabled = false;
    server.server.switches().store(switches.into());
    assert_eq!(server.with_cookie(&cookie, &lookup).await.error(), None);

    server.stop().await;
}

#[tokio::test]
async fn verify_registration_code() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(EXAMPLE_DEVICE).await;

    let response = server
        .with_cookie(&cookie, &[(FieldName::VerifyRegistrationCode, Some("0000"))])
        .await;
    assert_eq!(response.error(), None);
    assert_eq!(response.text(ResponseField::RegistrationCodeValid), Some("0"));

    // Not bound to anyone yet.
    let response = server
        .request(&[(FieldName::RegistrationCode, Some(VALID_REG_CODE))])
        .await;
    assert_eq!(response.error(), Some(ServerError::InvalidRegCode));

    let response = server
        .with_cookie(&cookie, &[(FieldName::VerifyRegistrationCode, Some(VALID_REG_CODE))])
        .await;
    assert_eq!(response.text(ResponseField::RegistrationCodeValid), Some("1"));

    let response = server
        .request(&[
            (FieldName::RegistrationCode, Some(VALID_REG_CODE)),
            (FieldName::GetArticleCount, None),
        ])
        .await;
    assert_eq!(response.error(), None);
    assert_eq!(response.text(ResponseField::ArticleCount), Some("5"));

    server.stop().await;
}

#[tokio::test]
async fn registration_code_serves_one_install() {
    let server = TestServer::start().await;
    let first = server.cookie_for(EXAMPLE_DEVICE).await;
    let second = server.cookie_for(EXAMPLE_DEVICE).await;
    assert_ne!(first, second);

    let verify = [(FieldName::VerifyRegistrationCode, Some(VALID_REG_CODE))];
    let response = server.with_cookie(&first, &verify).await;
    assert_eq!(response.text(ResponseField::RegistrationCodeValid), Some("1"));

    let response = server.with_cookie(&second, &verify).await;
    assert_eq!(response.error(), None);
    assert_eq!(response.text(ResponseField::RegistrationCodeValid), Some("0"));

    // The second install stays unregistered and keeps hitting the limit.
    let lookup = [(FieldName::GetArticle, Some("Comedy"))];
    for _ in 0..10 {
        assert_eq!(server.with_cookie(&second, &lookup).await.error(), None);
    }
    assert_eq!(
        server.with_cookie(&second, &lookup).await.error(),
        Some(ServerError::LookupLimitReached)
    );

    let users = server.stores.users.users();
    assert_eq!(users.iter().filter(|u| u.is_registered()).count(), 1);
    let owner = &users[0];
    assert_eq!(owner.cookie, first);
    assert_eq!(owner.reg_code.as_deref(), Some(VALID_REG_CODE));

    server.stop().await;
}

#[tokio::test]
async fn registered_users_are_not_limited() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;

    let lookup = [(FieldName::GetArticle, Some("Comedy"))];
    for _ in 0..10 {
        assert_eq!(server.with_cookie(&cookie, &lookup).await.error(), None);
    }
    assert_eq!(
        server.with_cookie(&cookie, &lookup).await.error(),
        Some(ServerError::LookupLimitReached)
    );

    // Verification in the same request lifts the limit for the lookup.
    let response = server
        .with_cookie(
            &cookie,
            &[
                (FieldName::VerifyRegistrationCode, Some(VALID_REG_CODE)),
                (FieldName::GetArticle, Some("Comedy")),
            ],
        )
        .await;
    assert_eq!(response.error(), None);
    assert_eq!(response.text(ResponseField::ArticleTitle), Some("Comedy"));
    assert_eq!(server.with_cookie(&cookie, &lookup).await.error(), None);

    server.stop().await;
}

#[tokio::test]
async fn disabled_user_is_refused() {
    let server = TestServer::start().await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;
    let user_id = server.stores.request_log.entries()[0].user_id.unwrap();
    server.stores.users.set_disabled(user_id, true);

    let response = server
        .with_cookie(&cookie, &[(FieldName::GetArticleCount, None)])
        .await;
    assert_eq!(response.error(), Some(ServerError::UserDisabled));

    let response = server
        .request(&[(FieldName::GetCookie, Some(UNIQUE_DEVICE))])
        .await;
    assert_eq!(response.error(), Some(ServerError::UserDisabled));

    server.stop().await;
}

#[tokio::test]
async fn force_upgrade_switch() {
    let server = TestServer::start().await;
    server.server.switches().store(
        RuntimeSwitches {
            force_upgrade: true,
            ..RuntimeSwitches::default()
        }
        .into(),
    );

    let response = server
        .request(&[(FieldName::GetCookie, Some("PL3030"))])
        .await;
    assert_eq!(response.error(), Some(ServerError::ForceUpgrade));

    // Missing context fields are still reported first.
    let response = decode_response(&server.raw("Get-Cookie: PL3030\n\n").await).unwrap();
    assert_eq!(response.error(), Some(ServerError::MalformedRequest));

    server.stop().await;
}

#[tokio::test]
async fn request_line_guards() {
    let mut config = test_config();
    config.protocol.max_line_length = 64;
    config.protocol.max_request_lines = Some(4);
    let server = TestServer::start_with(config).await;

    let long = format!("Get-Cookie: PL3030\nSearch: {}\n\n", "a".repeat(200));
    let response = raw_response(&server, &long).await;
    assert_eq!(response.error(), Some(ServerError::MalformedRequest));

    let fifth = "Get-Cookie: PL3030\nGet-Article-Count:\n\n";
    let response = raw_response(&server, fifth).await;
    assert_eq!(response.error(), Some(ServerError::MalformedRequest));
    assert!(!response.has(ResponseField::ArticleCount));

    let fourth = "Get-Cookie: PL3030\n\n";
    let response = raw_response(&server, fourth).await;
    assert_eq!(response.error(), None);

    server.stop().await;
}

#[tokio::test]
async fn every_answered_request_is_logged() {
    let server = TestServer::start().await;

    server.raw(&format!("{CONTEXT}malformed\n\n")).await;
    let cookie = server.cookie_for(UNIQUE_DEVICE).await;
    server
        .with_cookie(&cookie, &[(FieldName::GetArticle, Some("Poland"))])
        .await;

    let entries = server.stores.request_log.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].transaction_id.as_deref(), Some("42"));
    assert_eq!(entries[0].error, Some(4));
    assert_eq!(entries[0].user_id, None);
    assert!(entries[1].has_get_cookie);
    assert_eq!(entries[2].article_title.as_deref(), Some("Poland"));
    assert_eq!(entries[1].user_id, entries[2].user_id);

    server.stop().await;
}

#[tokio::test]
async fn incomplete_requests_get_no_response() {
    let mut config = test_config();
    config.protocol.request_timeout_secs = 1;
    let server = TestServer::start_with(config).await;

    // Client goes away before the empty line.
    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    stream.write_all(CONTEXT.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.is_empty());

    // Client stalls past the request timeout.
    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    stream.write_all(CONTEXT.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.is_empty());

    assert!(server.stores.request_log.entries().is_empty());
    server.stop().await;
}
