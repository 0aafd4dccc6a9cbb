// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::json;
use yare::parameterized;

use super::*;
use crate::test_support::{FakeRemote, Reply};

const TOKEN_PATH: &str = "/api/token";

async fn token_fake(replies: Vec<Reply>) -> anyhow::Result<(FakeRemote, TokenClient)> {
    let fake = FakeRemote::start(vec![(TOKEN_PATH, replies)]).await?;
    let client = TokenClient::new(crate::http::client(), fake.url(TOKEN_PATH)?);
    Ok((fake, client))
}

#[tokio::test]
async fn exchange_code_posts_pkce_form() -> anyhow::Result<()> {
    let (fake, client) = token_fake(vec![Reply::json(json!({
        "access_token": "acc",
        "refresh_token": "ref",
        "expires_in": 1800,
        "scope": "playlist-read-private",
    }))])
    .await?;

    let grant = client
        .exchange_code("cid", "http://127.0.0.1:8888/callback", "the-code", "the-verifier", &CancellationToken::new())
        .await?;

    assert_eq!(grant.access_token.as_deref(), Some("acc"));
    assert_eq!(grant.refresh_token.as_deref(), Some("ref"));
    assert_eq!(grant.expires_in_secs, 1800);
    assert_eq!(grant.scope.as_deref(), Some("playlist-read-private"));

    let form = fake.requests(TOKEN_PATH)[0].form();
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["code"], "the-code");
    assert_eq!(form["redirect_uri"], "http://127.0.0.1:8888/callback");
    assert_eq!(form["client_id"], "cid");
    assert_eq!(form["code_verifier"], "the-verifier");
    Ok(())
}

#[tokio::test]
async fn refresh_posts_refresh_grant() -> anyhow::Result<()> {
    let (fake, client) = token_fake(vec![Reply::json(json!({ "access_token": "new" }))]).await?;

    let grant = client.refresh("cid", "old-refresh", &CancellationToken::new()).await?;
    assert_eq!(grant.access_token.as_deref(), Some("new"));
    assert_eq!(grant.refresh_token, None);
    assert_eq!(grant.expires_in_secs, DEFAULT_EXPIRES_IN_SECS);

    let form = fake.requests(TOKEN_PATH)[0].form();
    assert_eq!(form["grant_type"], "refresh_token");
    assert_eq!(form["refresh_token"], "old-refresh");
    assert_eq!(form["client_id"], "cid");
    Ok(())
}

#[parameterized(
    description_wins = { r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#, "Refresh token revoked" },
    error_only = { r#"{"error":"invalid_client"}"#, "invalid_client" },
    empty_object = { "{}", "token request failed (400)" },
    not_json = { "<html>bad gateway</html>", "token request failed (400)" },
)]
fn error_message_precedence(body: &str, expected: &str) {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    assert_eq!(token_error_message(&value, 400), expected);
}

#[tokio::test]
async fn rejection_carries_message_and_status() -> anyhow::Result<()> {
    let (_fake, client) = token_fake(vec![Reply::status(
        400,
        r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#,
    )])
    .await?;

    let err = client
        .exchange_code("cid", "http://x/callback", "bad", "v", &CancellationToken::new())
        .await
        .err();
    assert_eq!(
        err,
        Some(AuthError::TokenExchange {
            message: "Invalid authorization code".into(),
            status: Some(400),
        })
    );
    Ok(())
}

#[tokio::test]
async fn non_json_error_body_uses_status_message() -> anyhow::Result<()> {
    let (_fake, client) = token_fake(vec![Reply::status(502, "upstream down")]).await?;

    let err = client.refresh("cid", "r", &CancellationToken::new()).await.err();
    assert_eq!(err.as_ref().and_then(AuthError::http_status), Some(502));
    assert_eq!(err.map(|e| e.to_string()).as_deref(), Some("token request failed (502)"));
    Ok(())
}

#[tokio::test]
async fn zero_or_missing_expiry_defaults_to_an_hour() -> anyhow::Result<()> {
    let (_fake, client) =
        token_fake(vec![Reply::json(json!({ "access_token": "a", "expires_in": 0 }))]).await?;
    let grant = client.refresh("cid", "r", &CancellationToken::new()).await?;
    assert_eq!(grant.expires_in_secs, 3600);
    assert_eq!(grant.expires_at(1_000), 1_000 + 3_600_000);
    Ok(())
}

#[tokio::test]
async fn cancellation_is_distinguishable() -> anyhow::Result<()> {
    let (_fake, client) = token_fake(vec![
        Reply::json(json!({ "access_token": "late" })).delayed(Duration::from_secs(5)),
    ])
    .await?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = client.refresh("cid", "r", &cancel).await.err();
    assert!(err.is_some_and(|e| e.is_cancelled()));
    Ok(())
}

#[tokio::test]
async fn unreachable_endpoint_has_no_status() -> anyhow::Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client =
        TokenClient::new(crate::http::client(), Url::parse(&format!("http://{addr}/api/token"))?);
    let err = client.refresh("cid", "r", &CancellationToken::new()).await.err();
    assert!(matches!(err, Some(AuthError::TokenExchange { status: None, .. })));
    Ok(())
}
