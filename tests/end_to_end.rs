//! Full session lifecycle over HTTP with in-memory stores.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use turnstile::{
    accounts::{Argon2Hasher, MemoryAccounts},
    api,
    session::{store::MemoryRefreshStore, SessionConfig, SessionManager},
};

const ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

fn app() -> anyhow::Result<Router> {
    let config = SessionConfig::new(SecretString::from(
        "end-to-end-signing-key-0123456789abcdef".to_string(),
    ))?
    .with_access_ttl(ACCESS_TTL)
    .with_refresh_ttl(Duration::from_secs(168 * 3600));

    let params = argon2::Params::new(8, 1, 1, None).map_err(|err| anyhow::anyhow!("{err}"))?;
    let sessions = SessionManager::new(
        config,
        Arc::new(MemoryAccounts::new()),
        Arc::new(MemoryRefreshStore::new()),
        Arc::new(Argon2Hasher::from_params(params)),
    )?;

    Ok(api::router(Arc::new(sessions), Duration::from_secs(10)))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> anyhow::Result<(StatusCode, Value)> {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

fn text(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn register_login_refresh_logout() -> anyhow::Result<()> {
    let app = app()?;

    let (status, profile) = call(
        &app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({"email": "a@b.com", "password": "secret123", "name": "Ann"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(profile["email"], "a@b.com");

    let (status, login) = call(
        &app,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({"email": "a@b.com", "password": "secret123"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["expires_in"], ACCESS_TTL.as_secs());
    assert!(!text(&login, "access_token").is_empty());

    let (status, me) = call(
        &app,
        Method::GET,
        "/v1/users/me",
        Some(&text(&login, "access_token")),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], profile["id"]);

    let (status, refreshed) = call(
        &app,
        Method::POST,
        "/v1/auth/refresh",
        None,
        Some(json!({"refresh_token": text(&login, "refresh_token")})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(
        text(&refreshed, "refresh_token"),
        text(&login, "refresh_token")
    );

    let (status, replay) = call(
        &app,
        Method::POST,
        "/v1/auth/refresh",
        None,
        Some(json!({"refresh_token": text(&login, "refresh_token")})),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay["error"], "Invalid refresh token");

    let (status, bye) = call(
        &app,
        Method::POST,
        "/v1/auth/logout",
        Some(&text(&refreshed, "access_token")),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bye["message"], "Logout successful");

    let (status, after) = call(
        &app,
        Method::POST,
        "/v1/auth/refresh",
        None,
        Some(json!({"refresh_token": text(&refreshed, "refresh_token")})),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(after["error"], "Invalid refresh token");

    Ok(())
}

#[tokio::test]
async fn unknown_email_and_wrong_password_look_alike() -> anyhow::Result<()> {
    let app = app()?;
    call(
        &app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({"email": "a@b.com", "password": "secret123", "name": "Ann"})),
    )
    .await?;

    let wrong = call(
        &app,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({"email": "a@b.com", "password": "wrong-one"})),
    )
    .await?;
    let unknown = call(
        &app,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({"email": "nobody@b.com", "password": "secret123"})),
    )
    .await?;

    assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, unknown);

    Ok(())
}

#[tokio::test]
async fn missing_body_is_bad_request() -> anyhow::Result<()> {
    let app = app()?;
    let (status, body) = call(&app, Method::POST, "/v1/auth/refresh", None, None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request format");
    Ok(())
}
