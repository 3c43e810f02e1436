//! HTTP surface.

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::{get, post},
    Extension, Router,
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;

use crate::session::SessionManager;

pub mod deadline;
pub mod error;
pub mod gate;
pub mod handlers;
mod openapi;

pub use openapi::{openapi, ApiDoc};

const REQUEST_ID: &str = "x-request-id";

/// Build the application router.
pub fn router(sessions: Arc<SessionManager>, request_timeout: Duration) -> Router {
    let protected = Router::new()
        .route("/v1/auth/logout", post(handlers::auth::logout))
        .route(
            "/v1/users/me",
            get(handlers::me::me)
                .put(handlers::me::update)
                .delete(handlers::me::delete),
        )
        .route_layer(middleware::from_fn_with_state(
            sessions.clone(),
            gate::require_bearer,
        ));

    // bearer tokens travel in a header, so no credentials mode
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/v1/auth/register", post(handlers::auth::register))
        .route("/v1/auth/login", post(handlers::auth::login))
        .route("/v1/auth/refresh", post(handlers::auth::refresh))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    request_timeout,
                    deadline::enforce,
                ))
                .layer(Extension(sessions)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, sessions: Arc<SessionManager>, request_timeout: Duration) -> Result<()> {
    let app = router(sessions, request_timeout);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        accounts::{Argon2Hasher, MemoryAccounts},
        session::{store::MemoryRefreshStore, SessionConfig, TokenPair},
    };
    use axum::http::{header, Method, StatusCode};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let config = SessionConfig::new(SecretString::from(
            "router-test-signing-key-0123456789abcdef".to_string(),
        ))
        .unwrap();
        let sessions = SessionManager::new(
            config,
            Arc::new(MemoryAccounts::new()),
            Arc::new(MemoryRefreshStore::new()),
            Arc::new(Argon2Hasher::from_params(
                argon2::Params::new(8, 1, 1, None).unwrap(),
            )),
        )
        .unwrap();
        router(Arc::new(sessions), Duration::from_secs(10))
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login(app: &Router) -> TokenPair {
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/auth/register",
                &json!({"email": "a@b.com", "password": "secret123", "name": "Ann"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/auth/login",
                &json!({"email": "a@b.com", "password": "secret123"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );
        serde_json::from_value(json_body(response).await).unwrap()
    }

    #[tokio::test]
    async fn health_reports_build_and_request_id() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID));
        assert!(response.headers().contains_key("x-app"));

        let body = json_body(response).await;
        assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    }

    #[tokio::test]
    async fn request_id_is_propagated() {
        let response = app()
            .oneshot(
                Request::get("/health")
                    .header(REQUEST_ID, "01HZZZZZZZZZZZZZZZZZZZZZZZ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(REQUEST_ID).unwrap(),
            "01HZZZZZZZZZZZZZZZZZZZZZZZ"
        );
    }

    #[tokio::test]
    async fn register_rejects_malformed_body() {
        let response = app()
            .oneshot(
                Request::post("/v1/auth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid request format");
    }

    #[tokio::test]
    async fn duplicate_register_conflicts() {
        let app = app();
        let body = json!({"email": "a@b.com", "password": "secret123", "name": "Ann"});
        let first = app.clone().oneshot(post_json("/v1/auth/register", &body)).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.oneshot(post_json("/v1/auth/register", &body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(second).await["error"], "Email already registered");
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = app();
        login(&app).await;
        let response = app
            .oneshot(post_json(
                "/v1/auth/login",
                &json!({"email": "a@b.com", "password": "nope-nope"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn gate_rejects_missing_and_bad_tokens() {
        let app = app();

        let missing = app
            .clone()
            .oneshot(Request::get("/v1/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(missing).await["error"], "Missing authorization header");

        let garbage = app
            .oneshot(
                Request::get("/v1/users/me")
                    .header(header::AUTHORIZATION, "Bearer not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(garbage).await["error"], "Invalid token");
    }

    #[tokio::test]
    async fn me_returns_profile_for_bearer() {
        let app = app();
        let pair = login(&app).await;

        let response = app
            .oneshot(
                Request::get("/v1/users/me")
                    .header(header::AUTHORIZATION, format!("Bearer {}", pair.access_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["email"], "a@b.com");
        assert_eq!(body["name"], "Ann");
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn logout_then_refresh_fails() {
        let app = app();
        let pair = login(&app).await;

        let logout = app
            .clone()
            .oneshot(
                Request::post("/v1/auth/logout")
                    .header(header::AUTHORIZATION, format!("Bearer {}", pair.access_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(logout.status(), StatusCode::OK);
        assert_eq!(json_body(logout).await["message"], "Logout successful");

        let refresh = app
            .oneshot(post_json(
                "/v1/auth/refresh",
                &json!({"refresh_token": pair.refresh_token}),
            ))
            .await
            .unwrap();
        assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(refresh).await["error"], "Invalid refresh token");
    }

    fn bearer(method: Method, uri: &str, access_token: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn update_me_changes_password_and_revokes_refresh() {
        let app = app();
        let pair = login(&app).await;

        let update = app
            .clone()
            .oneshot(bearer(
                Method::PUT,
                "/v1/users/me",
                &pair.access_token,
                Body::from(json!({"name": "Bea", "password": "changed456"}).to_string()),
            ))
            .await
            .unwrap();
        assert_eq!(update.status(), StatusCode::OK);
        assert_eq!(json_body(update).await["name"], "Bea");

        let refresh = app
            .clone()
            .oneshot(post_json(
                "/v1/auth/refresh",
                &json!({"refresh_token": pair.refresh_token}),
            ))
            .await
            .unwrap();
        assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);

        let relogin = app
            .oneshot(post_json(
                "/v1/auth/login",
                &json!({"email": "a@b.com", "password": "changed456"}),
            ))
            .await
            .unwrap();
        assert_eq!(relogin.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn update_me_rejects_short_password_and_missing_body() {
        let app = app();
        let pair = login(&app).await;

        let short = app
            .clone()
            .oneshot(bearer(
                Method::PUT,
                "/v1/users/me",
                &pair.access_token,
                Body::from(json!({"name": "Bea", "password": "abc"}).to_string()),
            ))
            .await
            .unwrap();
        assert_eq!(short.status(), StatusCode::BAD_REQUEST);

        let empty = app
            .oneshot(bearer(
                Method::PUT,
                "/v1/users/me",
                &pair.access_token,
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(empty).await["error"], "Invalid request format");
    }

    #[tokio::test]
    async fn delete_me_ends_account_and_session() {
        let app = app();
        let pair = login(&app).await;

        let delete = app
            .clone()
            .oneshot(bearer(
                Method::DELETE,
                "/v1/users/me",
                &pair.access_token,
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(delete.status(), StatusCode::OK);
        assert_eq!(json_body(delete).await["message"], "User deleted");

        let refresh = app
            .clone()
            .oneshot(post_json(
                "/v1/auth/refresh",
                &json!({"refresh_token": pair.refresh_token}),
            ))
            .await
            .unwrap();
        assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);

        let me = app
            .oneshot(bearer(
                Method::GET,
                "/v1/users/me",
                &pair.access_token,
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(me.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_me_needs_bearer() {
        let response = app()
            .oneshot(
                Request::delete("/v1/users/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/v1/users/me")
                    .header(header::ORIGIN, "https://app.example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        let methods = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(methods.contains("DELETE"), "{methods}");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let response = app()
            .oneshot(Request::get("/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["paths"]["/v1/auth/refresh"].is_object());
    }
}
