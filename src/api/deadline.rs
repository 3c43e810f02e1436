//! Per-request deadline.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::time::Duration;
use tracing::warn;

use super::error::ErrorBody;

const TIMED_OUT: &str = "Request timed out";

/// Answer 408 with the usual error body when the handler overruns `limit`.
pub async fn enforce(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!("request exceeded {}", humantime::format_duration(limit));
            (
                StatusCode::REQUEST_TIMEOUT,
                Json(ErrorBody {
                    error: TIMED_OUT.to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(limit: Duration) -> Router {
        Router::new()
            .route("/fast", get(|| async { "ok" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    "late"
                }),
            )
            .layer(middleware::from_fn_with_state(limit, enforce))
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_gets_error_body() {
        let response = app(Duration::from_secs(1))
            .oneshot(http::Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, TIMED_OUT);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_handler_passes_through() {
        let response = app(Duration::from_secs(1))
            .oneshot(http::Request::get("/fast").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
