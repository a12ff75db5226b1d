//! HTTP Server - Poll Endpoint and Static Content
//!
//! ```text
//!   GET  /session          next outbound command, or empty 200 after the poll bound
//!   POST /session          {"textLine": "...", "columns": N}, empty 200
//!   GET  /                 index.html
//!   GET  /{contentFile}    embedded asset, or 404
//! ```
//!
//! The handlers hold no state of their own; every request goes straight to
//! the [`CommandBus`].

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bridge_core::{CommandBus, InboundCommand};
use tracing::{debug, warn};

use crate::content;

/// Shared state for request handlers
#[derive(Clone, Debug)]
pub struct AppState {
    bus: CommandBus,
}

impl AppState {
    /// Create handler state around a running bus
    #[must_use]
    pub fn new(bus: CommandBus) -> Self {
        Self { bus }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/session", get(poll_session).post(post_session))
        .route("/", get(index))
        .route("/:content_file", get(content_file))
        .with_state(state)
}

async fn poll_session(State(state): State<AppState>) -> Response {
    match state.bus.poll_outbound().await {
        Some(cmd) => {
            debug!(kind = cmd.kind(), "Delivering outbound command");
            Json(cmd).into_response()
        }
        None => StatusCode::OK.into_response(),
    }
}

async fn post_session(
    State(state): State<AppState>,
    Json(cmd): Json<InboundCommand>,
) -> StatusCode {
    debug!(columns = cmd.columns, "Inbound command received");
    match state.bus.enqueue_inbound(cmd) {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Rejected inbound command");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn index() -> Response {
    serve_asset(content::INDEX)
}

async fn content_file(Path(name): Path<String>) -> Response {
    serve_asset(&name)
}

fn serve_asset(name: &str) -> Response {
    match content::lookup(name) {
        Some(bytes) => ([(header::CONTENT_TYPE, content::content_type(name))], bytes).into_response(),
        None => {
            debug!(name, "Unknown content file requested");
            (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain")],
                "Not found",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use bridge_core::{BusConfig, OutboundCommand};
    use pretty_assertions::assert_eq;
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    fn app() -> (CommandBus, Router) {
        let bus = CommandBus::start(BusConfig {
            poll_timeout_ms: 100,
        });
        let router = router(AppState::new(bus.clone()));
        (bus, router)
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_session_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/session")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_poll_returns_empty_body_after_bound() {
        let (_bus, app) = app();

        let start = Instant::now();
        let response = app.oneshot(get_request("/session")).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");
        assert!(elapsed >= Duration::from_millis(90), "{elapsed:?}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_poll_returns_queued_command_as_json() {
        let (bus, app) = app();
        bus.enqueue_outbound(OutboundCommand::print("hi\n")).unwrap();
        bus.enqueue_outbound(OutboundCommand::read_line(false, None))
            .unwrap();

        let response = app
            .clone()
            .oneshot(get_request("/session"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(first, serde_json::json!({"print": {"text": "hi\n"}}));

        let response = app.oneshot(get_request("/session")).await.unwrap();
        let second: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(second, serde_json::json!({"readLine": {"secure": false}}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_post_delivers_to_waiting_consumer() {
        let (bus, app) = app();
        let (tx, rx) = tokio::sync::oneshot::channel();
        bus.register_one_shot_consumer(move |cmd, _| {
            let _ = tx.send(cmd);
        });

        let response = app
            .oneshot(post_session_request(r#"{"textLine": "dir", "columns": 120}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");

        let delivered = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered, InboundCommand::new("dir", 120));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_post_after_shutdown_is_unavailable() {
        let (bus, app) = app();
        bus.shutdown();

        let response = app
            .oneshot(post_session_request(r#"{"textLine": "late"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_post_malformed_body_is_client_error() {
        let (bus, app) = app();

        let response = app
            .oneshot(post_session_request("not json"))
            .await
            .unwrap();
        assert!(response.status().is_client_error(), "{}", response.status());
        assert_eq!(bus.stats().inbound_enqueued, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_static_content() {
        let (_bus, app) = app();

        let response = app.clone().oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert!(body_text(response).await.contains("console.js"));

        let response = app
            .clone()
            .oneshot(get_request("/console.js"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/javascript");

        let response = app
            .clone()
            .oneshot(get_request("/console.css"))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");

        let response = app.oneshot(get_request("/nope.txt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_text(response).await, "Not found");
    }
}
