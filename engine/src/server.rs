//! Webhook HTTP surface
//!
//! `POST /message` takes a Telegram message forwarded by the local gateway,
//! `GET /test` is a liveness check. When `server.auth_token` is set the
//! gateway must send it in the `Authorization` header (bare or `Bearer`).

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

use crate::bot::{IncomingMessage, MessageHandler};

#[derive(Clone)]
pub struct AppState {
    handler: Arc<MessageHandler>,
    auth_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(handler: MessageHandler, auth_token: Option<String>) -> Self {
        Self {
            handler: Arc::new(handler),
            auth_token: auth_token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }

    pub fn handler(&self) -> &MessageHandler {
        &self.handler
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.auth_token.as_deref() else {
            return true;
        };

        let presented = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim());

        presented == Some(expected)
    }
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/message", post(call_message))
        .route("/test", get(call_test))
        .layer(trace_layer)
        .with_state(state)
}

async fn call_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<IncomingMessage>,
) -> Response {
    if !state.authorized(&headers) {
        warn!("Rejected webhook call with missing or wrong Authorization header");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized"})),
        )
            .into_response();
    }

    Json(state.handler.handle(message).await).into_response()
}

async fn call_test() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Serve until Ctrl-C
pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    serve_until(bind, state, async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
    })
    .await
}

/// Serve until `shutdown` resolves, then flush the history counters
pub async fn serve_until(
    bind: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let store = Arc::clone(state.handler().store());
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    store.flush_metrics();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{AccessList, TelegramClient};
    use crate::history::{HistoryStore, MemoryBackend};
    use crate::llm::{LLMProvider, Message};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct Silent;

    #[async_trait]
    impl LLMProvider for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn generate(&self, _messages: &[Message]) -> crate::llm::Result<String> {
            Ok(String::new())
        }
    }

    fn state(auth_token: Option<&str>) -> AppState {
        let store = Arc::new(HistoryStore::new(Arc::new(MemoryBackend::new()), 100));
        let handler = MessageHandler::new(
            store,
            Arc::new(Silent),
            TelegramClient::new("http://127.0.0.1:9", "T"),
            AccessList::new([1], None),
        );
        AppState::new(handler, auth_token.map(str::to_string))
    }

    fn message_request(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/message")
            .header("content-type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder
            .body(Body::from(
                r#"{"message_id": 1, "chat": {"id": 2}, "from": {"id": 3}, "text": "hi"}"#,
            ))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(state(None));
        let response = app
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_message_from_unknown_user() {
        let app = create_router(state(None));
        let response = app.oneshot(message_request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"type": "text", "body": "You are not authorized to use this bot."})
        );
    }

    #[tokio::test]
    async fn test_auth_token_required() {
        let app = create_router(state(Some("s3cret")));
        let response = app.oneshot(message_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let app = create_router(state(Some("s3cret")));
        let response = app
            .oneshot(message_request(Some("Bearer s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let app = create_router(state(None));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/message")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"chat\": 1}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
