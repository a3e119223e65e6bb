//! End-to-end tests for the webhook
//!
//! A forwarded Telegram message goes through the axum router, the file-backed
//! history store, a mocked OpenAI endpoint and a mocked Bot API.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use parley_engine::bot::{AccessList, MessageHandler, TelegramClient};
use parley_engine::config::LLMConfig;
use parley_engine::history::{FileBackend, HistoryStore};
use parley_engine::llm::OpenAIProvider;
use parley_engine::server::{create_router, AppState};
use sdk::Turn;

struct Harness {
    _dir: TempDir,
    store: Arc<HistoryStore>,
    state: AppState,
}

async fn mock_upstreams(reply: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": reply}}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    server
}

fn harness(upstream: &MockServer, budget: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(HistoryStore::new(
        Arc::new(FileBackend::new(dir.path())),
        budget,
    ));

    let llm = OpenAIProvider::new(
        LLMConfig {
            base_url: format!("{}/v1", upstream.uri()),
            ..LLMConfig::default()
        },
        "sk-test",
    );
    let handler = MessageHandler::new(
        Arc::clone(&store),
        Arc::new(llm),
        TelegramClient::new(upstream.uri(), "TOKEN"),
        AccessList::new([7], None),
    )
    .with_parse_mode("Markdown");

    Harness {
        _dir: dir,
        store,
        state: AppState::new(handler, None),
    }
}

async fn post(state: &AppState, message: Value) -> Value {
    let response = create_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/message")
                .header("content-type", "application/json")
                .body(Body::from(message.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn message(id: i64, text: &str) -> Value {
    json!({
        "message_id": id,
        "chat": {"id": 42, "type": "private"},
        "from": {"id": 7, "is_bot": false, "first_name": "Ada"},
        "date": 1_700_000_000,
        "text": text,
    })
}

#[tokio::test]
async fn test_message_is_answered_and_remembered() {
    let upstream = mock_upstreams("pong").await;
    let h = harness(&upstream, 4000);

    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": 42,
            "text": "pong",
            "reply_to_message_id": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .with_priority(1)
        .expect(1)
        .mount(&upstream)
        .await;

    let body = post(&h.state, message(1, "ping")).await;
    assert_eq!(body, json!({"type": "empty", "body": ""}));

    assert_eq!(
        h.store.read("42").await.unwrap(),
        vec![Turn::user("ping"), Turn::assistant("pong")]
    );
}

#[tokio::test]
async fn test_reset_then_fresh_conversation() {
    let upstream = mock_upstreams("pong").await;
    let h = harness(&upstream, 4000);

    post(&h.state, message(1, "ping")).await;
    let body = post(&h.state, message(2, "/reset")).await;
    assert_eq!(body["type"], "text");
    assert!(h.store.read("42").await.unwrap().is_empty());

    post(&h.state, message(3, "hello again")).await;
    assert_eq!(
        h.store.read("42").await.unwrap(),
        vec![Turn::user("hello again"), Turn::assistant("pong")]
    );
}

#[tokio::test]
async fn test_history_stays_within_budget_across_messages() {
    let upstream = mock_upstreams("0123456789").await;
    let h = harness(&upstream, 30);

    for id in 1..=5 {
        post(&h.state, message(id, "abcdefghij")).await;
    }

    let stats = h.store.stats("42").await.unwrap();
    assert!(stats.content_len <= 30);

    let turns = h.store.read("42").await.unwrap();
    assert_eq!(turns.last(), Some(&Turn::assistant("0123456789")));
}

#[tokio::test]
async fn test_redelivered_message_is_not_duplicated() {
    let upstream = mock_upstreams("pong").await;
    let h = harness(&upstream, 4000);

    post(&h.state, message(1, "ping")).await;
    post(&h.state, message(1, "ping")).await;

    assert_eq!(
        h.store.read("42").await.unwrap(),
        vec![Turn::user("ping"), Turn::assistant("pong")]
    );
}

#[tokio::test]
async fn test_stranger_is_turned_away() {
    let upstream = mock_upstreams("pong").await;
    let h = harness(&upstream, 4000);

    let mut stranger = message(1, "ping");
    stranger["from"]["id"] = json!(8);

    let body = post(&h.state, stranger).await;
    assert_eq!(
        body,
        json!({"type": "text", "body": "You are not authorized to use this bot."})
    );
    assert!(h.store.read("42").await.unwrap().is_empty());
}
