//! Route tests against stub providers

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

use super::build_router;
use super::state::{AppState, Providers};
use crate::auth;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::generation::TokenStream;
use crate::ingestion::OcrEngine;
use crate::providers::{ChatProvider, EmbeddingProvider, MemoryVectorStore, VectorStoreProvider};
use crate::storage::ChatDb;
use crate::types::{ChatMessage, Role, StoredDocument};

/// What the stub model does when asked
#[derive(Clone)]
enum Script {
    Tokens(Vec<&'static str>),
    FailMidStream(Vec<&'static str>),
    FailStart,
}

struct StubChat {
    script: Script,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl ChatProvider for StubChat {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        self.requests.lock().push(messages.to_vec());

        let items: Vec<Result<String>> = match &self.script {
            Script::FailStart => return Err(Error::llm("model not loaded")),
            Script::Tokens(tokens) => tokens.iter().map(|t| Ok(t.to_string())).collect(),
            Script::FailMidStream(tokens) => tokens
                .iter()
                .map(|t| Ok(t.to_string()))
                .chain(std::iter::once(Err(Error::llm("boom"))))
                .chain(std::iter::once(Ok("never sent".to_string())))
                .collect(),
        };
        Ok(futures::stream::iter(items).boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-model"
    }
}

/// Texts mentioning rust land at the origin, everything else far away
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.to_lowercase().contains("rust") {
            Ok(vec![0.0, 0.0])
        } else {
            Ok(vec![10.0, 10.0])
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

struct NoOcr;

impl OcrEngine for NoOcr {
    fn recognize_image(&self, _data: &[u8], _extension: &str) -> Result<String> {
        Err(Error::extraction("image", "OCR unavailable"))
    }

    fn recognize_pdf(&self, _data: &[u8]) -> Result<String> {
        Err(Error::extraction("pdf", "OCR unavailable"))
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "none"
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    chat: Arc<StubChat>,
    store: Arc<MemoryVectorStore>,
    _dir: tempfile::TempDir,
}

fn test_app(script: Script) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.ingestion.upload_dir = dir.path().join("uploads");

    let chat = Arc::new(StubChat {
        script,
        requests: Mutex::new(Vec::new()),
    });
    let store = Arc::new(MemoryVectorStore::new());
    let providers = Providers {
        chat: chat.clone(),
        embedder: Arc::new(KeywordEmbedder),
        vector_store: store.clone(),
        ocr: Arc::new(NoOcr),
    };

    let state = AppState::from_parts(config, providers, ChatDb::in_memory().unwrap());
    TestApp {
        router: build_router(state.clone()),
        state,
        chat,
        store,
        _dir: dir,
    }
}

impl TestApp {
    /// Register a user directly; returns (user id, first session id, token)
    fn user(&self, name: &str) -> (i64, i64, String) {
        let (user, session) =
            auth::register(self.state.db(), &self.state.config().auth, name, "password123").unwrap();
        let token = self
            .state
            .db()
            .create_token(user.id, chrono::Duration::hours(1))
            .unwrap();
        (user.id, session.id, token)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HashMap<String, String>, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("chat_rag_session={}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn form_request(input: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("inputText={}", input)))
        .unwrap()
}

async fn add_rust_document(store: &MemoryVectorStore) {
    store
        .upsert(StoredDocument {
            id: "docs/rust.txt".to_string(),
            content: "Rust 1.0 was released in May 2015.".to_string(),
            embedding: vec![0.0, 0.0],
            metadata: HashMap::new(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = test_app(Script::Tokens(vec![]));
    let (status, _, body) = app.send(get_request("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let (status, _, _) = app.send(get_request("/ready", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_index_page() {
    let app = test_app(Script::Tokens(vec![]));
    let (status, headers, body) = app.send(get_request("/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers["content-type"].starts_with("text/html"));
    assert!(body.contains("chat-form"));
}

#[tokio::test]
async fn test_form_prompt_streams_tokens() {
    let app = test_app(Script::Tokens(vec!["Hello", ", ", "world"]));
    let (status, headers, body) = app.send(form_request("Hi+there")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(body, "Hello, world");

    let requests = app.chat.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0], vec![ChatMessage::user("Hi there")]);
}

#[tokio::test]
async fn test_form_prompt_is_augmented_with_close_documents() {
    let app = test_app(Script::Tokens(vec!["ok"]));
    add_rust_document(&app.store).await;

    app.send(form_request("When+was+Rust+released%3F")).await;
    app.send(form_request("What+is+the+weather%3F")).await;

    let requests = app.chat.requests.lock();
    let augmented = &requests[0][0].content;
    assert!(augmented.contains("Context:\nRust 1.0 was released in May 2015."));
    assert!(augmented.ends_with("Question: When was Rust released?"));
    assert_eq!(requests[1][0].content, "What is the weather?");
}

#[tokio::test]
async fn test_blank_form_prompt_rejected() {
    let app = test_app(Script::Tokens(vec!["x"]));
    let (status, _, _) = app.send(form_request("+++")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.chat.requests.lock().is_empty());
}

#[tokio::test]
async fn test_send_message_requires_login() {
    let app = test_app(Script::Tokens(vec!["x"]));
    let request = json_request("POST", "/send_message", None, serde_json::json!({"message": "hi", "session_id": 1}));
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("unauthorized"));
}

#[tokio::test]
async fn test_send_message_stores_conversation() {
    let app = test_app(Script::Tokens(vec!["Hi", " Alice"]));
    let (_, session_id, token) = app.user("alice");

    let request = json_request(
        "POST",
        "/send_message",
        Some(&token),
        serde_json::json!({"message": "Hello bot", "session_id": session_id}),
    );
    let (status, headers, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/plain; charset=utf-8");
    assert_eq!(body, "Hi Alice");

    // Session id as a string, the way the page reads it from the DOM
    let request = json_request(
        "POST",
        "/send_message",
        Some(&token),
        serde_json::json!({"message": "And again", "session_id": session_id.to_string()}),
    );
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let requests = app.chat.requests.lock();
    let roles: Vec<Role> = requests[1].iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    assert_eq!(requests[1][1].content, "Hi Alice");
    drop(requests);

    let (status, _, body) = app
        .send(get_request(&format!("/chat_history/{}", session_id), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    let history: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    let entries: Vec<(bool, &str)> = history
        .iter()
        .map(|m| (m["is_user"].as_bool().unwrap(), m["content"].as_str().unwrap()))
        .collect();
    assert_eq!(
        entries,
        vec![(true, "Hello bot"), (false, "Hi Alice"), (true, "And again"), (false, "Hi Alice")]
    );
}

#[tokio::test]
async fn test_other_users_session_is_not_found() {
    let app = test_app(Script::Tokens(vec!["x"]));
    let (_, alice_session, _) = app.user("alice");
    let (_, _, bob_token) = app.user("bob");

    let request = json_request(
        "POST",
        "/send_message",
        Some(&bob_token),
        serde_json::json!({"message": "peek", "session_id": alice_session}),
    );
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = app
        .send(get_request(&format!("/chat_history/{}", alice_session), Some(&bob_token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.state.db().list_messages(alice_session).unwrap().is_empty());
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_partial_reply() {
    let app = test_app(Script::FailMidStream(vec!["Par", "tial"]));
    let (_, session_id, token) = app.user("alice");

    let request = json_request(
        "POST",
        "/send_message",
        Some(&token),
        serde_json::json!({"message": "go", "session_id": session_id}),
    );
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Partial\n[error: LLM error: boom]");

    let stored = app.state.db().list_messages(session_id).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content, "Partial");
    assert!(!stored[1].is_user);
}

#[tokio::test]
async fn test_failed_start_reports_error_in_body() {
    let app = test_app(Script::FailStart);
    let (_, session_id, token) = app.user("alice");

    let request = json_request(
        "POST",
        "/send_message",
        Some(&token),
        serde_json::json!({"message": "go", "session_id": session_id}),
    );
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "\n[error: LLM error: model not loaded]");

    let stored = app.state.db().list_messages(session_id).unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].is_user);
}

#[tokio::test]
async fn test_session_management() {
    let app = test_app(Script::Tokens(vec![]));
    let (_, first_session, token) = app.user("alice");

    let (status, _, body) = app
        .send(json_request("POST", "/sessions", Some(&token), serde_json::json!({"name": "  Recipes "})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(created["name"], "Recipes");
    let created_id = created["id"].as_i64().unwrap();

    let (status, _, body) = app
        .send(json_request(
            "PATCH",
            &format!("/sessions/{}", first_session),
            Some(&token),
            serde_json::json!({"name": "Renamed"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Renamed"));

    let (status, _, _) = app
        .send(json_request(
            "PATCH",
            &format!("/sessions/{}", first_session),
            Some(&token),
            serde_json::json!({"name": "   "}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = app
        .send(json_request("DELETE", &format!("/sessions/{}", created_id), Some(&token), serde_json::json!({})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = app.send(get_request("/sessions", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let sessions: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["name"], "Renamed");
}

#[tokio::test]
async fn test_register_login_logout() {
    let app = test_app(Script::Tokens(vec![]));
    let credentials = serde_json::json!({"username": "carol", "password": "password123"});

    let (status, headers, body) = app
        .send(json_request("POST", "/register", None, credentials.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(headers["set-cookie"].starts_with("chat_rag_session="));
    let registered: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(registered["session"]["name"], "New Chat");
    assert!(registered["user"].get("password_hash").is_none());

    let (status, _, _) = app.send(json_request("POST", "/register", None, credentials.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, body) = app.send(json_request("POST", "/login", None, credentials)).await;
    assert_eq!(status, StatusCode::OK);
    let logged_in: serde_json::Value = serde_json::from_str(&body).unwrap();
    let token = logged_in["token"].as_str().unwrap().to_string();

    let (status, _, body) = app.send(get_request("/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("carol"));

    let (status, headers, _) = app
        .send(json_request("POST", "/logout", Some(&token), serde_json::json!({})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(headers["set-cookie"].contains("Max-Age=0"));

    let (status, _, _) = app.send(get_request("/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app
        .send(json_request(
            "POST",
            "/login",
            None,
            serde_json::json!({"username": "carol", "password": "nope-nope"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upload_ingests_accepted_files() {
    let app = test_app(Script::Tokens(vec![]));
    let (_, _, token) = app.user("alice");

    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"rust notes.txt\"\r\nContent-Type: text/plain\r\n\r\nRust has no garbage collector.\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"tool.exe\"\r\nContent-Type: application/octet-stream\r\n\r\nMZ\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"empty.txt\"\r\nContent-Type: text/plain\r\n\r\n\r\n\
         --{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap();

    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();

    let accepted = report["accepted"].as_array().unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0]["filename"], "rust notes.txt");
    assert_eq!(accepted[0]["status"], "added");
    let stored_as = accepted[0]["stored_as"].as_str().unwrap();
    assert!(stored_as.ends_with("_rust_notes.txt"));
    assert!(std::path::Path::new(stored_as).exists());

    assert_eq!(report["rejected"].as_array().unwrap().len(), 2);
    assert_eq!(app.store.len().await.unwrap(), 1);

    let matches = app.store.query(&[0.0, 0.0], 1).await.unwrap();
    assert_eq!(matches[0].content, "Rust has no garbage collector.");
}

fn upload_request(token: &str, filename: &str, content: &str) -> Request<Body> {
    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
        b = boundary,
        f = filename,
        c = content
    );
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_reupload_of_same_file_is_unchanged() {
    let app = test_app(Script::Tokens(vec!["ok"]));
    let (_, _, token) = app.user("alice");

    let (_, _, first) = app.send(upload_request(&token, "rust.txt", "Rust is fast.")).await;
    let (status, _, second) = app.send(upload_request(&token, "rust.txt", "Rust is fast.")).await;
    assert_eq!(status, StatusCode::OK);

    let first: serde_json::Value = serde_json::from_str(&first).unwrap();
    let second: serde_json::Value = serde_json::from_str(&second).unwrap();
    assert_eq!(first["accepted"][0]["status"], "added");
    assert_eq!(second["accepted"][0]["status"], "unchanged");
    assert_eq!(first["accepted"][0]["stored_as"], second["accepted"][0]["stored_as"]);
    assert_eq!(app.store.len().await.unwrap(), 1);
    assert_eq!(std::fs::read_dir(&app.state.config().ingestion.upload_dir).unwrap().count(), 1);

    app.send(form_request("tell+me+about+rust")).await;
    let requests = app.chat.requests.lock();
    assert_eq!(requests[0][0].content.matches("Rust is fast.").count(), 1);
}

#[tokio::test]
async fn test_upload_with_new_content_is_a_new_document() {
    let app = test_app(Script::Tokens(vec![]));
    let (_, _, token) = app.user("alice");

    app.send(upload_request(&token, "notes.txt", "Rust is fast.")).await;
    let (_, _, body) = app.send(upload_request(&token, "notes.txt", "Rust is safe.")).await;

    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["accepted"][0]["status"], "added");
    assert_eq!(app.store.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_upload_requires_login() {
    let app = test_app(Script::Tokens(vec![]));
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=B")
        .body(Body::from("--B--\r\n"))
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_info() {
    let app = test_app(Script::Tokens(vec![]));
    add_rust_document(&app.store).await;

    let (status, _, body) = app.send(get_request("/api/info", None)).await;
    assert_eq!(status, StatusCode::OK);
    let info: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(info["name"], "chat-rag");
    assert_eq!(info["models"]["chat"], "stub-model");
    assert_eq!(info["vector_store"]["backend"], "memory");
    assert_eq!(info["vector_store"]["documents"], 1);
}
