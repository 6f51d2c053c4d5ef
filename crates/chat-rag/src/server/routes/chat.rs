//! Chat page and streamed replies

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Deserializer};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::CurrentUser;
use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::providers::ChatProvider;
use crate::server::state::AppState;
use crate::types::{ChatMessage, StoredMessage};

/// GET / - the chat page
pub async fn index(State(state): State<AppState>) -> Result<Html<String>> {
    let path = state.config().server.static_dir.join("index.html");
    let page = tokio::fs::read_to_string(&path).await.map_err(|e| {
        tracing::error!("Cannot read {}: {}", path.display(), e);
        Error::NotFound("Chat page".to_string())
    })?;
    Ok(Html(page))
}

/// Form body of `POST /`
#[derive(Debug, Deserialize)]
pub struct PromptForm {
    #[serde(rename = "inputText")]
    pub input_text: String,
}

/// POST / - stream a reply to a single prompt, no history
pub async fn prompt(State(state): State<AppState>, Form(form): Form<PromptForm>) -> Result<Response> {
    let prompt = form.input_text.trim();
    if prompt.is_empty() {
        return Err(Error::BadRequest("inputText is empty".to_string()));
    }

    let context = retrieve_context(&state, prompt).await;
    let messages = vec![ChatMessage::user(PromptBuilder::augment(prompt, &context))];

    Ok(stream_response(relay(state, messages, None), "text/event-stream"))
}

/// JSON body of `POST /send_message`
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(deserialize_with = "session_id_from_number_or_string")]
    pub session_id: i64,
}

/// Session ids arrive as numbers, or as strings when read from DOM attributes
fn session_id_from_number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(id) => Ok(id),
        Id::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// POST /send_message - stream a reply within a chat session
///
/// The user message is stored before generation starts, the bot reply once the
/// stream ends.
pub async fn send_message(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    Json(request): Json<SendMessageRequest>,
) -> Result<Response> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(Error::BadRequest("Message is empty".to_string()));
    }

    let session = state.db().get_user_session(request.session_id, user.id)?;
    let window = state.config().llm.history_window;
    let history = state.db().recent_messages(session.id, window)?;
    state.db().add_message(session.id, true, message)?;

    let context = retrieve_context(&state, message).await;
    let prompt = PromptBuilder::augment(message, &context);
    let messages = PromptBuilder::conversation(&history, &prompt, window);

    tracing::debug!(
        "Relaying {} messages for session {} to {}",
        messages.len(),
        session.id,
        state.chat().model()
    );

    Ok(stream_response(
        relay(state, messages, Some(session.id)),
        "text/plain; charset=utf-8",
    ))
}

/// GET /chat_history/:session_id - messages of one of the user's sessions
pub async fn chat_history(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(session_id): Path<i64>,
) -> Result<Json<Vec<StoredMessage>>> {
    let session = state.db().get_user_session(session_id, user.id)?;
    Ok(Json(state.db().list_messages(session.id)?))
}

/// Retrieved context for `prompt`; retrieval failures degrade to no context
async fn retrieve_context(state: &AppState, prompt: &str) -> String {
    if !state.config().retrieval.enabled {
        return String::new();
    }
    match state.retriever().query_context(prompt).await {
        Ok(context) => context,
        Err(e) => {
            tracing::warn!("Retrieval failed, answering without context: {}", e);
            String::new()
        }
    }
}

type BodyChunks = ReceiverStream<std::result::Result<Bytes, Infallible>>;

fn stream_response(body: BodyChunks, content_type: &'static str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// Generate on a background task and hand tokens to the response body
///
/// With a session id the full reply is stored before the body ends.
fn relay(state: AppState, messages: Vec<ChatMessage>, session_id: Option<i64>) -> BodyChunks {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let reply = forward_tokens(state.chat().as_ref(), &messages, &tx).await;

        if let Some(session_id) = session_id {
            if !reply.is_empty() {
                if let Err(e) = state.db().add_message(session_id, false, &reply) {
                    tracing::error!("Failed to store reply for session {}: {}", session_id, e);
                }
            }
        }
        drop(tx);
    });

    ReceiverStream::new(rx)
}

/// Forward model tokens to `tx`, returning the text generated
///
/// A failure to start or an error mid-stream is reported in-band and ends the reply.
async fn forward_tokens(
    chat: &dyn ChatProvider,
    messages: &[ChatMessage],
    tx: &mpsc::Sender<std::result::Result<Bytes, Infallible>>,
) -> String {
    let mut reply = String::new();

    let mut stream = match chat.stream_chat(messages).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Failed to start generation: {}", e);
            let _ = tx.send(Ok(error_chunk(&e))).await;
            return reply;
        }
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(token) => {
                reply.push_str(&token);
                if tx.send(Ok(Bytes::from(token))).await.is_err() {
                    tracing::info!("Client went away, stopping generation");
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Generation failed mid-stream: {}", e);
                let _ = tx.send(Ok(error_chunk(&e))).await;
                break;
            }
        }
    }

    reply
}

fn error_chunk(error: &Error) -> Bytes {
    Bytes::from(format!("\n[error: {}]", error))
}
