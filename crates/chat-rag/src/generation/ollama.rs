//! Ollama client for embeddings and streamed chat

use bytes::Bytes;
use futures::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::types::ChatMessage;

/// Stream of generated tokens, in order
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Ollama API client
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Chat model name
    pub fn chat_model(&self) -> &str {
        &self.config.chat_model
    }

    /// Embedding model name
    pub fn embed_model(&self) -> &str {
        &self.config.embed_model
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Generate an embedding using Ollama
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url);
        let request = EmbedRequest {
            model: &self.config.embed_model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!(
                "Embedding failed: HTTP {} - {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embedding response: {}", e)))?;

        if embed_response.embedding.is_empty() {
            return Err(Error::embedding(format!(
                "Model '{}' returned an empty embedding",
                self.config.embed_model
            )));
        }

        Ok(embed_response.embedding)
    }

    /// Start a streamed chat completion
    ///
    /// Yields each non-empty `message.content` fragment as it arrives.
    pub async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let url = format!("{}/api/chat", self.config.base_url);
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages,
            stream: true,
        };

        tracing::info!(
            "Streaming chat with model {} ({} messages)",
            self.config.chat_model,
            messages.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::llm(format!("Chat request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::llm(format!("Chat failed: HTTP {} - {}", status, body)));
        }

        Ok(decode_chat_stream(Box::pin(response.bytes_stream())))
    }
}

/// Splits a byte stream into newline-terminated lines
///
/// Bytes are buffered until a newline arrives, so a JSON object split across
/// network chunks (or a multi-byte character split across them) stays intact.
#[derive(Debug, Default)]
pub struct NdjsonLines {
    buffer: Vec<u8>,
}

impl NdjsonLines {
    /// Feed bytes, returning every line completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Flush the trailing unterminated line, if any
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// Parsed chat stream line
#[derive(Debug, PartialEq)]
enum ChatEvent {
    Token(String),
    Done,
}

fn parse_chat_line(line: &str) -> Result<Vec<ChatEvent>> {
    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| Error::llm(format!("Malformed stream line: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(Error::llm(error));
    }

    let mut events = Vec::new();
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            events.push(ChatEvent::Token(message.content));
        }
    }
    if chunk.done {
        events.push(ChatEvent::Done);
    }
    Ok(events)
}

struct DecodeState<S> {
    body: S,
    lines: NdjsonLines,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn enqueue(&mut self, line: &str) {
        match parse_chat_line(line) {
            Ok(events) => {
                for event in events {
                    match event {
                        ChatEvent::Token(token) => self.pending.push_back(Ok(token)),
                        ChatEvent::Done => self.finished = true,
                    }
                }
            }
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }
}

/// Decode an Ollama `/api/chat` NDJSON body into a token stream
///
/// The stream ends after the `done` object, the end of the body, or the first error.
pub fn decode_chat_stream<S, E>(body: S) -> TokenStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        body,
        lines: NdjsonLines::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for line in st.lines.push(&bytes) {
                        st.enqueue(&line);
                        if st.finished {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(Error::llm(format!("Stream error: {}", e))));
                    st.finished = true;
                }
                None => {
                    if let Some(line) = st.lines.finish() {
                        st.enqueue(&line);
                    }
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}
