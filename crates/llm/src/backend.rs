//! Streaming chat backend
//!
//! OpenAI-compatible `/chat/completions` with `stream: true`. Tokens arrive
//! as SSE `data:` lines; each delta is forwarded on a channel so the
//! sentence chunker can start TTS before generation finishes.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::prompt::Message;
use crate::LlmError;

/// One streamed token delta
#[derive(Debug, Clone)]
pub enum TokenChunk {
    Delta(String),
    Done {
        input_tokens: u64,
        output_tokens: u64,
    },
    Error(String),
}

/// Per-request generation parameters
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Streaming chat backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Stream deltas onto `tx`; resolves when generation completes.
    /// Dropping the receiver cancels the generation.
    async fn generate_streaming(
        &self,
        request: &ChatRequest,
        tx: mpsc::Sender<TokenChunk>,
    ) -> Result<(), LlmError>;

    /// Convenience non-streaming wrapper
    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let (tx, mut rx) = mpsc::channel(64);
        let mut text = String::new();

        // Drain concurrently so a full channel cannot deadlock generation
        let driver = self.generate_streaming(request, tx);
        tokio::pin!(driver);

        let mut driver_done = false;
        loop {
            tokio::select! {
                result = &mut driver, if !driver_done => {
                    result?;
                    driver_done = true;
                }
                chunk = rx.recv() => {
                    match chunk {
                        Some(TokenChunk::Delta(delta)) => text.push_str(&delta),
                        Some(TokenChunk::Error(e)) => return Err(LlmError::Generation(e)),
                        Some(TokenChunk::Done { .. }) | None => break,
                    }
                }
            }
        }

        Ok(text)
    }
}

/// OpenAI-compatible backend configuration
#[derive(Debug, Clone)]
pub struct HttpChatConfig {
    /// API base, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Default for HttpChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// OpenAI-compatible streaming chat client
pub struct HttpChatBackend {
    config: HttpChatConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: usize,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    delta: WireDelta,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl HttpChatBackend {
    pub fn new(config: HttpChatConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "LLM API key not set".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn generate_streaming(
        &self,
        request: &ChatRequest,
        tx: mpsc::Sender<TokenChunk>,
    ) -> Result<(), LlmError> {
        let wire = WireRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&wire)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut usage = (0u64, 0u64);

        while let Some(bytes) = stream.next().await {
            let bytes = bytes?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // SSE frames are newline-delimited `data:` lines
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();

                if data == "[DONE]" {
                    let _ = tx
                        .send(TokenChunk::Done {
                            input_tokens: usage.0,
                            output_tokens: usage.1,
                        })
                        .await;
                    return Ok(());
                }

                let chunk: WireChunk = match serde_json::from_str(data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::debug!("Skipping unparseable stream chunk: {}", e);
                        continue;
                    },
                };

                if let Some(u) = chunk.usage {
                    usage = (u.prompt_tokens, u.completion_tokens);
                }

                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() && tx.send(TokenChunk::Delta(content)).await.is_err()
                        {
                            // Receiver dropped: generation cancelled
                            return Ok(());
                        }
                    }
                }
            }
        }

        let _ = tx
            .send(TokenChunk::Done {
                input_tokens: usage.0,
                output_tokens: usage.1,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_rejected() {
        let config = HttpChatConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(HttpChatBackend::new(config).is_err());
    }

    #[test]
    fn test_wire_chunk_parsing() {
        let chunk: WireChunk = serde_json::from_str(
            r#"{"choices": [{"delta": {"content": "Hel"}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));

        // Usage-only final chunk has no choices
        let tail: WireChunk = serde_json::from_str(
            r#"{"choices": [], "usage": {"prompt_tokens": 20, "completion_tokens": 9}}"#,
        )
        .unwrap();
        assert!(tail.choices.is_empty());
        assert_eq!(tail.usage.unwrap().completion_tokens, 9);
    }
}
