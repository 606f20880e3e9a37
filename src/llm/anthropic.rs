//! Anthropic Claude client.

use super::{LlmHttpConfig, build_http_client};
use crate::config::{DEFAULT_BASE_URL, DEFAULT_MODEL, LlmConfig};
use crate::{Error, Result};
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude LLM client.
pub struct AnthropicClient {
    /// API key.
    api_key: Option<SecretString>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::Client,
}

impl AnthropicClient {
    /// Creates a client with default settings and `ANTHROPIC_API_KEY`.
    #[must_use]
    pub fn new() -> Self {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        Self {
            api_key,
            endpoint: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            client: build_http_client(LlmHttpConfig::default().with_env_overrides()),
        }
    }

    /// Creates a client from the `[llm]` configuration.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            endpoint: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: build_http_client(LlmHttpConfig::from_config(config).with_env_overrides()),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets HTTP client timeouts.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    /// Model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns true if an API key is configured.
    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Validates that the client is configured with a plausible API key.
    fn validate(&self) -> Result<&SecretString> {
        let key = self.api_key.as_ref().ok_or_else(|| Error::OperationFailed {
            operation: "anthropic_request".to_string(),
            cause: "ANTHROPIC_API_KEY not set".to_string(),
        })?;

        if !Self::is_valid_api_key_format(key.expose_secret()) {
            return Err(Error::OperationFailed {
                operation: "anthropic_request".to_string(),
                cause: "Invalid API key format: expected 'sk-ant-' prefix".to_string(),
            });
        }

        Ok(key)
    }

    /// Checks the key shape: `sk-ant-` prefix, at least 40 characters, and
    /// only alphanumerics, hyphens, and underscores.
    fn is_valid_api_key_format(key: &str) -> bool {
        const MIN_KEY_LENGTH: usize = 40;
        const PREFIX: &str = "sk-ant-";

        if !key.starts_with(PREFIX) || key.len() < MIN_KEY_LENGTH {
            return false;
        }

        key.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Sends a Messages API request and returns the successful response.
    async fn send(&self, request: &MessagesRequest<'_>) -> Result<reqwest::Response> {
        let api_key = self.validate()?;

        tracing::debug!(
            provider = "anthropic",
            model = %self.model,
            stream = request.stream,
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else if e.is_request() {
                    "request"
                } else {
                    "unknown"
                };
                tracing::error!(
                    provider = "anthropic",
                    model = %self.model,
                    error = %e,
                    error_kind = error_kind,
                    is_timeout = e.is_timeout(),
                    is_connect = e.is_connect(),
                    "LLM request failed"
                );
                Error::OperationFailed {
                    operation: "anthropic_request".to_string(),
                    cause: format!("{error_kind} error: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                provider = "anthropic",
                model = %self.model,
                status = %status,
                body = %body,
                "LLM API returned error status"
            );
            return Err(Error::OperationFailed {
                operation: "anthropic_request".to_string(),
                cause: format!("API returned status: {status} - {body}"),
            });
        }

        Ok(response)
    }

    /// Generates a completion with a system prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the reply has no text.
    pub async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: user,
            }],
            stream: false,
        };

        let response: MessagesResponse =
            self.send(&request).await?.json().await.map_err(|e| {
                tracing::error!(
                    provider = "anthropic",
                    model = %self.model,
                    error = %e,
                    "Failed to parse LLM response"
                );
                Error::OperationFailed {
                    operation: "anthropic_response".to_string(),
                    cause: e.to_string(),
                }
            })?;

        let text: String = response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect();

        if text.is_empty() {
            return Err(Error::OperationFailed {
                operation: "anthropic_response".to_string(),
                cause: "No text content in response".to_string(),
            });
        }
        Ok(text)
    }

    /// Streams a completion, sending each text delta through `tx`.
    ///
    /// Returns early without error when the receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the connection drops, or the
    /// API reports an error event.
    pub async fn stream(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        tx: mpsc::Sender<String>,
    ) -> Result<()> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: user,
            }],
            stream: true,
        };

        let response = self.send(&request).await?;
        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::OperationFailed {
                operation: "anthropic_stream".to_string(),
                cause: e.to_string(),
            })?;

            for line in lines.push(&chunk) {
                match parse_sse_line(&line)? {
                    Some(SseAction::Text(text)) => {
                        if tx.send(text).await.is_err() {
                            tracing::debug!("Stream receiver dropped, stopping");
                            return Ok(());
                        }
                    },
                    Some(SseAction::Stop) => return Ok(()),
                    None => {},
                }
            }
        }

        if let Some(line) = lines.finish() {
            if let Some(SseAction::Stop) = parse_sse_line(&line)? {
                return Ok(());
            }
        }

        tracing::warn!(
            provider = "anthropic",
            model = %self.model,
            "Stream ended before message_stop"
        );
        Err(Error::OperationFailed {
            operation: "anthropic_stream".to_string(),
            cause: "stream ended before message_stop".to_string(),
        })
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a byte stream into complete SSE lines.
///
/// Bytes are decoded only once a full line has arrived, so a multi-byte
/// character split across network chunks survives intact.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    /// Appends a chunk and returns every line it completed.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }

    /// Returns the trailing line left without a newline, if any.
    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// What one SSE line means to the caller.
#[derive(Debug, PartialEq, Eq)]
enum SseAction {
    Text(String),
    Stop,
}

/// Parses one SSE line. Non-data lines and uninteresting events are `None`.
fn parse_sse_line(line: &str) -> Result<Option<SseAction>> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }

    let event: StreamEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparsable SSE event");
            return Ok(None);
        },
    };

    match event {
        StreamEvent::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        } if !text.is_empty() => Ok(Some(SseAction::Text(text))),
        StreamEvent::MessageStop => Ok(Some(SseAction::Stop)),
        StreamEvent::Error { error } => Err(Error::OperationFailed {
            operation: "anthropic_stream".to_string(),
            cause: format!("{}: {}", error.error_type, error.message),
        }),
        _ => Ok(None),
    }
}

/// Request to the Messages API.
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// A message in the conversation.
#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response from the Messages API.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

/// A content block in the response.
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

/// Server-sent event payloads of a streaming response.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: ApiError },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}
