//! LLM backend abstraction and implementations.
//!
//! Defines an enum-based dispatch for oracle backends, avoiding the
//! dyn-compatibility issues with async trait methods. Concrete
//! implementations exist for OpenAI-compatible APIs and the Anthropic
//! Messages API (both over HTTP via `reqwest`, with SSE token streaming),
//! plus the deterministic [`ScriptedOracle`] used by tests and offline
//! runs.
//!
//! Tokens are forwarded through a caller-supplied sink as they arrive.
//! Tokens are for observers only; the parsed response is authoritative.

use futures::StreamExt;
use serde_json::Value;

use emotionsim_types::AgentResponse;

use crate::config::{BackendType, OracleConfig};
use crate::error::OracleError;
use crate::parse::parse_agent_response;
use crate::prompt::RenderedPrompt;
use crate::scripted::ScriptedOracle;

/// Callback receiving each streamed token.
pub type TokenSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// One oracle invocation.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// The agent this call is for (scripted lookups, logging).
    pub agent_name: String,
    /// Model identifier.
    pub model: String,
    /// Rendered system and user messages.
    pub prompt: RenderedPrompt,
    /// Sampling temperature.
    pub temperature: f64,
    /// Whether to stream tokens (HTTP backends; the scripted backend
    /// always emits synthetic tokens).
    pub stream: bool,
}

/// An oracle backend that can process a prompt and return a response.
///
/// Uses enum dispatch instead of trait objects because async methods are
/// not dyn-compatible in Rust.
pub enum OracleClient {
    /// OpenAI-compatible chat completions API.
    OpenAi(OpenAiBackend),
    /// Anthropic Messages API.
    Anthropic(AnthropicBackend),
    /// Deterministic canned responses.
    Scripted(ScriptedOracle),
}

impl OracleClient {
    /// Build a client from configuration.
    pub fn from_config(config: &OracleConfig) -> Self {
        match config.backend_type {
            BackendType::OpenAi => Self::OpenAi(OpenAiBackend::new(config)),
            BackendType::Anthropic => Self::Anthropic(AnthropicBackend::new(config)),
            BackendType::Scripted => Self::Scripted(ScriptedOracle::new()),
        }
    }

    /// Human-readable backend name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
            Self::Scripted(_) => "scripted",
        }
    }

    /// Invoke the oracle: stream tokens into `on_token`, then parse the
    /// final text into the typed response schema.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Backend`] for transport failures and
    /// [`OracleError::Parse`]/[`OracleError::EmptyResponse`] when the text
    /// does not validate against the schema.
    pub async fn generate(
        &self,
        request: &OracleRequest,
        on_token: TokenSink<'_>,
    ) -> Result<AgentResponse, OracleError> {
        let raw = match self {
            Self::OpenAi(backend) => backend.complete(request, on_token).await?,
            Self::Anthropic(backend) => backend.complete(request, on_token).await?,
            Self::Scripted(oracle) => return oracle.generate(&request.agent_name, on_token),
        };
        parse_agent_response(&raw)
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------------

/// Backend for OpenAI-compatible chat completions APIs.
///
/// Works with `OpenAI`, `DeepSeek`, and Ollama endpoints. Sends requests
/// to `{api_url}/chat/completions`.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    max_tokens: u32,
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
        }
    }

    /// Send a prompt and return the full response text, forwarding tokens
    /// when streaming.
    async fn complete(
        &self,
        request: &OracleRequest,
        on_token: TokenSink<'_>,
    ) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.api_url);
        let body = serde_json::json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.prompt.system},
                {"role": "user", "content": request.prompt.user}
            ],
            "temperature": request.temperature,
            "max_tokens": self.max_tokens,
            "stream": request.stream,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Backend(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(OracleError::Backend(format!(
                "OpenAI returned {status}: {error_body}"
            )));
        }

        if request.stream {
            drain_sse(response, on_token, extract_openai_delta).await
        } else {
            let json: Value = response.json().await.map_err(|e| {
                OracleError::Backend(format!("OpenAI response parse failed: {e}"))
            })?;
            extract_openai_content(&json)
        }
    }
}

/// Extract the text content from a non-streaming `OpenAI` response.
fn extract_openai_content(json: &Value) -> Result<String, OracleError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            OracleError::Backend("OpenAI response missing choices[0].message.content".to_owned())
        })
}

/// Extract the token from one `OpenAI` streaming chunk.
fn extract_openai_delta(json: &Value) -> Option<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

// ---------------------------------------------------------------------------
// Anthropic Messages API backend
// ---------------------------------------------------------------------------

/// Backend for the Anthropic Messages API.
///
/// Anthropic uses a different request format from `OpenAI`:
/// - `x-api-key` header instead of `Authorization: Bearer`
/// - `system` is a top-level field rather than a message
/// - Responses carry `content[0].text`; stream chunks carry
///   `delta.text` on `content_block_delta` events
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    /// Create a new Anthropic Messages API backend.
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
        }
    }

    /// Send a prompt and return the full response text, forwarding tokens
    /// when streaming.
    async fn complete(
        &self,
        request: &OracleRequest,
        on_token: TokenSink<'_>,
    ) -> Result<String, OracleError> {
        let url = format!("{}/messages", self.api_url);
        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": self.max_tokens,
            "system": request.prompt.system,
            "temperature": request.temperature,
            "messages": [
                {"role": "user", "content": request.prompt.user}
            ],
            "stream": request.stream,
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Backend(format!("Anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(OracleError::Backend(format!(
                "Anthropic returned {status}: {error_body}"
            )));
        }

        if request.stream {
            drain_sse(response, on_token, extract_anthropic_delta).await
        } else {
            let json: Value = response.json().await.map_err(|e| {
                OracleError::Backend(format!("Anthropic response parse failed: {e}"))
            })?;
            extract_anthropic_content(&json)
        }
    }
}

/// Extract the text content from a non-streaming Anthropic response.
fn extract_anthropic_content(json: &Value) -> Result<String, OracleError> {
    json.get("content")
        .and_then(|c| c.get(0))
        .and_then(|b| b.get("text"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| OracleError::Backend("Anthropic response missing content[0].text".to_owned()))
}

/// Extract the token from one Anthropic streaming chunk.
fn extract_anthropic_delta(json: &Value) -> Option<String> {
    if json.get("type").and_then(Value::as_str) != Some("content_block_delta") {
        return None;
    }
    json.get("delta")
        .and_then(|d| d.get("text"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

// ---------------------------------------------------------------------------
// SSE draining
// ---------------------------------------------------------------------------

/// Drain a server-sent-events body, forwarding each extracted token to the
/// sink and returning the concatenated text.
async fn drain_sse(
    response: reqwest::Response,
    on_token: TokenSink<'_>,
    extract: fn(&Value) -> Option<String>,
) -> Result<String, OracleError> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut text = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| OracleError::Backend(format!("stream read failed: {e}")))?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(newline) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline).collect();
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            let Ok(json) = serde_json::from_str::<Value>(data) else {
                continue;
            };
            if let Some(token) = extract(&json) {
                on_token(&token);
                text.push_str(&token);
            }
        }
    }

    if text.is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    Ok(text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn extract_openai_content_valid() {
        let json = serde_json::json!({
            "choices": [{
                "message": {"content": "{\"actions\": []}"}
            }]
        });
        assert!(extract_openai_content(&json).is_ok());
    }

    #[test]
    fn extract_openai_content_missing_choices() {
        let json = serde_json::json!({"error": "rate_limit"});
        assert!(extract_openai_content(&json).is_err());
    }

    #[test]
    fn extract_openai_delta_token() {
        let json = serde_json::json!({
            "choices": [{"delta": {"content": "hel"}}]
        });
        assert_eq!(extract_openai_delta(&json), Some("hel".to_owned()));
    }

    #[test]
    fn extract_anthropic_content_valid() {
        let json = serde_json::json!({
            "content": [{"type": "text", "text": "{\"actions\": []}"}]
        });
        assert!(extract_anthropic_content(&json).is_ok());
    }

    #[test]
    fn extract_anthropic_delta_token() {
        let json = serde_json::json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "lo"}
        });
        assert_eq!(extract_anthropic_delta(&json), Some("lo".to_owned()));
    }

    #[test]
    fn extract_anthropic_delta_ignores_other_events() {
        let json = serde_json::json!({"type": "message_start"});
        assert_eq!(extract_anthropic_delta(&json), None);
    }

    #[test]
    fn from_config_dispatches() {
        let mut config = OracleConfig::default();
        assert_eq!(OracleClient::from_config(&config).name(), "openai-compatible");
        config.backend_type = BackendType::Anthropic;
        assert_eq!(OracleClient::from_config(&config).name(), "anthropic");
        config.backend_type = BackendType::Scripted;
        assert_eq!(OracleClient::from_config(&config).name(), "scripted");
    }

    #[tokio::test]
    async fn scripted_generate_roundtrips_through_client() {
        let oracle = ScriptedOracle::new();
        oracle.push_response(
            "Ada",
            AgentResponse {
                reasoning: "resting".to_owned(),
                ..AgentResponse::default()
            },
        );
        let client = OracleClient::Scripted(oracle);
        let request = OracleRequest {
            agent_name: "Ada".to_owned(),
            model: "scripted".to_owned(),
            prompt: RenderedPrompt {
                system: String::new(),
                user: String::new(),
            },
            temperature: 0.0,
            stream: true,
        };
        let sink = |_: &str| {};
        let response = client.generate(&request, &sink).await.unwrap();
        assert_eq!(response.reasoning, "resting");
    }
}
