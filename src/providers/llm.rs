//! LLM client: OpenAI-compatible `/chat/completions` with constrained
//! JSON-schema output.
//!
//! The planner and assessor treat the model as a structured-output oracle:
//! temperature 0, `response_format: json_schema` (strict), and a
//! distinguished [`LlmError::NoOutput`] variant so the bridge's retry
//! ladders can tell "the model produced nothing" apart from transport
//! failures.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{sanitize_http_error_body, DEFAULT_TIMEOUT};

/// Errors returned by the LLM provider.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP transport failure (includes per-call timeout).
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Upstream responded with a non-success status.
    #[error("llm returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Response did not match the expected schema.
    #[error("llm response parse error: {0}")]
    Parse(String),
    /// The model returned an empty or missing completion.
    #[error("No output generated: {0}")]
    NoOutput(String),
}

impl LlmError {
    /// Whether the bridge's model/payload retry ladders should advance to
    /// the next variant.
    pub fn is_no_output(&self) -> bool {
        matches!(self, Self::NoOutput(_))
    }
}

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Chat completion request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct LlmRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<WireMessage>,
    /// Always 0 — planning and scoring must be deterministic.
    pub temperature: f32,
    /// Completion cap.
    pub max_tokens: u32,
    /// Strict JSON-schema constraint, when structured output is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

/// A chat message on the wire.
#[doc(hidden)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Plain text content.
    pub content: String,
}

/// Chat completion response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    /// Response choices.
    #[serde(default)]
    pub choices: Vec<LlmChoice>,
    /// Model that served the response.
    #[serde(default)]
    pub model: Option<String>,
}

/// One response choice.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct LlmChoice {
    /// Assistant message.
    pub message: LlmResponseMessage,
}

/// Assistant message from the model.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct LlmResponseMessage {
    /// Text content; absent or empty counts as no output.
    #[serde(default)]
    pub content: Option<String>,
}

/// Build a strict `json_schema` response-format block.
#[doc(hidden)]
pub fn json_schema_format(name: &str, schema: &Value) -> Value {
    serde_json::json!({
        "type": "json_schema",
        "json_schema": { "name": name, "strict": true, "schema": schema }
    })
}

/// Extract the completion text from a response body.
///
/// # Errors
///
/// Returns `LlmError::Parse` for malformed bodies and `LlmError::NoOutput`
/// when the completion is empty.
#[doc(hidden)]
pub fn parse_completion(body: &str) -> Result<String, LlmError> {
    let resp: LlmResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Parse(e.to_string()))?;
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(LlmError::NoOutput("empty completion".to_string()));
    }
    Ok(content)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat-completions client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LlmClient {
    /// Create a client sharing the process-global HTTP client.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(url)
            .timeout(DEFAULT_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
                body: sanitize_http_error_body(&body),
            });
        }
        parse_completion(&body)
    }

    /// Request a completion constrained to `schema`, returning the parsed
    /// JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::NoOutput`] for empty completions, `Parse` when
    /// the completion is not valid JSON, and transport errors otherwise.
    pub async fn complete_json(
        &self,
        model: &str,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: &Value,
    ) -> Result<Value, LlmError> {
        let request = LlmRequest {
            model: model.to_string(),
            messages: vec![
                WireMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                WireMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
            max_tokens: 4096,
            response_format: Some(json_schema_format(schema_name, schema)),
        };
        let content = self.complete(&request).await?;
        serde_json::from_str(&content).map_err(|e| {
            LlmError::Parse(format!("completion is not valid JSON: {e}"))
        })
    }

    /// Request a free-text completion for the chat endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport failure or empty output.
    pub async fn complete_text(
        &self,
        model: &str,
        system: &str,
        messages: &[WireMessage],
    ) -> Result<String, LlmError> {
        let mut wire = Vec::with_capacity(messages.len().saturating_add(1));
        wire.push(WireMessage {
            role: "system".to_string(),
            content: system.to_string(),
        });
        wire.extend(messages.iter().cloned());
        let request = LlmRequest {
            model: model.to_string(),
            messages: wire,
            temperature: 0.0,
            max_tokens: 1024,
            response_format: None,
        };
        self.complete(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion_text() {
        let body = r#"{"choices":[{"message":{"content":"{\"steps\":[]}"}}],"model":"llama-3.3-70b"}"#;
        assert_eq!(parse_completion(body).expect("ok"), "{\"steps\":[]}");
    }

    #[test]
    fn test_parse_completion_empty_is_no_output() {
        let body = r#"{"choices":[{"message":{"content":""}}]}"#;
        let err = parse_completion(body).expect_err("should fail");
        assert!(err.is_no_output());
    }

    #[test]
    fn test_parse_completion_missing_choices_is_no_output() {
        let body = r#"{"choices":[]}"#;
        let err = parse_completion(body).expect_err("should fail");
        assert!(err.is_no_output());
    }

    #[test]
    fn test_json_schema_format_is_strict() {
        let schema = serde_json::json!({"type": "object"});
        let format = json_schema_format("plan", &schema);
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["strict"], true);
        assert_eq!(format["json_schema"]["name"], "plan");
    }

    #[test]
    fn test_request_serializes_without_null_format() {
        let request = LlmRequest {
            model: "llama-3.3-70b".to_string(),
            messages: vec![],
            temperature: 0.0,
            max_tokens: 64,
            response_format: None,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert!(json.get("response_format").is_none());
        assert_eq!(json["temperature"], 0.0);
    }
}
