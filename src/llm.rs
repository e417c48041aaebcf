//! LLM invocation seam: one request/response call, optionally constrained by a
//! JSON schema. No streaming.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Default)]
pub struct InvokeLlm {
  pub prompt: String,
  /// When present the reply is a JSON value conforming to it.
  pub response_json_schema: Option<Value>,
  pub add_context_from_internet: bool,
  /// Use the stronger (slower) model tier.
  #[serde(skip)]
  pub strong: bool,
}

impl InvokeLlm {
  pub fn text(prompt: impl Into<String>) -> Self {
    Self { prompt: prompt.into(), ..Default::default() }
  }

  pub fn json(prompt: impl Into<String>, schema: Value) -> Self {
    Self { prompt: prompt.into(), response_json_schema: Some(schema), ..Default::default() }
  }

  pub fn strong(mut self) -> Self {
    self.strong = true;
    self
  }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
  #[error("LLM request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("LLM HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("LLM reply could not be parsed: {0}")]
  Parse(String),
  #[error("LLM integration is not configured")]
  Disabled,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
  /// Returns the parsed JSON object for schema requests, or a JSON string
  /// holding the plain-text reply otherwise.
  async fn invoke(&self, req: InvokeLlm) -> Result<Value, LlmError>;

  /// Short description for startup logs.
  fn describe(&self) -> String {
    "llm".into()
  }
}

/// Decode a schema reply into a concrete type.
pub fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, LlmError> {
  serde_json::from_value(value).map_err(|e| LlmError::Parse(e.to_string()))
}
