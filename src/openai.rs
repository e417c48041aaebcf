//! Minimal OpenAI client implementing `LlmClient`.
//!
//! We only call chat.completions and request either plain text or a JSON object
//! constrained by the caller's schema. Calls are instrumented and log model
//! names, latencies and token usage (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::llm::{InvokeLlm, LlmClient, LlmError};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  pub system_prompt: String,
  /// Completion cap from OPENAI_MAX_TOKENS; omitted from requests when unset.
  pub max_tokens: Option<u32>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(system_prompt: &str) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let max_tokens = std::env::var("OPENAI_MAX_TOKENS").ok().and_then(|v| v.parse::<u32>().ok());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model, system_prompt: system_prompt.to_string(), max_tokens })
  }

  fn build_request(&self, req: &InvokeLlm) -> ChatCompletionRequest {
    let model = if req.strong { &self.strong_model } else { &self.fast_model };
    let response_format = req.response_json_schema.as_ref().map(|schema| ResponseFormat {
      r#type: "json_schema".into(),
      json_schema: Some(JsonSchemaFormat { name: "response".into(), schema: schema.clone(), strict: false }),
    });
    ChatCompletionRequest {
      model: model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: self.system_prompt.clone() },
        ChatMessageReq { role: "user".into(), content: req.prompt.clone() },
      ],
      temperature: if response_format.is_some() { 0.2 } else { 0.4 },
      response_format,
      max_tokens: self.max_tokens,
    }
  }
}

#[async_trait]
impl LlmClient for OpenAI {
  #[instrument(level = "info", skip(self, req), fields(prompt_len = req.prompt.len(), json = req.response_json_schema.is_some(), strong = req.strong))]
  async fn invoke(&self, req: InvokeLlm) -> Result<Value, LlmError> {
    if req.add_context_from_internet {
      debug!(target: "coursespark", "add_context_from_internet is not supported by chat.completions; ignoring");
    }
    let url = format!("{}/chat/completions", self.base_url);
    let body = self.build_request(&req);
    let start = Instant::now();

    let res = self.client.post(&url)
      .header(USER_AGENT, "coursespark-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&body).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      error!(?status, elapsed = ?start.elapsed(), "OpenAI call failed");
      return Err(LlmError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, elapsed = ?start.elapsed(), "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    if req.response_json_schema.is_some() {
      serde_json::from_str::<Value>(&text).map_err(|e| LlmError::Parse(e.to_string()))
    } else {
      Ok(Value::String(text.trim().to_string()))
    }
  }

  fn describe(&self) -> String {
    format!("openai base_url={} fast_model={} strong_model={}", self.base_url, self.fast_model, self.strong_model)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")] r#type: String,
  #[serde(skip_serializing_if = "Option::is_none")] json_schema: Option<JsonSchemaFormat>,
}
#[derive(Serialize)]
struct JsonSchemaFormat { name: String, schema: Value, strict: bool }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn client() -> OpenAI {
    OpenAI {
      client: reqwest::Client::new(),
      api_key: "sk-test".into(),
      base_url: "http://localhost".into(),
      fast_model: "fast".into(),
      strong_model: "strong".into(),
      system_prompt: "sys".into(),
      max_tokens: None,
    }
  }

  #[test]
  fn schema_requests_use_json_schema_format() {
    let req = InvokeLlm::json("explain", json!({ "type": "object" })).strong();
    let body = serde_json::to_value(client().build_request(&req)).unwrap();
    assert_eq!(body["model"], "strong");
    assert_eq!(body["response_format"]["type"], "json_schema");
    assert_eq!(body["response_format"]["json_schema"]["schema"]["type"], "object");
    assert_eq!(body["messages"][0]["content"], "sys");
  }

  #[test]
  fn plain_requests_omit_response_format() {
    let body = serde_json::to_value(client().build_request(&InvokeLlm::text("hi"))).unwrap();
    assert_eq!(body["model"], "fast");
    assert!(body.get("response_format").is_none());
    assert!(body.get("max_tokens").is_none());
  }

  #[test]
  fn configured_token_cap_is_sent() {
    let capped = OpenAI { max_tokens: Some(300), ..client() };
    let body = serde_json::to_value(capped.build_request(&InvokeLlm::text("hi"))).unwrap();
    assert_eq!(body["max_tokens"], 300);
  }

  #[test]
  fn error_body_message_extracted() {
    let body = r#"{"error":{"message":"quota exceeded","type":"insufficient_quota"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("quota exceeded"));
    assert_eq!(extract_openai_error("<html>"), None);
  }
}
