//! Explanations for incorrect quiz answers.
//!
//! Best effort: the quiz never waits on these, and a failed call only means no
//! explanation is shown.

use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::config::Prompts;
use crate::domain::Question;
use crate::llm::{decode, InvokeLlm, LlmClient, LlmError};
use crate::util::{fill_template, trunc_for_log};

#[derive(Deserialize)]
struct Explanation {
  explanation: String,
}

pub fn explanation_request(prompts: &Prompts, question: &Question, selected: usize) -> InvokeLlm {
  let options = question
    .options
    .iter()
    .enumerate()
    .map(|(i, o)| format!("{}. {}", i + 1, o))
    .collect::<Vec<_>>()
    .join("\n");
  let option_text = |i: usize| question.options.get(i).map(String::as_str).unwrap_or("");
  let prompt = fill_template(
    &prompts.explanation_template,
    &[
      ("question", question.question_text.as_str()),
      ("options", options.as_str()),
      ("selected", option_text(selected)),
      ("correct", option_text(question.correct_option_index)),
    ],
  );
  InvokeLlm::json(
    prompt,
    json!({
      "type": "object",
      "properties": { "explanation": { "type": "string" } },
      "required": ["explanation"]
    }),
  )
}

#[instrument(level = "info", skip(llm, prompts, question))]
pub async fn explain_wrong_answer(
  llm: &dyn LlmClient,
  prompts: &Prompts,
  question: &Question,
  selected: usize,
) -> Result<String, LlmError> {
  let reply = llm.invoke(explanation_request(prompts, question, selected)).await?;
  let e: Explanation = decode(reply)?;
  let text = e.explanation.trim().to_string();
  if text.is_empty() {
    return Err(LlmError::Parse("empty explanation".into()));
  }
  info!(target: "quiz", preview = %trunc_for_log(&text, 40), "Explanation generated");
  Ok(text)
}

#[cfg(test)]
pub(crate) mod fakes {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use async_trait::async_trait;
  use serde_json::Value;

  use crate::llm::{InvokeLlm, LlmClient, LlmError};

  /// Replies with a canned value, or fails when `reply` is None.
  pub struct CannedLlm {
    pub reply: Option<Value>,
    pub calls: AtomicUsize,
  }

  impl CannedLlm {
    pub fn ok(reply: Value) -> Self { Self { reply: Some(reply), calls: AtomicUsize::new(0) } }
    pub fn failing() -> Self { Self { reply: None, calls: AtomicUsize::new(0) } }
  }

  #[async_trait]
  impl LlmClient for CannedLlm {
    async fn invoke(&self, _req: InvokeLlm) -> Result<Value, LlmError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.reply.clone().ok_or(LlmError::Status { status: 500, message: "boom".into() })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::fakes::CannedLlm;
  use super::*;
  use crate::domain::fixtures::question;

  #[test]
  fn prompt_names_both_choices() {
    let q = question(2);
    let req = explanation_request(&Prompts::default(), &q, 0);
    assert!(req.prompt.contains("The learner chose: a"));
    assert!(req.prompt.contains("Correct answer: c"));
    assert!(req.prompt.contains("3. c"));
    assert!(req.response_json_schema.is_some());
  }

  #[tokio::test]
  async fn explanation_decoded() {
    let llm = CannedLlm::ok(serde_json::json!({ "explanation": "  c is right because...  " }));
    let text = explain_wrong_answer(&llm, &Prompts::default(), &question(2), 0).await.unwrap();
    assert_eq!(text, "c is right because...");
  }

  #[tokio::test]
  async fn malformed_or_failed_reply_is_an_error() {
    let llm = CannedLlm::ok(serde_json::json!({ "nope": 1 }));
    assert!(matches!(
      explain_wrong_answer(&llm, &Prompts::default(), &question(1), 0).await,
      Err(LlmError::Parse(_))
    ));
    let llm = CannedLlm::failing();
    assert!(explain_wrong_answer(&llm, &Prompts::default(), &question(1), 0).await.is_err());
  }
}
