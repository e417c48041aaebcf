//! Loading service configuration (prompts, auth redirects, users, course bank) from TOML.
//!
//! See `AppConfig` for the expected schema. Every section is optional.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Course, Subscription, DEFAULT_PASSING_SCORE};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub auth: AuthConfig,
  #[serde(default)]
  pub quiz: QuizConfig,
  #[serde(default)]
  pub users: Vec<UserCfg>,
  #[serde(default)]
  pub courses: Vec<Course>,
}

/// Static user entry: bearer token plus the profile `auth.me()` returns for it.
#[derive(Clone, Debug, Deserialize)]
pub struct UserCfg {
  pub token: String,
  pub email: String,
  pub full_name: String,
  #[serde(default)] pub profile_picture_url: Option<String>,
  #[serde(default)] pub subscription: Option<Subscription>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
  pub login_url: String,
  pub pricing_url: String,
}

impl Default for AuthConfig {
  fn default() -> Self {
    Self { login_url: "/login".into(), pricing_url: "/pricing".into() }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
  /// Applied to quizzes that don't set `passing_score` themselves.
  pub default_passing_score: u32,
  /// Attempts for a progress write that keeps hitting version conflicts.
  pub max_write_attempts: u32,
  /// Idle time after which a quiz session is dropped from memory.
  pub session_ttl_secs: u64,
}

impl Default for QuizConfig {
  fn default() -> Self {
    Self { default_passing_score: DEFAULT_PASSING_SCORE, max_write_attempts: 3, session_ttl_secs: 2 * 60 * 60 }
  }
}

/// Prompts used with the LLM. Override them in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub system: String,
  pub explanation_template: String,
  pub course_outline_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system: "You are a patient course assistant for an online learning platform. Be accurate and concise.".into(),
      explanation_template: "Question: {question}\nOptions:\n{options}\nThe learner chose: {selected}\nCorrect answer: {correct}\n\nExplain in 2-3 sentences why the correct answer is right and why the learner's choice is not. Return JSON {\"explanation\": string}.".into(),
      course_outline_template: "Design a {level} level course about \"{topic}\" with exactly {lesson_count} lessons. Each lesson needs a title, a few paragraphs of content, and a quiz of 3-5 multiple choice questions with 4 options each. Number lessons from 1.".into(),
    }
  }
}

/// Load `AppConfig` from APP_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("APP_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "coursespark", %path, users = cfg.users.len(), courses = cfg.courses.len(), "Loaded app config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "coursespark", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "coursespark", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
