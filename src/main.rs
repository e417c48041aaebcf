//! CourseSpark · Course Platform Backend
//!
//! - Axum HTTP + WebSocket API
//! - Optional OpenAI integration for wrong-answer explanations and course outlines
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   APP_CONFIG_PATH     : path to TOML config (prompts, auth urls, users, courses)
//!   OPENAI_API_KEY      : enables OpenAI integration if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL   : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL : default "gpt-4o"
//!   OPENAI_MAX_TOKENS   : optional completion token cap
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use coursespark_backend::{build_router, telemetry, AppState};

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Config, stores, seeded courses, authenticator and optional OpenAI client.
  let state = Arc::new(AppState::from_env().await);
  let _sweeper = state.spawn_session_sweeper();

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "coursespark", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "coursespark", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
