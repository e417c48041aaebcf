//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic; the direct reply is one JSON message. Explanations
//! that finish later are pushed on the same socket through an mpsc channel.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{info, error, instrument, debug};

use crate::auth::CurrentUser;
use crate::domain::UserProfile;
use crate::error::ApiResult;
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage, SessionView};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state, user), fields(student = %user.email))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
  info!(target: "coursespark", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, user))
}

fn encode(msg: &ServerWsMessage) -> String {
  serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

#[instrument(level = "info", skip(socket, state, user), fields(student = %user.email))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, user: UserProfile) {
  info!(target: "coursespark", "WebSocket connected");
  let (push_tx, mut push_rx) = mpsc::unbounded_channel::<ServerWsMessage>();

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(incoming) => {
                debug!(target: "coursespark", "WS received: {:?}", &incoming);
                handle_client_ws(incoming, &state, &user, &push_tx).await
              }
              Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
            };
            if let Err(e) = socket.send(Message::Text(encode(&reply_msg))).await {
              error!(target: "coursespark", error = %e, "WS send error");
              break;
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      Some(pushed) = push_rx.recv() => {
        if let Err(e) = socket.send(Message::Text(encode(&pushed))).await {
          error!(target: "coursespark", error = %e, "WS push error");
          break;
        }
      }
    }
  }
  info!(target: "coursespark", "WebSocket disconnected");
}

fn session_reply(result: ApiResult<SessionView>) -> ServerWsMessage {
  match result {
    Ok(session) => ServerWsMessage::Session { session },
    Err(e) => ServerWsMessage::Error { message: e.to_string() },
  }
}

#[instrument(level = "info", skip(state, user, push_tx))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &Arc<AppState>,
  user: &UserProfile,
  push_tx: &UnboundedSender<ServerWsMessage>,
) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::StartQuiz { course_id, lesson_order } => {
      let started = logic::start_quiz(state, user, course_id, lesson_order).await;
      // sessions started here push their explanations to this socket
      let started = match started {
        Ok(view) => logic::watch_session(state, user, view.session_id, push_tx.clone()).await,
        Err(e) => Err(e),
      };
      session_reply(started)
    }

    ClientWsMessage::Watch { session_id } => {
      session_reply(logic::watch_session(state, user, session_id, push_tx.clone()).await)
    }

    ClientWsMessage::SelectAnswer { session_id, option_index } => {
      session_reply(logic::select_answer(state, user, session_id, option_index).await)
    }

    ClientWsMessage::SubmitAnswer { session_id } => {
      session_reply(logic::submit_answer(state, user, session_id).await)
    }

    ClientWsMessage::Advance { session_id } => session_reply(logic::advance(state, user, session_id).await),

    ClientWsMessage::Save { session_id } => session_reply(logic::persist_outcome(state, user, session_id).await),

    ClientWsMessage::Retake { session_id } => session_reply(logic::retake(state, user, session_id).await),
  }
}
