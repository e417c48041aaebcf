//! Integration tests for the CourseSpark HTTP API
//!
//! Drives the full router (auth extractors, handlers, stores) with in-memory
//! collaborators and the built-in demo course and accounts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use coursespark_backend::auth::StaticAuthenticator;
use coursespark_backend::config::AppConfig;
use coursespark_backend::domain::{Course, Enrollment};
use coursespark_backend::llm::{InvokeLlm, LlmClient, LlmError};
use coursespark_backend::seeds::{seed_users, DEMO_COURSE_ID};
use coursespark_backend::store::MemoryStore;
use coursespark_backend::{build_router, AppState};

const INSTRUCTOR: &str = "demo-instructor";
const STUDENT: &str = "demo-student";

/// Always fails, counting the attempts.
#[derive(Default)]
struct DownLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for DownLlm {
    async fn invoke(&self, _req: InvokeLlm) -> Result<Value, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LlmError::Status { status: 503, message: "upstream unavailable".into() })
    }
}

async fn setup(llm: Option<Arc<dyn LlmClient>>) -> axum::Router {
    let config = AppConfig { users: seed_users(), ..AppConfig::default() };
    let auth = Arc::new(StaticAuthenticator::from_users(&config.users));
    let state = AppState::new(
        config,
        Arc::new(MemoryStore::<Course>::new()),
        Arc::new(MemoryStore::<Enrollment>::new()),
        auth,
        llm,
    );
    state.load_courses().await;
    build_router(Arc::new(state))
}

async fn call(app: &axum::Router, method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json_body) => request
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json_body)
}

async fn start(app: &axum::Router, lesson_order: u32) -> (StatusCode, Value) {
    call(
        app,
        Method::POST,
        "/api/v1/quiz-sessions",
        Some(STUDENT),
        Some(json!({ "course_id": DEMO_COURSE_ID, "lesson_order": lesson_order })),
    )
    .await
}

/// Answer every question with the given picks and return the final view.
async fn run_quiz(app: &axum::Router, session_id: &str, picks: &[usize]) -> Value {
    let mut last = Value::Null;
    for pick in picks {
        let base = format!("/api/v1/quiz-sessions/{session_id}");
        let (status, _) = call(app, Method::POST, &format!("{base}/select"), Some(STUDENT), Some(json!({ "option_index": pick }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(app, Method::POST, &format!("{base}/submit"), Some(STUDENT), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, view) = call(app, Method::POST, &format!("{base}/advance"), Some(STUDENT), None).await;
        assert_eq!(status, StatusCode::OK);
        last = view;
    }
    last
}

#[tokio::test]
async fn health_reports_ai_state() {
    let app = setup(None).await;
    let (status, body) = call(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "ai_enabled": false }));
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthenticated() {
    let app = setup(None).await;
    let (status, body) = call(&app, Method::GET, "/api/v1/courses", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
    assert_eq!(body["error"]["login_url"], "/login");

    let (status, _) = call(&app, Method::GET, "/api/v1/me", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_returns_the_profile() {
    let app = setup(None).await;
    let (status, body) = call(&app, Method::GET, "/api/v1/me", Some(STUDENT), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "student@coursespark.dev");
}

#[tokio::test]
async fn authoring_requires_a_subscription() {
    let app = setup(None).await;
    let draft = json!({
        "title": "Intro to Git",
        "category": "programming",
        "level": "beginner",
        "lessons": [{ "order": 1, "title": "Commits", "content": "..." }]
    });

    let (status, body) = call(&app, Method::POST, "/api/v1/courses", Some(STUDENT), Some(draft.clone())).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["pricing_url"], "/pricing");

    let (status, body) = call(&app, Method::POST, "/api/v1/courses", Some(INSTRUCTOR), Some(draft)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created_by"], "instructor@coursespark.dev");

    let (status, list) = call(&app, Method::GET, "/api/v1/courses?category=programming", Some(STUDENT), None).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["title"], "Intro to Git");
}

#[tokio::test]
async fn invalid_course_is_rejected() {
    let app = setup(None).await;
    let draft = json!({
        "title": "Broken",
        "lessons": [{ "order": 2, "title": "Gap", "content": "" }]
    });
    let (status, body) = call(&app, Method::POST, "/api/v1/courses", Some(INSTRUCTOR), Some(draft)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn generation_without_llm_is_unavailable() {
    let app = setup(None).await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/courses/generate",
        Some(INSTRUCTOR),
        Some(json!({ "topic": "SQL joins" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "AI_UNAVAILABLE");
}

#[tokio::test]
async fn lessons_unlock_as_quizzes_are_passed() {
    let app = setup(None).await;
    let lessons_path = format!("/api/v1/courses/{DEMO_COURSE_ID}/lessons");

    let (status, body) = call(&app, Method::GET, &lessons_path, Some(STUDENT), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completion_percentage"], 0);
    let locked: Vec<bool> = body["lessons"].as_array().unwrap().iter().map(|l| l["locked"].as_bool().unwrap()).collect();
    assert_eq!(locked, vec![false, true, true]);

    let (status, body) = start(&app, 2).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "LESSON_LOCKED");

    let (status, view) = start(&app, 1).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(view["question"]["options"].is_array());
    assert!(view["question"].get("correct_option_index").is_none());
    let id = view["session_id"].as_str().unwrap().to_string();

    // two of three right: 67 < 70
    let done = run_quiz(&app, &id, &[1, 1, 3]).await;
    assert_eq!(done["phase"]["state"], "finished");
    assert_eq!(done["outcome"]["score"], 67);
    assert_eq!(done["outcome"]["passed"], false);
    assert_eq!(done["saved"], true);
    let (status, _) = start(&app, 2).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, view) = call(&app, Method::POST, &format!("/api/v1/quiz-sessions/{id}/retake"), Some(STUDENT), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["saved"], false);
    let done = run_quiz(&app, &id, &[1, 1, 0]).await;
    assert_eq!(done["outcome"]["score"], 100);
    assert_eq!(done["saved"], true);

    let (_, body) = call(&app, Method::GET, &lessons_path, Some(STUDENT), None).await;
    assert_eq!(body["completion_percentage"], 33);
    assert_eq!(body["lessons"][0]["completed"], true);
    assert_eq!(body["lessons"][0]["quiz_score"], 100);
    assert_eq!(body["lessons"][1]["locked"], false);

    let (status, _) = start(&app, 2).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn quiz_commands_out_of_order_conflict() {
    let app = setup(None).await;
    let (_, view) = start(&app, 1).await;
    let id = view["session_id"].as_str().unwrap();

    let (status, body) = call(&app, Method::POST, &format!("/api/v1/quiz-sessions/{id}/submit"), Some(STUDENT), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "QUIZ_STATE");

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/v1/quiz-sessions/{id}/select"),
        Some(STUDENT),
        Some(json!({ "option_index": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // another user cannot see the session
    let (status, _) = call(&app, Method::GET, &format!("/api/v1/quiz-sessions/{id}"), Some(INSTRUCTOR), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failing_llm_does_not_block_the_quiz() {
    let llm = Arc::new(DownLlm::default());
    let app = setup(Some(llm.clone())).await;
    let (_, view) = start(&app, 1).await;
    let id = view["session_id"].as_str().unwrap().to_string();

    let done = run_quiz(&app, &id, &[0, 0, 1]).await;
    assert_eq!(done["outcome"]["score"], 0);
    assert_eq!(done["saved"], true);
    assert!(done["feedback"].is_null());
}

#[tokio::test]
async fn project_lesson_completes_through_submission() {
    let app = setup(None).await;
    let (_, view) = start(&app, 1).await;
    let id = view["session_id"].as_str().unwrap().to_string();
    run_quiz(&app, &id, &[1, 1, 0]).await;

    let project = format!("/api/v1/courses/{DEMO_COURSE_ID}/lessons/3/project");
    let (status, body) = call(&app, Method::POST, &project, Some(STUDENT), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "LESSON_LOCKED");

    let (_, view) = start(&app, 2).await;
    let id = view["session_id"].as_str().unwrap().to_string();
    run_quiz(&app, &id, &[2, 1, 2, 1, 0]).await;

    let (status, body) = call(&app, Method::POST, &project, Some(STUDENT), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completion_percentage"], 100);

    // quiz and project lessons are not toggled by hand
    let complete = format!("/api/v1/courses/{DEMO_COURSE_ID}/lessons/1/complete");
    let (status, _) = call(&app, Method::POST, &complete, Some(STUDENT), Some(json!({ "completed": false }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn analytics_visible_to_creator_only() {
    let app = setup(None).await;
    let (_, view) = start(&app, 1).await;
    let id = view["session_id"].as_str().unwrap().to_string();
    run_quiz(&app, &id, &[1, 1, 0]).await;

    let path = format!("/api/v1/courses/{DEMO_COURSE_ID}/analytics");
    let (status, _) = call(&app, Method::GET, &path, Some(STUDENT), None).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let (status, body) = call(&app, Method::GET, &path, Some(INSTRUCTOR), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enrollments"], 1);
    assert_eq!(body["lessons"][0]["quiz_attempts"], 1);
}

#[tokio::test]
async fn course_detail_hides_answer_keys_from_students() {
    let app = setup(None).await;
    let path = format!("/api/v1/courses/{DEMO_COURSE_ID}");

    let (status, body) = call(&app, Method::GET, &path, Some(STUDENT), None).await;
    assert_eq!(status, StatusCode::OK);
    let question = &body["lessons"][0]["quiz"]["questions"][0];
    assert!(question["question_text"].is_string());
    assert_eq!(question["options"].as_array().map(Vec::len), Some(4));
    assert!(question.get("correct_option_index").is_none());

    let (status, body) = call(&app, Method::GET, &path, Some(INSTRUCTOR), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lessons"][0]["quiz"]["questions"][0]["correct_option_index"], 1);
}
