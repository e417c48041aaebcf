//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Auth runs in the `CurrentUser` / `Subscriber` extractors before any handler body.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{CurrentUser, Subscriber};
use crate::error::ApiResult;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, ai_enabled: state.llm.is_some() })
}

#[instrument(level = "info", skip_all)]
pub async fn http_me(CurrentUser(profile): CurrentUser) -> impl IntoResponse {
  Json(MeOut { profile })
}

//
// Courses
//

#[instrument(level = "info", skip(state, _user))]
pub async fn http_list_courses(
  State(state): State<Arc<AppState>>,
  _user: CurrentUser,
  Query(q): Query<CourseQuery>,
) -> ApiResult<impl IntoResponse> {
  let courses = logic::list_courses(&state, &q).await?;
  info!(target: "coursespark", count = courses.len(), "HTTP courses listed");
  Ok(Json(courses))
}

#[instrument(level = "info", skip(state, user))]
pub async fn http_get_course(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::get_course(&state, &user, id).await?))
}

#[instrument(level = "info", skip(state, user, body), fields(title = %body.title))]
pub async fn http_create_course(
  State(state): State<Arc<AppState>>,
  Subscriber(user): Subscriber,
  Json(body): Json<CreateCourseIn>,
) -> ApiResult<impl IntoResponse> {
  let course = logic::create_course(&state, &user, body).await?;
  Ok((StatusCode::CREATED, Json(course)))
}

#[instrument(level = "info", skip(state, user, body), fields(level = %body.level, lesson_count = body.lesson_count))]
pub async fn http_generate_course(
  State(state): State<Arc<AppState>>,
  Subscriber(user): Subscriber,
  Json(body): Json<GenerateCourseIn>,
) -> ApiResult<impl IntoResponse> {
  let course = logic::generate_and_create(&state, &user, &body).await?;
  Ok((StatusCode::CREATED, Json(course)))
}

#[instrument(level = "info", skip(state, user))]
pub async fn http_course_analytics(
  State(state): State<Arc<AppState>>,
  Subscriber(user): Subscriber,
  Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::analytics(&state, &user, id).await?))
}

//
// Enrollment + progress
//

#[instrument(level = "info", skip(state, user))]
pub async fn http_enroll(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::enroll(&state, &user, id).await?))
}

#[instrument(level = "info", skip(state, user))]
pub async fn http_lessons(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::lessons(&state, &user, id).await?))
}

#[instrument(level = "info", skip(state, user, body))]
pub async fn http_complete_lesson(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path((id, order)): Path<(Uuid, u32)>,
  body: Option<Json<CompleteLessonIn>>,
) -> ApiResult<impl IntoResponse> {
  let completed = body.map(|Json(b)| b.completed).unwrap_or(true);
  Ok(Json(logic::complete_lesson(&state, &user, id, order, completed).await?))
}

#[instrument(level = "info", skip(state, user))]
pub async fn http_submit_project(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path((id, order)): Path<(Uuid, u32)>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::submit_project(&state, &user, id, order).await?))
}

//
// Quiz sessions
//

#[instrument(level = "info", skip(state, user, body), fields(course_id = %body.course_id, lesson_order = body.lesson_order))]
pub async fn http_start_quiz(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Json(body): Json<StartQuizIn>,
) -> ApiResult<impl IntoResponse> {
  let view = logic::start_quiz(&state, &user, body.course_id, body.lesson_order).await?;
  Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(level = "info", skip(state, user))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::get_session(&state, &user, id).await?))
}

#[instrument(level = "info", skip(state, user, body), fields(option_index = body.option_index))]
pub async fn http_select(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<SelectIn>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::select_answer(&state, &user, id, body.option_index).await?))
}

#[instrument(level = "info", skip(state, user))]
pub async fn http_submit(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::submit_answer(&state, &user, id).await?))
}

#[instrument(level = "info", skip(state, user))]
pub async fn http_advance(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::advance(&state, &user, id).await?))
}

#[instrument(level = "info", skip(state, user))]
pub async fn http_save(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::persist_outcome(&state, &user, id).await?))
}

#[instrument(level = "info", skip(state, user))]
pub async fn http_retake(
  State(state): State<Arc<AppState>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
  Ok(Json(logic::retake(&state, &user, id).await?))
}
