//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Starting quiz sessions (lesson lookup, lock check, lazy enrollment)
//!   - Driving the quiz state machine for the session owner
//!   - Spawning explanation requests after wrong answers
//!   - Persisting finished outcomes into the enrollment

use std::{collections::HashSet, sync::Arc, time::Instant};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::analytics::{course_analytics, CourseAnalytics};
use crate::authoring::{generate_course, CourseDraft};
use crate::domain::{Course, Enrollment, Question, UserProfile};
use crate::enrollment::EnrollmentService;
use crate::error::{ApiError, ApiResult};
use crate::feedback::explain_wrong_answer;
use crate::progress::lesson_states;
use crate::protocol::{
  session_view, to_detail, to_summary, CourseOut, CourseQuery, CourseSummary, GenerateCourseIn, LessonsOut,
  ServerWsMessage, SessionView,
};
use crate::quiz::QuizSession;
use crate::state::{AppState, SessionEntry};
use crate::store::{Query, SortSpec};
use crate::util::trunc_for_log;

fn not_found(id: Uuid) -> ApiError {
  ApiError::NotFound(format!("quiz session {id}"))
}

async fn load_course(state: &AppState, course_id: Uuid) -> ApiResult<Course> {
  Ok(state.courses.get(course_id).await?)
}

/// Run `f` against a session owned by `user`. Other users' sessions look absent.
async fn with_session<T>(
  state: &AppState,
  user: &UserProfile,
  id: Uuid,
  f: impl FnOnce(&mut SessionEntry) -> ApiResult<T>,
) -> ApiResult<T> {
  let mut sessions = state.sessions.write().await;
  let entry = sessions
    .get_mut(&id)
    .filter(|e| e.owner == user.email)
    .ok_or_else(|| not_found(id))?;
  entry.last_active = Instant::now();
  f(entry)
}

#[instrument(level = "info", skip(state, user), fields(student = %user.email))]
pub async fn start_quiz(
  state: &Arc<AppState>,
  user: &UserProfile,
  course_id: Uuid,
  lesson_order: u32,
) -> ApiResult<SessionView> {
  let course = load_course(state, course_id).await?;
  let lesson = course
    .lesson(lesson_order)
    .ok_or_else(|| ApiError::NotFound(format!("lesson {lesson_order}")))?;
  let mut quiz = lesson
    .quiz
    .clone()
    .ok_or_else(|| ApiError::BadRequest(format!("lesson {lesson_order} has no quiz")))?;
  quiz.passing_score.get_or_insert(state.config.quiz.default_passing_score);

  let enrollment = state.enrollments.ensure(&course, &user.email).await?;
  EnrollmentService::ensure_unlocked(&course, &enrollment, lesson_order)?;

  let session = QuizSession::new(quiz)?;
  let id = Uuid::new_v4();
  let entry = SessionEntry {
    owner: user.email.clone(),
    course_id,
    lesson_order,
    session,
    pending_explanations: HashSet::new(),
    saved: false,
    save_error: None,
    listener: None,
    last_active: Instant::now(),
  };

  let ttl = state.session_ttl();
  let mut sessions = state.sessions.write().await;
  // one live session per student and lesson; idle ones go too
  sessions.retain(|_, e| {
    let same_lesson = e.owner == user.email && e.course_id == course_id && e.lesson_order == lesson_order;
    !same_lesson && e.last_active.elapsed() <= ttl
  });
  let view = session_view(id, &entry);
  sessions.insert(id, entry);
  info!(target: "quiz", session_id = %id, %course_id, lesson_order, "Quiz session started");
  Ok(view)
}

pub async fn get_session(state: &Arc<AppState>, user: &UserProfile, id: Uuid) -> ApiResult<SessionView> {
  with_session(state, user, id, |e| Ok(session_view(id, e))).await
}

/// Route explanation pushes for this session to a WebSocket.
pub async fn watch_session(
  state: &Arc<AppState>,
  user: &UserProfile,
  id: Uuid,
  listener: UnboundedSender<ServerWsMessage>,
) -> ApiResult<SessionView> {
  with_session(state, user, id, |e| {
    e.listener = Some(listener);
    Ok(session_view(id, e))
  })
  .await
}

#[instrument(level = "info", skip(state, user))]
pub async fn select_answer(
  state: &Arc<AppState>,
  user: &UserProfile,
  id: Uuid,
  option_index: usize,
) -> ApiResult<SessionView> {
  with_session(state, user, id, |e| {
    e.session.select_answer(option_index)?;
    Ok(session_view(id, e))
  })
  .await
}

/// Score the selected answer. A wrong answer triggers a background
/// explanation request; this call never waits for it.
#[instrument(level = "info", skip(state, user))]
pub async fn submit_answer(state: &Arc<AppState>, user: &UserProfile, id: Uuid) -> ApiResult<SessionView> {
  let llm_enabled = state.llm.is_some();
  let (view, explain) = with_session(state, user, id, |e| {
    let feedback = e.session.submit_answer()?;
    info!(target: "quiz", session_id = %id, question = feedback.question_index, correct = feedback.correct, streak = feedback.streak, difficulty = ?feedback.difficulty, "Answer scored");
    let explain = if feedback.wants_explanation && llm_enabled {
      e.pending_explanations.insert(feedback.question_index);
      let question = e.session.quiz().questions[feedback.question_index].clone();
      let selected = e.session.answers().last().map(|a| a.selected_answer).unwrap_or_default();
      let target = ExplanationTarget { session_id: id, attempt: e.session.attempt(), question_index: feedback.question_index };
      Some((target, question, selected))
    } else {
      None
    };
    Ok((session_view(id, e), explain))
  })
  .await?;

  if let Some((target, question, selected)) = explain {
    spawn_explanation(state.clone(), target, question, selected);
  }
  Ok(view)
}

/// Which answer a background explanation belongs to.
#[derive(Clone, Copy, Debug)]
struct ExplanationTarget {
  session_id: Uuid,
  attempt: u32,
  question_index: usize,
}

fn spawn_explanation(state: Arc<AppState>, target: ExplanationTarget, question: Question, selected: usize) {
  tokio::spawn(async move {
    let Some(llm) = state.llm.clone() else { return };
    let result = explain_wrong_answer(llm.as_ref(), &state.config.prompts, &question, selected).await;

    let ExplanationTarget { session_id: id, attempt, question_index: index } = target;
    let mut sessions = state.sessions.write().await;
    let Some(entry) = sessions.get_mut(&id) else { return };
    if entry.session.attempt() != attempt {
      // retaken while in flight; the pending flag now belongs to the new attempt
      debug!(target: "quiz", session_id = %id, question = index, attempt, "Dropping explanation for a retaken attempt");
      return;
    }
    entry.pending_explanations.remove(&index);
    match result {
      Ok(text) => {
        if let Err(e) = entry.session.attach_explanation(attempt, index, text.clone()) {
          warn!(target: "quiz", session_id = %id, question = index, error = %e, "Dropping unmatched explanation");
          return;
        }
        if let Some(tx) = &entry.listener {
          let _ = tx.send(ServerWsMessage::Explanation { session_id: id, question_index: index, text });
        }
      }
      Err(e) => {
        warn!(target: "quiz", session_id = %id, question = index, error = %e, "Explanation request failed; continuing without one");
      }
    }
  });
}

/// Move past the feedback view. On the last question this finishes the quiz
/// and stores the outcome; the view reports whether that write succeeded.
#[instrument(level = "info", skip(state, user))]
pub async fn advance(state: &Arc<AppState>, user: &UserProfile, id: Uuid) -> ApiResult<SessionView> {
  let finished = with_session(state, user, id, |e| {
    e.session.advance()?;
    Ok(e.session.outcome().is_some())
  })
  .await?;

  if finished {
    persist_outcome(state, user, id).await
  } else {
    get_session(state, user, id).await
  }
}

/// Store a finished outcome. Safe to call again after a failed write.
#[instrument(level = "info", skip(state, user))]
pub async fn persist_outcome(state: &Arc<AppState>, user: &UserProfile, id: Uuid) -> ApiResult<SessionView> {
  let (course_id, lesson_order, outcome, saved) = with_session(state, user, id, |e| {
    let outcome = e.session.outcome().ok_or_else(|| ApiError::BadRequest("quiz is not finished".into()))?;
    Ok((e.course_id, e.lesson_order, outcome, e.saved))
  })
  .await?;
  if saved {
    return get_session(state, user, id).await;
  }

  let result = match load_course(state, course_id).await {
    Ok(course) => state
      .enrollments
      .record_quiz_result(&course, &user.email, lesson_order, &outcome)
      .await
      .map_err(ApiError::from),
    Err(e) => Err(e),
  };

  with_session(state, user, id, |e| {
    // a retake while the write was in flight leaves nothing to mark
    if e.session.outcome().is_none() {
      return Ok(session_view(id, e));
    }
    match &result {
      Ok(enrollment) => {
        e.saved = true;
        e.save_error = None;
        info!(target: "quiz", session_id = %id, score = outcome.score, passed = outcome.passed, completion = enrollment.completion_percentage, "Quiz outcome saved");
      }
      Err(err) => {
        e.save_error = Some(err.to_string());
        error!(target: "quiz", session_id = %id, error = %err, "Quiz outcome could not be saved");
      }
    }
    Ok(session_view(id, e))
  })
  .await
}

#[instrument(level = "info", skip(state, user))]
pub async fn retake(state: &Arc<AppState>, user: &UserProfile, id: Uuid) -> ApiResult<SessionView> {
  with_session(state, user, id, |e| {
    e.session.retake();
    e.pending_explanations.clear();
    e.saved = false;
    e.save_error = None;
    info!(target: "quiz", session_id = %id, "Quiz retaken");
    Ok(session_view(id, e))
  })
  .await
}

//
// Courses and enrollments
//

pub async fn list_courses(state: &Arc<AppState>, q: &CourseQuery) -> ApiResult<Vec<CourseSummary>> {
  let mut query = Query::new();
  if let Some(category) = q.category.as_deref().filter(|c| !c.is_empty()) {
    query = query.eq("category", category);
  }
  if let Some(level) = q.level.as_deref().filter(|l| !l.is_empty()) {
    query = query.eq("level", level);
  }
  let courses = state.courses.filter(&query, Some(&SortSpec::parse("-created_date"))).await?;
  Ok(courses.iter().map(to_summary).collect())
}

/// Answer keys stay with the course creator.
pub async fn get_course(state: &Arc<AppState>, user: &UserProfile, course_id: Uuid) -> ApiResult<CourseOut> {
  let course = load_course(state, course_id).await?;
  if course.created_by == user.email {
    Ok(CourseOut::Full(course))
  } else {
    Ok(CourseOut::Student(to_detail(&course)))
  }
}

#[instrument(level = "info", skip(state, user, draft), fields(author = %user.email, title = %draft.title))]
pub async fn create_course(state: &Arc<AppState>, user: &UserProfile, draft: CourseDraft) -> ApiResult<Course> {
  let course = draft.into_course(&user.email)?;
  let stored = state.courses.create(course).await?;
  info!(target: "coursespark", course_id = %stored.id, lessons = stored.lessons.len(), "Course created");
  Ok(stored)
}

/// Generate an outline with the LLM and store it as a new course.
#[instrument(level = "info", skip(state, user, body), fields(author = %user.email, topic = %trunc_for_log(&body.topic, 60)))]
pub async fn generate_and_create(
  state: &Arc<AppState>,
  user: &UserProfile,
  body: &GenerateCourseIn,
) -> ApiResult<Course> {
  let Some(llm) = state.llm.clone() else {
    return Err(ApiError::LlmUnavailable);
  };
  if body.topic.trim().is_empty() {
    return Err(ApiError::BadRequest("topic must not be empty".into()));
  }
  let draft = generate_course(llm.as_ref(), &state.config.prompts, &body.topic, &body.level, body.lesson_count).await?;
  create_course(state, user, draft).await
}

/// Dashboard numbers, visible to the course creator only.
pub async fn analytics(state: &Arc<AppState>, user: &UserProfile, course_id: Uuid) -> ApiResult<CourseAnalytics> {
  let course = load_course(state, course_id).await?;
  if course.created_by != user.email {
    return Err(ApiError::Forbidden("only the course creator can view analytics".into()));
  }
  let enrollments = state.enrollments.list_for_course(course_id).await?;
  Ok(course_analytics(&course, &enrollments))
}

pub async fn enroll(state: &Arc<AppState>, user: &UserProfile, course_id: Uuid) -> ApiResult<Enrollment> {
  let course = load_course(state, course_id).await?;
  Ok(state.enrollments.ensure(&course, &user.email).await?)
}

fn lessons_out(course: &Course, enrollment: &Enrollment) -> LessonsOut {
  LessonsOut {
    enrollment_id: enrollment.id,
    completion_percentage: enrollment.completion_percentage,
    lessons: lesson_states(course, enrollment),
  }
}

/// Lesson list with lock and completion flags; enrolls on first view.
pub async fn lessons(state: &Arc<AppState>, user: &UserProfile, course_id: Uuid) -> ApiResult<LessonsOut> {
  let course = load_course(state, course_id).await?;
  let enrollment = state.enrollments.ensure(&course, &user.email).await?;
  Ok(lessons_out(&course, &enrollment))
}

pub async fn complete_lesson(
  state: &Arc<AppState>,
  user: &UserProfile,
  course_id: Uuid,
  lesson_order: u32,
  completed: bool,
) -> ApiResult<LessonsOut> {
  let course = load_course(state, course_id).await?;
  let enrollment = state
    .enrollments
    .mark_lesson_complete(&course, &user.email, lesson_order, completed)
    .await?;
  Ok(lessons_out(&course, &enrollment))
}

pub async fn submit_project(
  state: &Arc<AppState>,
  user: &UserProfile,
  course_id: Uuid,
  lesson_order: u32,
) -> ApiResult<LessonsOut> {
  let course = load_course(state, course_id).await?;
  let enrollment = state
    .enrollments
    .record_project_submission(&course, &user.email, lesson_order)
    .await?;
  Ok(lessons_out(&course, &enrollment))
}
