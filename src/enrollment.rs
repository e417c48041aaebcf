//! Enrollment persistence: lazy creation and every progress write.
//!
//! Each write re-reads the enrollment, applies the pure progress reducer and
//! stores the result with a version check. A concurrent writer causes a
//! `VersionConflict`, after which the update is re-applied to the fresh record
//! instead of overwriting it. Callers only see success once the store accepted
//! the write.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use rand::Rng;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Course, Enrollment, LessonProgress};
use crate::progress::{apply_progress, is_lesson_locked, manual_progress, project_progress, quiz_progress};
use crate::quiz::QuizOutcome;
use crate::store::{EntityStore, Query, SortSpec, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
  #[error("lesson {0} is locked")]
  LessonLocked(u32),
  #[error("course has no lesson {0}")]
  NoSuchLesson(u32),
  #[error("{0}")]
  NotApplicable(String),
  #[error(transparent)]
  Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct EnrollmentService {
  store: Arc<dyn EntityStore<Enrollment>>,
  max_attempts: u32,
}

impl EnrollmentService {
  pub fn new(store: Arc<dyn EntityStore<Enrollment>>, max_attempts: u32) -> Self {
    Self { store, max_attempts: max_attempts.max(1) }
  }

  pub async fn find(&self, course_id: Uuid, email: &str) -> Result<Option<Enrollment>, StoreError> {
    let query = Query::new()
      .eq("course_id", course_id.to_string())
      .eq("student_email", email);
    // oldest first, so a duplicate created by a racing `ensure` is never preferred
    let found = self.store.filter(&query, Some(&SortSpec::parse("created_date"))).await?;
    Ok(found.into_iter().next())
  }

  pub async fn list_for_course(&self, course_id: Uuid) -> Result<Vec<Enrollment>, StoreError> {
    let query = Query::new().eq("course_id", course_id.to_string());
    self.store.filter(&query, Some(&SortSpec::parse("-created_date"))).await
  }

  /// Enrollment for the pair, created with empty progress on first view.
  #[instrument(level = "info", skip(self, course), fields(course_id = %course.id))]
  pub async fn ensure(&self, course: &Course, email: &str) -> Result<Enrollment, StoreError> {
    if let Some(e) = self.find(course.id, email).await? {
      return Ok(e);
    }
    let created = self.store.create(Enrollment::new(course.id, email)).await?;
    info!(target: "coursespark", enrollment_id = %created.id, "Enrollment created");
    Ok(created)
  }

  /// Rejects lessons that don't exist or are locked for this student.
  pub fn ensure_unlocked(course: &Course, enrollment: &Enrollment, lesson_order: u32) -> Result<(), EnrollmentError> {
    if course.lesson(lesson_order).is_none() {
      return Err(EnrollmentError::NoSuchLesson(lesson_order));
    }
    if is_lesson_locked(&course.lessons, &enrollment.progress, lesson_order) {
      return Err(EnrollmentError::LessonLocked(lesson_order));
    }
    Ok(())
  }

  /// Not lock-checked: the lock was checked when the quiz started, and a
  /// result for an attempt begun while unlocked is kept even if the lesson
  /// has been locked again since.
  #[instrument(level = "info", skip(self, course, outcome), fields(course_id = %course.id, score = outcome.score, passed = outcome.passed))]
  pub async fn record_quiz_result(
    &self,
    course: &Course,
    email: &str,
    lesson_order: u32,
    outcome: &QuizOutcome,
  ) -> Result<Enrollment, EnrollmentError> {
    let lesson = course.lesson(lesson_order).ok_or(EnrollmentError::NoSuchLesson(lesson_order))?;
    if lesson.quiz.is_none() {
      return Err(EnrollmentError::NotApplicable(format!("lesson {lesson_order} has no quiz")));
    }
    let now = Utc::now();
    self
      .write_progress(course, email, lesson_order, false, |existing| {
        quiz_progress(existing, lesson_order, outcome, now)
      })
      .await
  }

  #[instrument(level = "info", skip(self, course), fields(course_id = %course.id))]
  pub async fn record_project_submission(
    &self,
    course: &Course,
    email: &str,
    lesson_order: u32,
  ) -> Result<Enrollment, EnrollmentError> {
    let lesson = course.lesson(lesson_order).ok_or(EnrollmentError::NoSuchLesson(lesson_order))?;
    if lesson.project.is_none() {
      return Err(EnrollmentError::NotApplicable(format!("lesson {lesson_order} has no project")));
    }
    let now = Utc::now();
    self
      .write_progress(course, email, lesson_order, true, |existing| {
        project_progress(existing, lesson_order, now)
      })
      .await
  }

  /// Manual completion toggle, only for lessons completed by reading alone.
  #[instrument(level = "info", skip(self, course), fields(course_id = %course.id))]
  pub async fn mark_lesson_complete(
    &self,
    course: &Course,
    email: &str,
    lesson_order: u32,
    completed: bool,
  ) -> Result<Enrollment, EnrollmentError> {
    let lesson = course.lesson(lesson_order).ok_or(EnrollmentError::NoSuchLesson(lesson_order))?;
    if lesson.quiz.is_some() || lesson.project.is_some() {
      return Err(EnrollmentError::NotApplicable(format!(
        "lesson {lesson_order} is completed through its quiz or project"
      )));
    }
    let now = Utc::now();
    self
      .write_progress(course, email, lesson_order, true, |existing| {
        manual_progress(existing, lesson_order, completed, now)
      })
      .await
  }

  async fn write_progress<F>(
    &self,
    course: &Course,
    email: &str,
    lesson_order: u32,
    check_lock: bool,
    build: F,
  ) -> Result<Enrollment, EnrollmentError>
  where
    F: Fn(Option<&LessonProgress>) -> LessonProgress + Send + Sync,
  {
    let mut current = self.ensure(course, email).await?;
    let mut attempt = 1;
    loop {
      if check_lock {
        Self::ensure_unlocked(course, &current, lesson_order)?;
      }
      let entry = build(current.progress_for(lesson_order));
      let next = apply_progress(&current, entry, course.lessons.len());
      let patch = json!({
        "progress": next.progress,
        "completion_percentage": next.completion_percentage,
      });

      match self.store.update_if_version(current.id, current.version, patch).await {
        Ok(saved) => {
          info!(target: "coursespark", enrollment_id = %saved.id, lesson_order, completion = saved.completion_percentage, version = saved.version, "Progress saved");
          return Ok(saved);
        }
        Err(StoreError::VersionConflict { found, .. }) if attempt < self.max_attempts => {
          warn!(target: "coursespark", enrollment_id = %current.id, attempt, found, "Progress write raced another writer; re-applying");
          attempt += 1;
          let backoff_ms = rand::thread_rng().gen_range(5..25u64);
          tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
          current = self.store.get(current.id).await?;
        }
        Err(e) => return Err(e.into()),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::fixtures::{course, lesson};
  use crate::domain::Project;
  use crate::quiz::{score_outcome, DifficultyLabel};
  use crate::store::MemoryStore;

  fn service() -> (EnrollmentService, Arc<MemoryStore<Enrollment>>) {
    let store = Arc::new(MemoryStore::<Enrollment>::new());
    (EnrollmentService::new(store.clone(), 5), store)
  }

  fn demo_course() -> Course {
    let mut l3 = lesson(3, false);
    l3.project = Some(Project { title: "Build it".into(), instructions: String::new() });
    course(vec![lesson(1, true), lesson(2, false), l3])
  }

  #[tokio::test]
  async fn ensure_is_lazy_and_idempotent() {
    let (svc, _) = service();
    let c = demo_course();
    let a = svc.ensure(&c, "s@example.com").await.unwrap();
    let b = svc.ensure(&c, "s@example.com").await.unwrap();
    assert_eq!(a.id, b.id);
    assert!(a.progress.is_empty());
    assert_eq!(svc.list_for_course(c.id).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn quiz_result_unlocks_next_lesson() {
    let (svc, _) = service();
    let c = demo_course();
    let e = svc.ensure(&c, "s@example.com").await.unwrap();
    assert!(matches!(
      EnrollmentService::ensure_unlocked(&c, &e, 2),
      Err(EnrollmentError::LessonLocked(2))
    ));

    let failed = score_outcome(1, 3, 70, DifficultyLabel::Normal);
    let e = svc.record_quiz_result(&c, "s@example.com", 1, &failed).await.unwrap();
    assert_eq!(e.completion_percentage, 0);
    assert!(EnrollmentService::ensure_unlocked(&c, &e, 2).is_err());

    let passed = score_outcome(3, 3, 70, DifficultyLabel::Hard);
    let e = svc.record_quiz_result(&c, "s@example.com", 1, &passed).await.unwrap();
    assert_eq!(e.progress.len(), 1);
    assert_eq!(e.completion_percentage, 33);
    assert!(EnrollmentService::ensure_unlocked(&c, &e, 2).is_ok());
  }

  #[tokio::test]
  async fn quiz_started_while_unlocked_still_records_after_relock() {
    let (svc, _) = service();
    let c = course(vec![lesson(1, true), lesson(2, true)]);
    let email = "s@example.com";
    svc.record_quiz_result(&c, email, 1, &score_outcome(3, 3, 70, DifficultyLabel::Hard)).await.unwrap();
    // a failed retake of lesson 1 locks lesson 2 again
    let e = svc.record_quiz_result(&c, email, 1, &score_outcome(0, 3, 70, DifficultyLabel::Easy)).await.unwrap();
    assert!(EnrollmentService::ensure_unlocked(&c, &e, 2).is_err());

    let e = svc.record_quiz_result(&c, email, 2, &score_outcome(3, 3, 70, DifficultyLabel::Hard)).await.unwrap();
    assert_eq!(e.progress_for(2).and_then(|p| p.quiz_passed), Some(true));
    assert!(EnrollmentService::ensure_unlocked(&c, &e, 2).is_err());
  }

  #[tokio::test]
  async fn locked_lesson_rejects_writes() {
    let (svc, _) = service();
    let c = demo_course();
    let err = svc.mark_lesson_complete(&c, "s@example.com", 2, true).await.unwrap_err();
    assert!(matches!(err, EnrollmentError::LessonLocked(2)));
  }

  #[tokio::test]
  async fn write_paths_check_lesson_kind() {
    let (svc, _) = service();
    let c = demo_course();
    let outcome = score_outcome(1, 1, 70, DifficultyLabel::Normal);
    assert!(matches!(
      svc.record_quiz_result(&c, "s@example.com", 2, &outcome).await,
      Err(EnrollmentError::NotApplicable(_))
    ));
    assert!(matches!(
      svc.record_project_submission(&c, "s@example.com", 1).await,
      Err(EnrollmentError::NotApplicable(_))
    ));
    assert!(matches!(
      svc.mark_lesson_complete(&c, "s@example.com", 1, true).await,
      Err(EnrollmentError::NotApplicable(_))
    ));
    assert!(matches!(
      svc.mark_lesson_complete(&c, "s@example.com", 9, true).await,
      Err(EnrollmentError::NoSuchLesson(9))
    ));
  }

  #[tokio::test]
  async fn full_course_reaches_one_hundred() {
    let (svc, _) = service();
    let c = demo_course();
    let email = "s@example.com";
    svc.record_quiz_result(&c, email, 1, &score_outcome(3, 3, 70, DifficultyLabel::Hard)).await.unwrap();
    svc.mark_lesson_complete(&c, email, 2, true).await.unwrap();
    let e = svc.record_project_submission(&c, email, 3).await.unwrap();
    assert_eq!(e.completion_percentage, 100);
    assert_eq!(e.progress_for(3).and_then(|p| p.project_submitted), Some(true));
  }

  #[tokio::test]
  async fn concurrent_writes_are_not_lost() {
    let (svc, store) = service();
    let c = course(vec![lesson(1, false), lesson(2, false), lesson(3, false), lesson(4, false)]);
    let email = "s@example.com";
    svc.ensure(&c, email).await.unwrap();

    let (a, b, d) = tokio::join!(
      svc.mark_lesson_complete(&c, email, 1, true),
      svc.mark_lesson_complete(&c, email, 2, true),
      svc.mark_lesson_complete(&c, email, 3, true),
    );
    a.unwrap();
    b.unwrap();
    d.unwrap();

    let e = svc.find(c.id, email).await.unwrap().unwrap();
    let stored = store.get(e.id).await.unwrap();
    assert_eq!(stored.progress.len(), 3);
    assert_eq!(stored.completion_percentage, 75);
  }

  #[tokio::test]
  async fn stale_write_rejected_then_service_rereads() {
    let store = Arc::new(MemoryStore::<Enrollment>::new());
    let svc = EnrollmentService::new(store.clone(), 1);
    let c = course(vec![lesson(1, false)]);
    let e = svc.ensure(&c, "s@example.com").await.unwrap();

    // another writer lands between our read and our write
    let id = e.id;
    let stale = e.clone();
    store.update(id, json!({ "completion_percentage": 0 })).await.unwrap();
    let next = apply_progress(&stale, manual_progress(None, 1, true, Utc::now()), 1);
    let err = store
      .update_if_version(id, stale.version, json!({ "progress": next.progress }))
      .await
      .unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));

    // the service re-reads, so a fresh call still succeeds
    let saved = svc.mark_lesson_complete(&c, "s@example.com", 1, true).await.unwrap();
    assert_eq!(saved.completion_percentage, 100);
  }
}
