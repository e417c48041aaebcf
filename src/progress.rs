//! Lesson progress: the one reducer every progress write goes through, the
//! completion percentage derived from it, and the lesson locking rule.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Course, Enrollment, Lesson, LessonProgress};
use crate::quiz::QuizOutcome;

/// Replace the entry with the same `lesson_order` in place, or append it.
pub fn upsert_progress(progress: &[LessonProgress], entry: LessonProgress) -> Vec<LessonProgress> {
  let mut out = progress.to_vec();
  match out.iter_mut().find(|p| p.lesson_order == entry.lesson_order) {
    Some(slot) => *slot = entry,
    None => out.push(entry),
  }
  out
}

/// `round(100 * completed / lesson_count)`, clamped to `0..=100`.
pub fn completion_percentage(progress: &[LessonProgress], lesson_count: usize) -> u32 {
  if lesson_count == 0 {
    return 0;
  }
  let completed = progress.iter().filter(|p| p.completed).count().min(lesson_count);
  (100.0 * completed as f64 / lesson_count as f64).round() as u32
}

/// Reducer plus percentage recompute. The only path through which an
/// enrollment's progress changes.
pub fn apply_progress(enrollment: &Enrollment, entry: LessonProgress, lesson_count: usize) -> Enrollment {
  let progress = upsert_progress(&enrollment.progress, entry);
  let completion_percentage = completion_percentage(&progress, lesson_count);
  Enrollment { progress, completion_percentage, ..enrollment.clone() }
}

fn base(existing: Option<&LessonProgress>, lesson_order: u32) -> LessonProgress {
  existing
    .cloned()
    .unwrap_or(LessonProgress { lesson_order, ..Default::default() })
}

/// A lesson with a quiz counts as completed only while its latest attempt passed.
pub fn quiz_progress(
  existing: Option<&LessonProgress>,
  lesson_order: u32,
  outcome: &QuizOutcome,
  now: DateTime<Utc>,
) -> LessonProgress {
  let mut p = base(existing, lesson_order);
  p.quiz_score = Some(outcome.score);
  p.quiz_passed = Some(outcome.passed);
  p.completed = outcome.passed;
  p.completed_date = if outcome.passed { Some(p.completed_date.unwrap_or(now)) } else { None };
  p
}

pub fn project_progress(existing: Option<&LessonProgress>, lesson_order: u32, now: DateTime<Utc>) -> LessonProgress {
  let mut p = base(existing, lesson_order);
  p.project_submitted = Some(true);
  p.completed = true;
  p.completed_date = Some(p.completed_date.unwrap_or(now));
  p
}

/// "Mark as complete" for lessons without a quiz or project.
pub fn manual_progress(
  existing: Option<&LessonProgress>,
  lesson_order: u32,
  completed: bool,
  now: DateTime<Utc>,
) -> LessonProgress {
  let mut p = base(existing, lesson_order);
  p.completed = completed;
  p.completed_date = if completed { Some(p.completed_date.unwrap_or(now)) } else { None };
  p
}

/// Lesson 1 is never locked. Any later lesson is locked when its predecessor
/// has a quiz that has not been passed.
pub fn is_lesson_locked(lessons: &[Lesson], progress: &[LessonProgress], order: u32) -> bool {
  let predecessor = lessons
    .iter()
    .filter(|l| l.order < order)
    .max_by_key(|l| l.order);
  let Some(prev) = predecessor else { return false };
  if prev.quiz.is_none() {
    return false;
  }
  let passed = progress
    .iter()
    .find(|p| p.lesson_order == prev.order)
    .and_then(|p| p.quiz_passed)
    .unwrap_or(false);
  !passed
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LessonState {
  pub order: u32,
  pub title: String,
  pub locked: bool,
  pub completed: bool,
  pub has_quiz: bool,
  pub has_project: bool,
  pub quiz_score: Option<u32>,
}

pub fn lesson_states(course: &Course, enrollment: &Enrollment) -> Vec<LessonState> {
  course
    .lessons_sorted()
    .into_iter()
    .map(|l| {
      let p = enrollment.progress_for(l.order);
      LessonState {
        order: l.order,
        title: l.title.clone(),
        locked: is_lesson_locked(&course.lessons, &enrollment.progress, l.order),
        completed: p.map(|p| p.completed).unwrap_or(false),
        has_quiz: l.quiz.is_some(),
        has_project: l.project.is_some(),
        quiz_score: p.and_then(|p| p.quiz_score),
      }
    })
    .collect()
}
