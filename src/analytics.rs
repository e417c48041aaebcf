//! Instructor dashboard numbers for one course, computed from its enrollments.

use serde::Serialize;

use crate::domain::{Course, Enrollment};

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LessonStats {
  pub order: u32,
  pub title: String,
  pub completions: usize,
  pub quiz_attempts: usize,
  pub average_quiz_score: Option<f64>,
  pub quiz_pass_rate: Option<f64>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct CourseAnalytics {
  pub course_id: uuid::Uuid,
  pub enrollments: usize,
  pub completed_enrollments: usize,
  pub average_completion: f64,
  pub lessons: Vec<LessonStats>,
}

fn mean(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    None
  } else {
    Some(values.iter().sum::<f64>() / values.len() as f64)
  }
}

/// Quiz attempts count students with a recorded score, i.e. their latest attempt.
pub fn course_analytics(course: &Course, enrollments: &[Enrollment]) -> CourseAnalytics {
  let lessons = course
    .lessons_sorted()
    .into_iter()
    .map(|lesson| {
      let entries: Vec<_> = enrollments
        .iter()
        .filter_map(|e| e.progress_for(lesson.order))
        .collect();
      let scores: Vec<f64> = entries.iter().filter_map(|p| p.quiz_score).map(f64::from).collect();
      let passes: Vec<f64> = entries
        .iter()
        .filter_map(|p| p.quiz_passed)
        .map(|ok| if ok { 1.0 } else { 0.0 })
        .collect();
      LessonStats {
        order: lesson.order,
        title: lesson.title.clone(),
        completions: entries.iter().filter(|p| p.completed).count(),
        quiz_attempts: scores.len(),
        average_quiz_score: mean(&scores),
        quiz_pass_rate: mean(&passes),
      }
    })
    .collect();

  let completion: Vec<f64> = enrollments.iter().map(|e| f64::from(e.completion_percentage)).collect();
  CourseAnalytics {
    course_id: course.id,
    enrollments: enrollments.len(),
    completed_enrollments: enrollments.iter().filter(|e| e.completion_percentage >= 100).count(),
    average_completion: mean(&completion).unwrap_or(0.0),
    lessons,
  }
}
