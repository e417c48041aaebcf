//! Domain models: courses with their lessons/quizzes, enrollments with per-lesson
//! progress, and the authenticated user profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Passing threshold used when a quiz does not set one.
pub const DEFAULT_PASSING_SCORE: u32 = 70;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Course {
  #[serde(default = "Uuid::new_v4")]
  pub id: Uuid,
  pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub category: String,
  #[serde(default)] pub level: String,
  #[serde(default)] pub duration_hours: f32,
  #[serde(default)] pub lessons: Vec<Lesson>,
  /// Email of the instructor who created the course.
  #[serde(default)] pub created_by: String,
  #[serde(default = "Utc::now")]
  pub created_date: DateTime<Utc>,
  #[serde(default)] pub version: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
  /// 1-based position, unique within a course.
  pub order: u32,
  pub title: String,
  #[serde(default)] pub content: String,
  #[serde(default)] pub quiz: Option<Quiz>,
  #[serde(default)] pub project: Option<Project>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Quiz {
  pub title: String,
  #[serde(default)] pub passing_score: Option<u32>,
  pub questions: Vec<Question>,
}

impl Quiz {
  pub fn effective_passing_score(&self) -> u32 {
    self.passing_score.unwrap_or(DEFAULT_PASSING_SCORE)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
  pub question_text: String,
  pub options: Vec<String>,
  pub correct_option_index: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Project {
  pub title: String,
  #[serde(default)] pub instructions: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Enrollment {
  pub id: Uuid,
  pub course_id: Uuid,
  pub student_email: String,
  #[serde(default)] pub progress: Vec<LessonProgress>,
  /// Derived from `progress`; rewritten on every progress update.
  #[serde(default)] pub completion_percentage: u32,
  #[serde(default)] pub version: u64,
  pub created_date: DateTime<Utc>,
}

impl Enrollment {
  pub fn new(course_id: Uuid, student_email: &str) -> Self {
    Self {
      id: Uuid::new_v4(),
      course_id,
      student_email: student_email.to_string(),
      progress: Vec::new(),
      completion_percentage: 0,
      version: 0,
      created_date: Utc::now(),
    }
  }

  pub fn progress_for(&self, lesson_order: u32) -> Option<&LessonProgress> {
    self.progress.iter().find(|p| p.lesson_order == lesson_order)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct LessonProgress {
  pub lesson_order: u32,
  #[serde(default)] pub completed: bool,
  #[serde(default)] pub completed_date: Option<DateTime<Utc>>,
  #[serde(default)] pub quiz_score: Option<u32>,
  #[serde(default)] pub quiz_passed: Option<bool>,
  #[serde(default)] pub project_submitted: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
  Active,
  Trialing,
  PastDue,
  Canceled,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
  pub plan: String,
  pub status: SubscriptionStatus,
}

impl Subscription {
  pub fn is_usable(&self) -> bool {
    matches!(self.status, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
  pub email: String,
  pub full_name: String,
  #[serde(default)] pub profile_picture_url: Option<String>,
  #[serde(default)] pub subscription: Option<Subscription>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CourseError {
  #[error("course title must not be empty")]
  EmptyTitle,
  #[error("lesson orders must be 1..={expected} without gaps or duplicates, found {found:?}")]
  BadLessonOrder { expected: usize, found: Vec<u32> },
  #[error("lesson {lesson}: quiz has no questions")]
  EmptyQuiz { lesson: u32 },
  #[error("lesson {lesson}, question {question}: needs at least one option and a valid correct_option_index")]
  BadQuestion { lesson: u32, question: usize },
}

impl Course {
  /// Structural checks applied to every course before it is stored,
  /// whether written by hand or generated.
  pub fn validate(&self) -> Result<(), CourseError> {
    if self.title.trim().is_empty() {
      return Err(CourseError::EmptyTitle);
    }

    let mut orders: Vec<u32> = self.lessons.iter().map(|l| l.order).collect();
    orders.sort_unstable();
    let contiguous = orders.iter().enumerate().all(|(i, o)| *o as usize == i + 1);
    if !contiguous {
      return Err(CourseError::BadLessonOrder { expected: self.lessons.len(), found: orders });
    }

    for lesson in &self.lessons {
      let Some(quiz) = &lesson.quiz else { continue };
      if quiz.questions.is_empty() {
        return Err(CourseError::EmptyQuiz { lesson: lesson.order });
      }
      for (i, q) in quiz.questions.iter().enumerate() {
        if q.options.is_empty() || q.correct_option_index >= q.options.len() {
          return Err(CourseError::BadQuestion { lesson: lesson.order, question: i });
        }
      }
    }
    Ok(())
  }

  pub fn lesson(&self, order: u32) -> Option<&Lesson> {
    self.lessons.iter().find(|l| l.order == order)
  }

  pub fn lessons_sorted(&self) -> Vec<&Lesson> {
    let mut lessons: Vec<&Lesson> = self.lessons.iter().collect();
    lessons.sort_by_key(|l| l.order);
    lessons
  }
}
