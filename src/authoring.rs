//! Course authoring: hand-written courses and LLM-generated outlines.
//! Both paths end in `Course::validate` before anything is stored.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Prompts;
use crate::domain::{Course, CourseError, Lesson, Quiz};
use crate::llm::{decode, InvokeLlm, LlmClient, LlmError};
use crate::util::fill_template;

pub const MAX_GENERATED_LESSONS: u32 = 12;

#[derive(Debug, thiserror::Error)]
pub enum AuthoringError {
  #[error(transparent)]
  Llm(#[from] LlmError),
  #[error("invalid course: {0}")]
  Invalid(#[from] CourseError),
  #[error("lesson_count must be between 1 and 12")]
  LessonCount,
}

/// Fields an author supplies; id, ownership and timestamps are assigned here.
#[derive(Clone, Debug, Deserialize)]
pub struct CourseDraft {
  pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub category: String,
  #[serde(default)] pub level: String,
  #[serde(default)] pub duration_hours: f32,
  #[serde(default)] pub lessons: Vec<Lesson>,
}

impl CourseDraft {
  pub fn into_course(self, created_by: &str) -> Result<Course, CourseError> {
    let course = Course {
      id: Uuid::new_v4(),
      title: self.title.trim().to_string(),
      description: self.description,
      category: self.category,
      level: self.level,
      duration_hours: self.duration_hours,
      lessons: self.lessons,
      created_by: created_by.to_string(),
      created_date: Utc::now(),
      version: 0,
    };
    course.validate()?;
    Ok(course)
  }
}

#[derive(Deserialize)]
struct GeneratedLesson {
  title: String,
  content: String,
  quiz: Option<Quiz>,
}

#[derive(Deserialize)]
struct GeneratedCourse {
  title: String,
  description: String,
  category: String,
  duration_hours: f32,
  lessons: Vec<GeneratedLesson>,
}

fn outline_schema() -> Value {
  json!({
    "type": "object",
    "required": ["title", "description", "category", "duration_hours", "lessons"],
    "properties": {
      "title": { "type": "string" },
      "description": { "type": "string" },
      "category": { "type": "string" },
      "duration_hours": { "type": "number" },
      "lessons": {
        "type": "array",
        "items": {
          "type": "object",
          "required": ["title", "content", "quiz"],
          "properties": {
            "title": { "type": "string" },
            "content": { "type": "string" },
            "quiz": {
              "type": "object",
              "required": ["title", "questions"],
              "properties": {
                "title": { "type": "string" },
                "passing_score": { "type": "integer" },
                "questions": {
                  "type": "array",
                  "items": {
                    "type": "object",
                    "required": ["question_text", "options", "correct_option_index"],
                    "properties": {
                      "question_text": { "type": "string" },
                      "options": { "type": "array", "items": { "type": "string" } },
                      "correct_option_index": { "type": "integer" }
                    }
                  }
                }
              }
            }
          }
        }
      }
    }
  })
}

/// Ask the LLM for a course outline and turn it into a validated draft.
/// Lesson orders are assigned from the reply's array position.
#[instrument(level = "info", skip(llm, prompts))]
pub async fn generate_course(
  llm: &dyn LlmClient,
  prompts: &Prompts,
  topic: &str,
  level: &str,
  lesson_count: u32,
) -> Result<CourseDraft, AuthoringError> {
  if lesson_count == 0 || lesson_count > MAX_GENERATED_LESSONS {
    return Err(AuthoringError::LessonCount);
  }
  let count = lesson_count.to_string();
  let prompt = fill_template(
    &prompts.course_outline_template,
    &[("topic", topic), ("level", level), ("lesson_count", count.as_str())],
  );
  let reply = llm.invoke(InvokeLlm::json(prompt, outline_schema()).strong()).await?;
  let generated: GeneratedCourse = decode(reply)?;

  if generated.lessons.len() != lesson_count as usize {
    warn!(target: "coursespark", asked = lesson_count, got = generated.lessons.len(), "Generated lesson count differs from request");
  }

  let lessons = generated
    .lessons
    .into_iter()
    .zip(1u32..)
    .map(|(l, order)| Lesson {
      order,
      title: l.title,
      content: l.content,
      // an empty generated quiz is dropped rather than failing the whole course
      quiz: l.quiz.filter(|q| !q.questions.is_empty()),
      project: None,
    })
    .collect::<Vec<_>>();

  let draft = CourseDraft {
    title: generated.title,
    description: generated.description,
    category: generated.category,
    level: level.to_string(),
    duration_hours: generated.duration_hours,
    lessons,
  };
  // validate against a throwaway course so bad questions surface here
  draft.clone().into_course("")?;
  info!(target: "coursespark", title = %draft.title, lessons = draft.lessons.len(), "Course outline generated");
  Ok(draft)
}
