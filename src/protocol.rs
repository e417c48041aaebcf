//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authoring::CourseDraft;
use chrono::{DateTime, Utc};

use crate::domain::{Course, Project, UserProfile};
use crate::progress::LessonState;
use crate::quiz::{DifficultyLabel, QuizOutcome, QuizPhase};
use crate::state::SessionEntry;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartQuiz {
        course_id: Uuid,
        lesson_order: u32,
    },
    /// Subscribe to explanation pushes for a session started over HTTP.
    Watch {
        session_id: Uuid,
    },
    SelectAnswer {
        session_id: Uuid,
        option_index: usize,
    },
    SubmitAnswer {
        session_id: Uuid,
    },
    Advance {
        session_id: Uuid,
    },
    Save {
        session_id: Uuid,
    },
    Retake {
        session_id: Uuid,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionView,
    },
    /// Pushed when an explanation for an earlier wrong answer arrives.
    Explanation {
        session_id: Uuid,
        question_index: usize,
        text: String,
    },
    Error {
        message: String,
    },
}

/// Question as shown before answering: no correct index.
#[derive(Debug, Serialize, Clone)]
pub struct QuestionOut {
    pub index: usize,
    pub question_text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct FeedbackOut {
    pub selected_answer: usize,
    pub correct: bool,
    pub correct_option_index: usize,
    pub explanation: Option<String>,
    pub explanation_pending: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct SessionView {
    pub session_id: Uuid,
    pub course_id: Uuid,
    pub lesson_order: u32,
    pub quiz_title: String,
    pub total_questions: usize,
    pub phase: QuizPhase,
    pub question: Option<QuestionOut>,
    pub feedback: Option<FeedbackOut>,
    pub streak: i32,
    pub difficulty: DifficultyLabel,
    pub outcome: Option<QuizOutcome>,
    pub saved: bool,
    pub save_error: Option<String>,
}

/// Render a live session for its owner.
pub fn session_view(id: Uuid, entry: &SessionEntry) -> SessionView {
    let s = &entry.session;
    let question = s.current_index().and_then(|i| {
        s.quiz().questions.get(i).map(|q| QuestionOut {
            index: i,
            question_text: q.question_text.clone(),
            options: q.options.clone(),
        })
    });
    let feedback = match s.phase() {
        QuizPhase::FeedbackShown { index, selected, correct } => Some(FeedbackOut {
            selected_answer: *selected,
            correct: *correct,
            correct_option_index: s.quiz().questions[*index].correct_option_index,
            explanation: s.current_explanation().map(str::to_string),
            explanation_pending: entry.pending_explanations.contains(index),
        }),
        _ => None,
    };
    SessionView {
        session_id: id,
        course_id: entry.course_id,
        lesson_order: entry.lesson_order,
        quiz_title: s.quiz().title.clone(),
        total_questions: s.quiz().questions.len(),
        phase: s.phase().clone(),
        question,
        feedback,
        streak: s.streak(),
        difficulty: s.difficulty(),
        outcome: s.outcome(),
        saved: entry.saved,
        save_error: entry.save_error.clone(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct CourseQuery {
    pub category: Option<String>,
    pub level: Option<String>,
}

/// Course summary for listings; lessons are fetched separately.
#[derive(Debug, Serialize)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub level: String,
    pub duration_hours: f32,
    pub lesson_count: usize,
}

pub fn to_summary(c: &Course) -> CourseSummary {
    CourseSummary {
        id: c.id,
        title: c.title.clone(),
        description: c.description.clone(),
        category: c.category.clone(),
        level: c.level.clone(),
        duration_hours: c.duration_hours,
        lesson_count: c.lessons.len(),
    }
}

/// Quiz question as a student may see it outside a session: no correct index.
#[derive(Debug, Serialize)]
pub struct QuestionPreview {
    pub question_text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QuizPreview {
    pub title: String,
    pub passing_score: Option<u32>,
    pub questions: Vec<QuestionPreview>,
}

#[derive(Debug, Serialize)]
pub struct LessonOut {
    pub order: u32,
    pub title: String,
    pub content: String,
    pub quiz: Option<QuizPreview>,
    pub project: Option<Project>,
}

#[derive(Debug, Serialize)]
pub struct CourseDetail {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub level: String,
    pub duration_hours: f32,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub lessons: Vec<LessonOut>,
}

/// The creator gets the stored course with answers; everyone else the detail view.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CourseOut {
    Full(Course),
    Student(CourseDetail),
}

pub fn to_detail(c: &Course) -> CourseDetail {
    let lessons = c
        .lessons_sorted()
        .into_iter()
        .map(|l| LessonOut {
            order: l.order,
            title: l.title.clone(),
            content: l.content.clone(),
            quiz: l.quiz.as_ref().map(|q| QuizPreview {
                title: q.title.clone(),
                passing_score: q.passing_score,
                questions: q
                    .questions
                    .iter()
                    .map(|qq| QuestionPreview { question_text: qq.question_text.clone(), options: qq.options.clone() })
                    .collect(),
            }),
            project: l.project.clone(),
        })
        .collect();
    CourseDetail {
        id: c.id,
        title: c.title.clone(),
        description: c.description.clone(),
        category: c.category.clone(),
        level: c.level.clone(),
        duration_hours: c.duration_hours,
        created_by: c.created_by.clone(),
        created_date: c.created_date,
        lessons,
    }
}

pub type CreateCourseIn = CourseDraft;

#[derive(Debug, Deserialize)]
pub struct GenerateCourseIn {
    pub topic: String,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_lesson_count")]
    pub lesson_count: u32,
}

fn default_level() -> String {
    "beginner".into()
}

fn default_lesson_count() -> u32 {
    3
}

#[derive(Debug, Deserialize)]
pub struct CompleteLessonIn {
    #[serde(default = "default_true")]
    pub completed: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct LessonsOut {
    pub enrollment_id: Uuid,
    pub completion_percentage: u32,
    pub lessons: Vec<LessonState>,
}

#[derive(Debug, Deserialize)]
pub struct StartQuizIn {
    pub course_id: Uuid,
    pub lesson_order: u32,
}

#[derive(Debug, Deserialize)]
pub struct SelectIn {
    pub option_index: usize,
}

#[derive(Serialize)]
pub struct MeOut {
    #[serde(flatten)]
    pub profile: UserProfile,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub ai_enabled: bool,
}
