//! Built-in content so the service is useful without external config:
//! one demo course and two demo accounts.

use chrono::Utc;
use uuid::Uuid;

use crate::config::UserCfg;
use crate::domain::{Course, Lesson, Project, Question, Quiz, Subscription, SubscriptionStatus};

/// Stable id so clients (and tests) can link to the demo course.
pub const DEMO_COURSE_ID: Uuid = Uuid::from_u128(0x5eed_c0de_0000_4000_8000_000000000001);

pub fn seed_users() -> Vec<UserCfg> {
  vec![
    UserCfg {
      token: "demo-instructor".into(),
      email: "instructor@coursespark.dev".into(),
      full_name: "Demo Instructor".into(),
      profile_picture_url: None,
      subscription: Some(Subscription { plan: "creator".into(), status: SubscriptionStatus::Active }),
    },
    UserCfg {
      token: "demo-student".into(),
      email: "student@coursespark.dev".into(),
      full_name: "Demo Student".into(),
      profile_picture_url: None,
      subscription: None,
    },
  ]
}

fn q(text: &str, options: &[&str], correct: usize) -> Question {
  Question {
    question_text: text.into(),
    options: options.iter().map(|o| o.to_string()).collect(),
    correct_option_index: correct,
  }
}

pub fn seed_courses() -> Vec<Course> {
  vec![Course {
    id: DEMO_COURSE_ID,
    title: "Web Basics in an Afternoon".into(),
    description: "HTML structure, CSS styling and a first page of your own.".into(),
    category: "web-development".into(),
    level: "beginner".into(),
    duration_hours: 3.0,
    lessons: vec![
      Lesson {
        order: 1,
        title: "What HTML is for".into(),
        content: "HTML describes the structure of a page: headings, paragraphs, links and images.".into(),
        quiz: Some(Quiz {
          title: "HTML check".into(),
          passing_score: None,
          questions: vec![
            q("Which tag makes the largest heading?", &["<h6>", "<h1>", "<head>", "<header>"], 1),
            q("What does the href attribute hold?", &["A colour", "A link target", "A font", "An id"], 1),
            q("Which element is a paragraph?", &["<p>", "<para>", "<pg>", "<text>"], 0),
          ],
        }),
        project: None,
      },
      Lesson {
        order: 2,
        title: "Styling with CSS".into(),
        content: "CSS selects elements and applies rules such as color, margin and font-size.".into(),
        quiz: Some(Quiz {
          title: "CSS check".into(),
          passing_score: Some(60),
          questions: vec![
            q("Which property changes text colour?", &["font-color", "text-color", "color", "fg"], 2),
            q("How do you select class \"card\"?", &["#card", ".card", "card", "*card"], 1),
            q("Which unit is relative to the root font size?", &["px", "em", "rem", "pt"], 2),
            q("Which property adds space outside the border?", &["padding", "margin", "gap", "outline"], 1),
            q("Where should stylesheets usually be linked?", &["<head>", "<footer>", "<body> end", "<title>"], 0),
          ],
        }),
        project: None,
      },
      Lesson {
        order: 3,
        title: "Your first page".into(),
        content: "Put it together: a page with a heading, a paragraph and a styled link.".into(),
        quiz: None,
        project: Some(Project {
          title: "Personal landing page".into(),
          instructions: "Publish a single page with your name, a short bio and one styled link.".into(),
        }),
      },
    ],
    created_by: "instructor@coursespark.dev".into(),
    created_date: Utc::now(),
    version: 0,
  }]
}
