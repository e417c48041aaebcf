//! CourseSpark backend: courses, enrollments, lesson locking and quiz sessions
//! with optional AI explanations, served over HTTP and WebSocket.

pub mod analytics;
pub mod auth;
pub mod authoring;
pub mod config;
pub mod domain;
pub mod enrollment;
pub mod error;
pub mod feedback;
pub mod llm;
pub mod logic;
pub mod openai;
pub mod progress;
pub mod protocol;
pub mod quiz;
pub mod routes;
pub mod seeds;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;

pub use routes::build_router;
pub use state::AppState;
