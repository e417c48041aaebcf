//! Application state: entity stores, the enrollment service, the authenticator,
//! the optional LLM client, prompts/config, and live quiz sessions.
//!
//! Quiz sessions live in memory only. Finished outcomes are persisted into the
//! student's enrollment; everything else about a session is disposable.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::{mpsc::UnboundedSender, RwLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::{Authenticator, StaticAuthenticator};
use crate::config::{load_config_from_env, AppConfig};
use crate::domain::{Course, Enrollment};
use crate::enrollment::EnrollmentService;
use crate::llm::LlmClient;
use crate::openai::OpenAI;
use crate::protocol::ServerWsMessage;
use crate::quiz::QuizSession;
use crate::seeds::{seed_courses, seed_users};
use crate::store::{EntityStore, MemoryStore};

/// One student's run through one lesson quiz.
pub struct SessionEntry {
    pub owner: String,
    pub course_id: Uuid,
    pub lesson_order: u32,
    pub session: QuizSession,
    /// Question indexes with an explanation request in flight.
    pub pending_explanations: HashSet<usize>,
    /// True once the finished outcome is stored in the enrollment.
    pub saved: bool,
    pub save_error: Option<String>,
    /// WebSocket of the owner, for pushing explanations as they arrive.
    pub listener: Option<UnboundedSender<ServerWsMessage>>,
    /// Bumped on every owner command; idle sessions are evicted after the TTL.
    pub last_active: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub courses: Arc<dyn EntityStore<Course>>,
    pub enrollments: EnrollmentService,
    pub auth: Arc<dyn Authenticator>,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl AppState {
    /// Build state from env: load config, seed users/courses, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub async fn from_env() -> Self {
        let mut config = load_config_from_env().unwrap_or_default();
        if config.users.is_empty() {
            warn!(target: "coursespark", "No [[users]] configured; using built-in demo accounts");
            config.users = seed_users();
        }

        let llm: Option<Arc<dyn LlmClient>> = match OpenAI::from_env(&config.prompts.system) {
            Some(oa) => {
                info!(target: "coursespark", client = %oa.describe(), "OpenAI enabled.");
                Some(Arc::new(oa))
            }
            None => {
                info!(target: "coursespark", "OpenAI disabled (no OPENAI_API_KEY). AI explanations and course generation are off.");
                None
            }
        };

        let auth = Arc::new(StaticAuthenticator::from_users(&config.users));
        info!(target: "coursespark", users = auth.len(), "Authenticator ready");

        let state = Self::new(
            config,
            Arc::new(MemoryStore::<Course>::new()),
            Arc::new(MemoryStore::<Enrollment>::new()),
            auth,
            llm,
        );
        state.load_courses().await;
        state
    }

    pub fn new(
        config: AppConfig,
        courses: Arc<dyn EntityStore<Course>>,
        enrollments: Arc<dyn EntityStore<Enrollment>>,
        auth: Arc<dyn Authenticator>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        let enrollments = EnrollmentService::new(enrollments, config.quiz.max_write_attempts);
        Self {
            config,
            courses,
            enrollments,
            auth,
            llm,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.config.quiz.session_ttl_secs)
    }

    /// Drop sessions idle for longer than the TTL. Returns how many went.
    pub async fn evict_idle_sessions(&self) -> usize {
        let ttl = self.session_ttl();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, e| e.last_active.elapsed() <= ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(target: "quiz", evicted, remaining = sessions.len(), "Idle quiz sessions evicted");
        }
        evicted
    }

    /// Periodic eviction so abandoned sessions don't pile up between quiz starts.
    pub fn spawn_session_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let state = Arc::clone(self);
        let every = (state.session_ttl() / 4).max(Duration::from_secs(30));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                state.evict_idle_sessions().await;
            }
        })
    }

    /// Store configured courses, or the built-in ones when none are configured.
    /// Invalid entries are skipped with an error log.
    pub async fn load_courses(&self) {
        let configured = self.config.courses.clone();
        let from_config = !configured.is_empty();
        let courses = if from_config { configured } else { seed_courses() };

        let mut loaded = 0usize;
        for course in courses {
            if let Err(e) = course.validate() {
                tracing::error!(target: "coursespark", id = %course.id, title = %course.title, error = %e, "Skipping invalid course");
                continue;
            }
            match self.courses.create(course).await {
                Ok(_) => loaded += 1,
                Err(e) => tracing::error!(target: "coursespark", error = %e, "Failed to store course"),
            }
        }
        info!(target: "coursespark", loaded, from_config, "Course bank loaded");
    }
}
