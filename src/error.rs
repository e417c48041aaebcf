//! API error type shared by HTTP handlers, and its JSON rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::authoring::AuthoringError;
use crate::domain::CourseError;
use crate::enrollment::EnrollmentError;
use crate::llm::LlmError;
use crate::quiz::QuizError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated { login_url: String },

    #[error("an active subscription is required")]
    SubscriptionRequired { pricing_url: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("lesson {0} is locked until the previous quiz is passed")]
    LessonLocked(u32),

    #[error(transparent)]
    Quiz(#[from] QuizError),

    #[error("AI features are not configured")]
    LlmUnavailable,

    #[error("upstream AI call failed: {0}")]
    Llm(LlmError),

    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, id } => ApiError::NotFound(format!("{collection}/{id}")),
            other => ApiError::Store(other),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Disabled => ApiError::LlmUnavailable,
            other => ApiError::Llm(other),
        }
    }
}

impl From<CourseError> for ApiError {
    fn from(e: CourseError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<AuthoringError> for ApiError {
    fn from(e: AuthoringError) -> Self {
        match e {
            AuthoringError::Llm(e) => e.into(),
            AuthoringError::Invalid(e) => e.into(),
            AuthoringError::LessonCount => ApiError::BadRequest(AuthoringError::LessonCount.to_string()),
        }
    }
}

impl From<EnrollmentError> for ApiError {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::LessonLocked(order) => ApiError::LessonLocked(order),
            EnrollmentError::NoSuchLesson(order) => ApiError::NotFound(format!("lesson {order}")),
            EnrollmentError::NotApplicable(msg) => ApiError::BadRequest(msg),
            EnrollmentError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code, extra) = match &self {
            ApiError::Unauthenticated { login_url } => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", json!({ "login_url": login_url }))
            }
            ApiError::SubscriptionRequired { pricing_url } => (
                StatusCode::PAYMENT_REQUIRED,
                "SUBSCRIPTION_REQUIRED",
                json!({ "pricing_url": pricing_url }),
            ),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", json!(null)),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", json!(null)),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", json!(null)),
            ApiError::LessonLocked(_) => (StatusCode::CONFLICT, "LESSON_LOCKED", json!(null)),
            ApiError::Quiz(_) => (StatusCode::CONFLICT, "QUIZ_STATE", json!(null)),
            ApiError::LlmUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "AI_UNAVAILABLE", json!(null)),
            ApiError::Llm(_) => (StatusCode::BAD_GATEWAY, "AI_FAILED", json!(null)),
            ApiError::Store(StoreError::VersionConflict { .. }) => {
                (StatusCode::CONFLICT, "WRITE_CONFLICT", json!(null))
            }
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", json!(null)),
        };

        let mut error = json!({ "code": code, "message": message });
        if let (Some(obj), Some(extra)) = (error.as_object_mut(), extra.as_object()) {
            obj.extend(extra.clone());
        }
        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(e: ApiError) -> (StatusCode, serde_json::Value) {
        let res = e.into_response();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unauthenticated_carries_login_url() {
        let (status, body) = render(ApiError::Unauthenticated { login_url: "/login".into() }).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
        assert_eq!(body["error"]["login_url"], "/login");
    }

    #[tokio::test]
    async fn store_not_found_maps_to_404() {
        let id = uuid::Uuid::new_v4();
        let (status, _) = render(StoreError::NotFound { collection: "courses", id }.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn disabled_llm_maps_to_503() {
        let (status, body) = render(LlmError::Disabled.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "AI_UNAVAILABLE");
    }
}
