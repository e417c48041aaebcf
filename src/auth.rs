//! Authentication collaborator and the gate in front of the API.
//!
//! `AuthState` is resolved once per request from the authenticator's answer;
//! handlers receive an already-authorized user through the `CurrentUser` and
//! `Subscriber` extractors. Where to send a rejected user (login or pricing
//! page) comes from config and travels in the error body.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::UserCfg;
use crate::domain::UserProfile;
use crate::error::ApiError;
use crate::state::AppState;
use crate::util::bearer_token;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingToken,
    #[error("unknown or expired token")]
    InvalidToken,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// The profile behind a token (`auth.me()`).
    async fn me(&self, token: &str) -> Result<UserProfile, AuthError>;
}

/// Token table loaded from config.
#[derive(Default)]
pub struct StaticAuthenticator {
    users: HashMap<String, UserProfile>,
}

impl StaticAuthenticator {
    pub fn from_users(users: &[UserCfg]) -> Self {
        let users = users
            .iter()
            .map(|u| {
                (
                    u.token.clone(),
                    UserProfile {
                        email: u.email.clone(),
                        full_name: u.full_name.clone(),
                        profile_picture_url: u.profile_picture_url.clone(),
                        subscription: u.subscription.clone(),
                    },
                )
            })
            .collect();
        Self { users }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn me(&self, token: &str) -> Result<UserProfile, AuthError> {
        self.users.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AuthState {
    Checking,
    Unauthenticated,
    UnauthorizedNoSubscription(UserProfile),
    Authorized(UserProfile),
}

impl AuthState {
    /// Transition out of `Checking` once the authenticator has answered.
    pub fn resolve(self, answer: Result<UserProfile, AuthError>, require_subscription: bool) -> AuthState {
        if self != AuthState::Checking {
            return self;
        }
        match answer {
            Err(_) => AuthState::Unauthenticated,
            Ok(profile) => {
                let subscribed = profile.subscription.as_ref().map(|s| s.is_usable()).unwrap_or(false);
                if require_subscription && !subscribed {
                    AuthState::UnauthorizedNoSubscription(profile)
                } else {
                    AuthState::Authorized(profile)
                }
            }
        }
    }

    pub fn into_result(self, state: &AppState) -> Result<UserProfile, ApiError> {
        match self {
            AuthState::Authorized(p) => Ok(p),
            AuthState::UnauthorizedNoSubscription(_) => Err(ApiError::SubscriptionRequired {
                pricing_url: state.config.auth.pricing_url.clone(),
            }),
            AuthState::Checking | AuthState::Unauthenticated => Err(ApiError::Unauthenticated {
                login_url: state.config.auth.login_url.clone(),
            }),
        }
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer header first; `?token=` for WebSocket clients that cannot set headers.
fn request_token(parts: &Parts) -> Option<String> {
    if let Some(token) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
    {
        return Some(token.to_string());
    }
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|q| q.0.token)
        .filter(|t| !t.is_empty())
}

#[instrument(level = "debug", skip(parts, state))]
async fn authorize(parts: &Parts, state: &AppState, require_subscription: bool) -> Result<UserProfile, ApiError> {
    let answer = match request_token(parts) {
        Some(token) => state.auth.me(&token).await,
        None => Err(AuthError::MissingToken),
    };
    if let Err(e) = &answer {
        debug!(target: "coursespark", error = %e, "Request not authenticated");
    }
    AuthState::Checking
        .resolve(answer, require_subscription)
        .into_result(state)
}

/// Any signed-in user.
pub struct CurrentUser(pub UserProfile);

/// Signed-in user with an active or trialing subscription.
pub struct Subscriber(pub UserProfile);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        authorize(parts, state, false).await.map(CurrentUser)
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Subscriber {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        authorize(parts, state, true).await.map(Subscriber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Subscription, SubscriptionStatus};

    fn profile(status: Option<SubscriptionStatus>) -> UserProfile {
        UserProfile {
            email: "u@example.com".into(),
            full_name: "U".into(),
            profile_picture_url: None,
            subscription: status.map(|status| Subscription { plan: "pro".into(), status }),
        }
    }

    #[test]
    fn failed_check_is_unauthenticated() {
        let s = AuthState::Checking.resolve(Err(AuthError::InvalidToken), false);
        assert_eq!(s, AuthState::Unauthenticated);
    }

    #[test]
    fn subscription_only_matters_when_required() {
        let p = profile(None);
        assert_eq!(AuthState::Checking.resolve(Ok(p.clone()), false), AuthState::Authorized(p.clone()));
        assert_eq!(
            AuthState::Checking.resolve(Ok(p.clone()), true),
            AuthState::UnauthorizedNoSubscription(p)
        );

        let canceled = profile(Some(SubscriptionStatus::Canceled));
        assert!(matches!(
            AuthState::Checking.resolve(Ok(canceled), true),
            AuthState::UnauthorizedNoSubscription(_)
        ));

        let trial = profile(Some(SubscriptionStatus::Trialing));
        assert!(matches!(AuthState::Checking.resolve(Ok(trial), true), AuthState::Authorized(_)));
    }

    #[test]
    fn resolved_states_are_final() {
        let s = AuthState::Unauthenticated.resolve(Ok(profile(None)), false);
        assert_eq!(s, AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn static_table_lookup() {
        let auth = StaticAuthenticator::from_users(&[UserCfg {
            token: "t".into(),
            email: "a@example.com".into(),
            full_name: "A".into(),
            profile_picture_url: None,
            subscription: None,
        }]);
        assert_eq!(auth.len(), 1);
        assert_eq!(auth.me("t").await.unwrap().email, "a@example.com");
        assert_eq!(auth.me("nope").await, Err(AuthError::InvalidToken));
    }

    #[test]
    fn token_from_header_or_query() {
        let req = axum::http::Request::builder()
            .uri("/ws?token=qtok")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(request_token(&parts).as_deref(), Some("qtok"));

        let req = axum::http::Request::builder()
            .uri("/api/v1/me?token=qtok")
            .header(AUTHORIZATION, "Bearer htok")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(request_token(&parts).as_deref(), Some("htok"));
    }
}
