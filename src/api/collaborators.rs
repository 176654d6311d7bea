//! Interfaces to services that live outside this crate: the auth/session
//! provider and the user-statistics store.
//!
//! The defaults let the service run standalone; deployments inject their
//! own implementations through `ApiContext`.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
}

/// Resolves the signed-in user for a request, if any.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn current_user(&self, headers: &HeaderMap) -> Option<User>;
}

/// No auth service: every request is anonymous.
pub struct AnonymousSessions;

#[async_trait]
impl SessionLookup for AnonymousSessions {
    async fn current_user(&self, _headers: &HeaderMap) -> Option<User> {
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("User statistics unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserStats: Send + Sync {
    async fn count_users(&self) -> Result<u64, StatsError>;

    /// Sessions whose expiry lies after `now`.
    async fn count_active_sessions(&self, now: DateTime<Utc>) -> Result<u64, StatsError>;
}

/// No user store: reports zeros.
pub struct NoUserStats;

#[async_trait]
impl UserStats for NoUserStats {
    async fn count_users(&self) -> Result<u64, StatsError> {
        Ok(0)
    }

    async fn count_active_sessions(&self, _now: DateTime<Utc>) -> Result<u64, StatsError> {
        Ok(0)
    }
}
