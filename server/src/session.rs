//! In-memory sessions.
//!
//! Login is username-only: the session id is a bearer token identifying the
//! user across requests. Durable identity lives in the `users` table; this
//! map only bridges token to user for the life of the process.

use std::collections::HashMap;
use std::sync::RwLock;

use axum::http::HeaderMap;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, user_id: Uuid, username: &str) -> Uuid {
        let token = Uuid::new_v4();
        self.sessions.write().unwrap().insert(
            token,
            Session {
                user_id,
                username: username.to_owned(),
            },
        );
        token
    }

    pub fn get(&self, token: Uuid) -> Option<Session> {
        self.sessions.read().unwrap().get(&token).cloned()
    }

    /// Resolve the caller's session from `Authorization: Bearer <token>` or
    /// an `x-session-id` header
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<Session> {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .or_else(|| headers.get("x-session-id").and_then(|v| v.to_str().ok()))?;
        self.get(Uuid::parse_str(token.trim()).ok()?)
    }
}
