//! Server-side session store
//!
//! The browser only ever holds an opaque session id inside a signed cookie.
//! The bearer token and role claim stay here.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;

pub const SESSION_COOKIE_NAME: &str = "sched_portal_session";

/// Authorization tier carried in the token's role claim
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Instructor,
}

impl Role {
    /// Parse a role claim; case-insensitive, unknown roles are rejected
    pub fn from_claim(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "INSTRUCTOR" => Some(Self::Instructor),
            _ => None,
        }
    }

    /// Landing route of the role's dashboard
    pub fn landing_path(self) -> &'static str {
        match self {
            Self::Admin => "/admin",
            Self::Instructor => "/instructor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("ADMIN"),
            Self::Instructor => f.write_str("INSTRUCTOR"),
        }
    }
}

/// Everything a successful credential exchange yields
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSeed {
    pub subject_id: String,
    pub role: Role,
    pub display_name: String,
    pub email: String,
    pub bearer_token: String,
    /// `exp` claim of the bearer token, if it had one
    pub token_expiry: Option<DateTime<Utc>>,
}

/// An authenticated session. Replaced wholesale on refresh, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub subject_id: String,
    pub role: Role,
    pub display_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub bearer_token: String,
    pub expiry: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub token_expiry: Option<DateTime<Utc>>,
}

impl Session {
    fn issue(seed: SessionSeed, ttl: Duration, now: DateTime<Utc>) -> Self {
        let expiry = capped_expiry(now + ttl, seed.token_expiry);
        Self {
            subject_id: seed.subject_id,
            role: seed.role,
            display_name: seed.display_name,
            email: seed.email,
            bearer_token: seed.bearer_token,
            expiry,
            token_expiry: seed.token_expiry,
        }
    }

    /// A copy with a fresh expiry
    fn renewed(&self, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            expiry: capped_expiry(now + ttl, self.token_expiry),
            ..self.clone()
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

fn capped_expiry(candidate: DateTime<Utc>, token_expiry: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match token_expiry {
        Some(exp) if exp < candidate => exp,
        _ => candidate,
    }
}

/// Session store (session id -> session)
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    session_ttl: Duration,
}

impl SessionStore {
    pub fn new(session_ttl_hours: i64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: Duration::hours(session_ttl_hours),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Create a session and return its id
    pub async fn create(&self, seed: SessionSeed) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::issue(seed, self.session_ttl, Utc::now());

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), session);

        id
    }

    /// Look up a live session; an expired one is evicted and reported absent
    pub async fn get(&self, id: &str) -> Option<Session> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id) {
                Some(session) if !session.is_expired(now) => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut sessions = self.sessions.write().await;
        if sessions.get(id).is_some_and(|s| s.is_expired(now)) {
            sessions.remove(id);
            tracing::debug!("session {} expired", id);
        }
        None
    }

    /// Replace a live session with a renewed copy and return it
    pub async fn refresh(&self, id: &str) -> Option<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let renewed = match sessions.get(id) {
            Some(session) if !session.is_expired(now) => session.renewed(self.session_ttl, now),
            Some(_) => {
                sessions.remove(id);
                return None;
            }
            None => return None,
        };

        sessions.insert(id.to_string(), renewed.clone());
        Some(renewed)
    }

    pub async fn delete(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
    }

    /// Drop expired sessions, returning how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[cfg(test)]
    async fn insert_raw(&self, id: &str, session: Session) {
        self.sessions.write().await.insert(id.to_string(), session);
    }
}

/// Periodic eviction of expired sessions, stopped explicitly at shutdown
pub struct SessionSweeper {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl SessionSweeper {
    pub fn start(store: Arc<SessionStore>, every: std::time::Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.cleanup_expired().await;
                        if removed > 0 {
                            tracing::info!("Evicted {} expired session(s)", removed);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Session sweeper stopped");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}
