// ============================
// debate-backend-lib/src/auth/session.rs
// ============================
//! Browser session handling and management.
//!
//! A session is an opaque per-browser identity carried in a cookie. It holds
//! the `activeDebates` map from session code to the role the browser plays in
//! that debate. No credentials are checked.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use debate_common::Role;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::metrics::SESSION_EXPIRED;

/// Longest lifetime a session can be given
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);

/// Session information
#[derive(Debug, Clone)]
pub struct BrowserSession {
    pub id: String,
    /// session code -> role
    pub active_debates: HashMap<String, Role>,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

impl BrowserSession {
    fn is_live(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }
}

/// Session store keyed by session id
pub struct SessionStore {
    sessions: DashMap<String, BrowserSession>,
    ttl: Duration,
}

impl SessionStore {
    /// `ttl` is capped at [`MAX_SESSION_TTL`].
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: ttl.min(MAX_SESSION_TTL),
        }
    }

    /// Create a new empty session and return its id
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let now = SystemTime::now();
        self.sessions.insert(
            id.clone(),
            BrowserSession {
                id: id.clone(),
                active_debates: HashMap::new(),
                created_at: now,
                expires_at: now.checked_add(self.ttl).unwrap_or(now + MAX_SESSION_TTL),
            },
        );
        id
    }

    /// Whether `id` names a live session
    pub fn exists(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Get a live session by id
    pub fn get(&self, id: &str) -> Option<BrowserSession> {
        let now = SystemTime::now();
        self.sessions
            .get(id)
            .filter(|s| s.is_live(now))
            .map(|s| s.value().clone())
    }

    /// Role recorded for `session_code` in session `id`
    pub fn role_for(&self, id: &str, session_code: &str) -> Option<Role> {
        let now = SystemTime::now();
        let session = self.sessions.get(id).filter(|s| s.is_live(now))?;
        session.active_debates.get(session_code).cloned()
    }

    /// Record `role` under its session code. Returns `false` if the session
    /// does not exist.
    pub fn record_role(&self, id: &str, role: Role) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.active_debates.insert(role.session_code.clone(), role);
                true
            },
            None => false,
        }
    }

    /// Drop one `activeDebates` entry. Missing entries are ignored.
    pub fn remove_active_debate(&self, id: &str, session_code: &str) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.active_debates.remove(session_code);
        }
    }

    /// Remove the entries for `codes` from every session. Returns how many
    /// entries were removed.
    pub fn purge_debates(&self, codes: &[String]) -> usize {
        if codes.is_empty() {
            return 0;
        }
        let mut removed = 0;
        for mut session in self.sessions.iter_mut() {
            let before = session.active_debates.len();
            session
                .active_debates
                .retain(|code, _| !codes.contains(code));
            removed += before - session.active_debates.len();
        }
        removed
    }

    /// Remove expired sessions, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let now = SystemTime::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.is_live(now));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            metrics::counter!(SESSION_EXPIRED).increment(removed as u64);
            tracing::debug!(removed, "Expired sessions swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Spawn the task that periodically removes expired sessions
    pub fn spawn_cleanup_task(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }
}
