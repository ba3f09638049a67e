// ============================
// debate-backend-lib/src/lib.rs
// ============================
//! Core functionality for the live debate voting server.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod connections;
pub mod debate;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod metrics;
pub mod registry;
pub mod websocket;
pub mod ws_router;

use std::sync::Arc;
use std::time::Duration;

use debate_common::{Role, ServerMessage};
use tokio::task::JoinHandle;

use crate::auth::SessionStore;
use crate::broadcast::{broadcast_to_voters, spawn_broadcast_loop};
use crate::config::Settings;
use crate::connections::ConnectionRegistry;
use crate::debate::Debate;
use crate::error::AppError;
use crate::metrics::{DEBATE_COMPLETED, DEBATE_CREATED, DEBATE_STARTED};
use crate::registry::DebateRegistry;

/// Application state shared across all handlers
pub struct AppState {
    /// Settings the server was started with
    pub settings: Arc<Settings>,
    /// Browser sessions and the roles they hold
    pub sessions: Arc<SessionStore>,
    /// Live debates by session code
    pub debates: Arc<DebateRegistry>,
    /// Live sockets by connection id
    pub connections: Arc<ConnectionRegistry>,
}

/// Handles of the long-running tasks started by [`AppState::spawn_background_tasks`]
pub struct BackgroundTasks {
    pub broadcast: JoinHandle<()>,
    pub session_cleanup: JoinHandle<()>,
}

impl BackgroundTasks {
    pub fn abort(&self) {
        self.broadcast.abort();
        self.session_cleanup.abort();
    }
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let sessions = Arc::new(SessionStore::new(settings.session_ttl()));
        Self {
            settings: Arc::new(settings),
            sessions,
            debates: Arc::new(DebateRegistry::new()),
            connections: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Start the moderator-update broadcast loop and the session sweeper.
    pub fn spawn_background_tasks(self: &Arc<Self>) -> BackgroundTasks {
        let broadcast = spawn_broadcast_loop(
            self.debates.clone(),
            self.connections.clone(),
            self.settings.broadcast_interval(),
        );
        let session_cleanup = self
            .sessions
            .spawn_cleanup_task(self.settings.session_cleanup_interval());
        tracing::info!(
            broadcast_interval_ms = self.settings.broadcast_interval_ms,
            "Background tasks started"
        );
        BackgroundTasks {
            broadcast,
            session_cleanup,
        }
    }

    /// Open a debate moderated by `session_id`, replacing any it already ran.
    pub fn open_debate<I, N>(&self, session_id: &str, participant_names: I, duration: Duration) -> Arc<Debate>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.close_debates_for_moderator(session_id);
        let debate = self.debates.create(session_id, participant_names, duration);
        self.sessions
            .record_role(session_id, Role::moderator(session_id, debate.session_code()));
        ::metrics::counter!(DEBATE_CREATED).increment(1);
        debate
    }

    /// Bind `session_id` to debate `session_code` as a voter.
    ///
    /// A session that already votes in the debate keeps its voter id.
    pub fn join_debate(&self, session_id: &str, session_code: &str, name: &str) -> Result<Role, AppError> {
        if !self.sessions.exists(session_id) {
            return Err(AppError::MissingSession);
        }
        let debate = self
            .debates
            .get(session_code)
            .ok_or_else(|| AppError::DebateNotFound(session_code.to_string()))?;
        if debate.is_completed() {
            return Err(AppError::DebateCompleted(session_code.to_string()));
        }

        if let Some(existing) = self.sessions.role_for(session_id, session_code) {
            if existing.is_moderator {
                return Err(AppError::InvalidInput(
                    "Moderators cannot vote in their own debate".to_string(),
                ));
            }
            if existing.voter_id.as_deref().is_some_and(|id| debate.has_voter(id)) {
                return Ok(existing);
            }
        }

        let voter_id = debate.register_voter(name);
        let role = Role::voter(voter_id, session_code);
        self.sessions.record_role(session_id, role.clone());
        tracing::info!(
            session_id = %session_id,
            session_code = %session_code,
            voters = debate.voter_count(),
            "Voter joined"
        );
        Ok(role)
    }

    /// Start `debate` and push `start` to its voters; `end` follows once the
    /// allowed duration elapses. Returns `false` if it was already started.
    pub fn start_debate(&self, debate: &Arc<Debate>) -> bool {
        let connections = self.connections.clone();
        let started = debate.start(
            || {
                broadcast_to_voters(&self.connections, debate.session_code(), &ServerMessage::Start);
            },
            move |debate| {
                ::metrics::counter!(DEBATE_COMPLETED).increment(1);
                tracing::info!(session_code = %debate.session_code(), "Debate completed");
                broadcast_to_voters(&connections, debate.session_code(), &ServerMessage::End);
            },
        );
        if started {
            ::metrics::counter!(DEBATE_STARTED).increment(1);
            tracing::info!(
                session_code = %debate.session_code(),
                allowed_duration_ms = debate.allowed_duration().as_millis() as u64,
                "Debate started"
            );
        }
        started
    }

    /// Delete every debate `moderator_id` owns and drop them from all sessions.
    pub fn close_debates_for_moderator(&self, moderator_id: &str) -> Vec<String> {
        let closed = self.debates.delete_all_for_moderator(moderator_id);
        if !closed.is_empty() {
            let scrubbed = self.sessions.purge_debates(&closed);
            tracing::debug!(moderator_id = %moderator_id, closed = ?closed, scrubbed, "Sessions scrubbed");
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(Settings::default())
    }

    #[test]
    fn test_open_debate_records_moderator_role() {
        let state = state();
        let session = state.sessions.create();
        let debate = state.open_debate(&session, ["Ada", "Grace"], Duration::from_secs(60));

        let role = state.sessions.role_for(&session, debate.session_code()).unwrap();
        assert!(role.is_moderator);
        assert_eq!(role.moderator_id.as_deref(), Some(session.as_str()));
        assert_eq!(debate.moderator_id(), session);
    }

    #[test]
    fn test_open_debate_replaces_previous() {
        let state = state();
        let session = state.sessions.create();
        let first = state.open_debate(&session, ["Ada"], Duration::from_secs(60));
        let second = state.open_debate(&session, ["Grace"], Duration::from_secs(60));

        assert!(first.is_closed());
        assert!(state.debates.get(first.session_code()).is_none());
        assert!(state.sessions.role_for(&session, first.session_code()).is_none());
        assert!(state.debates.get(second.session_code()).is_some());
    }

    #[test]
    fn test_oversized_session_ttl_still_creates_sessions() {
        let state = AppState::new(Settings {
            session_ttl_secs: u64::MAX,
            ..Settings::default()
        });
        let session = state.sessions.create();
        assert!(state.sessions.exists(&session));

        let debate = state.open_debate(&session, ["Ada"], Duration::from_secs(60));
        assert!(state.sessions.role_for(&session, debate.session_code()).is_some());
    }

    #[test]
    fn test_join_debate_reuses_voter() {
        let state = state();
        let moderator = state.sessions.create();
        let debate = state.open_debate(&moderator, ["Ada"], Duration::from_secs(60));
        let voter = state.sessions.create();

        let first = state.join_debate(&voter, debate.session_code(), "Vera").unwrap();
        let again = state.join_debate(&voter, debate.session_code(), "Vera").unwrap();

        assert_eq!(first, again);
        assert_eq!(debate.voter_count(), 1);
    }

    #[test]
    fn test_join_debate_failures() {
        let state = state();
        let moderator = state.sessions.create();
        let debate = state.open_debate(&moderator, ["Ada"], Duration::from_secs(60));

        assert!(matches!(
            state.join_debate("nope", debate.session_code(), "Vera"),
            Err(AppError::MissingSession)
        ));
        assert!(matches!(
            state.join_debate(&moderator, "ZZZZ", "Vera"),
            Err(AppError::DebateNotFound(_))
        ));
        assert!(matches!(
            state.join_debate(&moderator, debate.session_code(), "Vera"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_join_completed_debate_conflicts() {
        let state = state();
        let moderator = state.sessions.create();
        let debate = state.open_debate(&moderator, ["Ada"], Duration::from_millis(10));
        assert!(state.start_debate(&debate));
        assert!(!state.start_debate(&debate));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(debate.is_completed());

        let voter = state.sessions.create();
        assert!(matches!(
            state.join_debate(&voter, debate.session_code(), "Vera"),
            Err(AppError::DebateCompleted(_))
        ));
    }

    #[test]
    fn test_close_debates_scrubs_voter_sessions() {
        let state = state();
        let moderator = state.sessions.create();
        let debate = state.open_debate(&moderator, ["Ada"], Duration::from_secs(60));
        let code = debate.session_code().to_string();
        let voter = state.sessions.create();
        state.join_debate(&voter, &code, "Vera").unwrap();

        assert_eq!(state.close_debates_for_moderator(&moderator), vec![code.clone()]);
        assert!(state.sessions.role_for(&voter, &code).is_none());
        assert!(state.close_debates_for_moderator(&moderator).is_empty());
    }
}
