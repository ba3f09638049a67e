// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! Role router.
//!
//! A `WebSocketHandler` is created per authenticated connection. It picks the
//! moderator or voter handling once, from the socket kind and the bound role,
//! and then dispatches every decoded inbound event through it. Errors never
//! leave the handler: a malformed or failing message is logged and dropped and
//! the connection stays open.
use std::sync::Arc;

use debate_common::{Role, ServerMessage};

use crate::error::AppError;
use crate::messages::{self, ClientEvent};
use crate::metrics::{MESSAGE_MALFORMED, VOTE_CAST};
use crate::ws_router::SocketKind;
use crate::AppState;

/// Which inbound handler a connection gets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRoute {
    Moderator { moderator_id: String },
    Voter { voter_id: String },
    /// No handler; inbound messages are ignored
    Inert,
}

impl RoleRoute {
    /// Moderator handling on `/moderate-debate` for a moderator role, voter
    /// handling on `/vote-on-debate` for a voter role, nothing otherwise.
    pub fn resolve(kind: SocketKind, role: &Role) -> Self {
        match kind {
            SocketKind::ModerateDebate if role.is_moderator => role
                .moderator_id
                .clone()
                .map_or(RoleRoute::Inert, |moderator_id| RoleRoute::Moderator { moderator_id }),
            SocketKind::VoteOnDebate if role.is_voter => role
                .voter_id
                .clone()
                .map_or(RoleRoute::Inert, |voter_id| RoleRoute::Voter { voter_id }),
            _ => RoleRoute::Inert,
        }
    }
}

/// Inbound message handler for one connection
pub struct WebSocketHandler {
    state: Arc<AppState>,
    session_id: String,
    role: Role,
    route: RoleRoute,
}

impl WebSocketHandler {
    pub fn new(state: Arc<AppState>, session_id: impl Into<String>, role: Role, kind: SocketKind) -> Self {
        let route = RoleRoute::resolve(kind, &role);
        Self {
            state,
            session_id: session_id.into(),
            role,
            route,
        }
    }

    pub fn route(&self) -> &RoleRoute {
        &self.route
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Decode and handle one text frame, returning the direct reply if any.
    pub fn handle_text(&self, text: &str) -> Option<ServerMessage> {
        let event = match messages::decode(text) {
            Ok(event) => event,
            Err(e) => {
                metrics::counter!(MESSAGE_MALFORMED).increment(1);
                tracing::warn!(
                    session_id = %self.session_id,
                    session_code = %self.role.session_code,
                    error = %e,
                    "Dropping malformed message"
                );
                return None;
            },
        };

        let kind = event.kind().to_string();
        match self.handle_event(event) {
            Ok(reply) => reply,
            Err(e) if e.is_authorization_failure() => {
                tracing::warn!(
                    session_id = %self.session_id,
                    session_code = %self.role.session_code,
                    event = %kind,
                    error = %e,
                    "Event refused"
                );
                None
            },
            Err(e) => {
                tracing::info!(
                    session_id = %self.session_id,
                    session_code = %self.role.session_code,
                    event = %kind,
                    error = %e,
                    "Event dropped"
                );
                None
            },
        }
    }

    /// # Handle one decoded event
    ///
    /// Moderator events:
    /// - `StartSession`: start the debate and fan `start` out to its voters
    /// - `CloseDebate`: delete every debate this moderator owns
    ///
    /// Voter events:
    /// - `Vote`: overwrite this voter's vote
    /// - `VoterCheckIn`: reply with `end`, `start` or `pending`
    ///
    /// Anything else is logged and ignored.
    pub fn handle_event(&self, event: ClientEvent) -> Result<Option<ServerMessage>, AppError> {
        match &self.route {
            RoleRoute::Moderator { moderator_id } => {
                tracing::debug!(event = %event.kind(), "Moderator event");
                self.handle_moderator_event(moderator_id, event).map(|()| None)
            },
            RoleRoute::Voter { voter_id } => {
                tracing::debug!(event = %event.kind(), "Voter event");
                self.handle_voter_event(voter_id, event)
            },
            RoleRoute::Inert => {
                tracing::debug!(event = %event.kind(), "Ignoring event on connection without handler");
                Ok(None)
            },
        }
    }

    fn handle_moderator_event(&self, moderator_id: &str, event: ClientEvent) -> Result<(), AppError> {
        match event {
            ClientEvent::StartSession => {
                let debate = self
                    .state
                    .debates
                    .get(&self.role.session_code)
                    .ok_or_else(|| AppError::DebateNotFound(self.role.session_code.clone()))?;
                if debate.moderator_id() != moderator_id {
                    return Err(AppError::MissingRole(self.role.session_code.clone()));
                }
                if !self.state.start_debate(&debate) {
                    tracing::debug!(session_code = %debate.session_code(), "Debate already started");
                }
            },
            ClientEvent::CloseDebate => {
                let closed = self.state.close_debates_for_moderator(moderator_id);
                self.state
                    .sessions
                    .remove_active_debate(&self.session_id, &self.role.session_code);
                tracing::info!(moderator_id = %moderator_id, closed = ?closed, "Moderator closed debates");
            },
            other => {
                tracing::info!(event = %other.kind(), "Unknown event type received");
            },
        }
        Ok(())
    }

    fn handle_voter_event(
        &self,
        voter_id: &str,
        event: ClientEvent,
    ) -> Result<Option<ServerMessage>, AppError> {
        match event {
            ClientEvent::Vote { participant } => {
                let debate = self
                    .state
                    .debates
                    .get(&self.role.session_code)
                    .ok_or_else(|| AppError::DebateNotFound(self.role.session_code.clone()))?;
                debate.place_vote(voter_id, &participant)?;
                metrics::counter!(VOTE_CAST).increment(1);
                tracing::debug!(
                    session_code = %debate.session_code(),
                    voter_id = %voter_id,
                    participant = %participant,
                    "Vote placed"
                );
                Ok(None)
            },
            ClientEvent::VoterCheckIn => {
                let debate = self
                    .state
                    .debates
                    .get(&self.role.session_code)
                    .ok_or_else(|| AppError::DebateNotFound(self.role.session_code.clone()))?;
                Ok(Some(debate.check_in_reply()))
            },
            other => {
                tracing::info!(event = %other.kind(), "Unknown event type received");
                Ok(None)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use axum::extract::ws::Message;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        state: Arc<AppState>,
        moderator: WebSocketHandler,
        moderator_session: String,
        voter: WebSocketHandler,
        voter_id: String,
    }

    fn setup(duration: Duration) -> Fixture {
        let state = Arc::new(AppState::new(Settings::default()));
        let moderator_session = state.sessions.create();
        let debate = state.open_debate(&moderator_session, ["Ada", "Grace"], duration);
        let code = debate.session_code().to_string();

        let voter_session = state.sessions.create();
        let voter_role = state.join_debate(&voter_session, &code, "Vera").unwrap();
        let voter_id = voter_role.voter_id.clone().unwrap();

        let moderator_role = state.sessions.role_for(&moderator_session, &code).unwrap();
        let moderator = WebSocketHandler::new(
            state.clone(),
            moderator_session.clone(),
            moderator_role,
            SocketKind::ModerateDebate,
        );
        let voter = WebSocketHandler::new(state.clone(), voter_session, voter_role, SocketKind::VoteOnDebate);

        Fixture {
            state,
            moderator,
            moderator_session,
            voter,
            voter_id,
        }
    }

    fn decode(frame: Message) -> ServerMessage {
        match frame {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("Expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_route_resolution() {
        let moderator = Role::moderator("m-1", "ABCD");
        let voter = Role::voter("v-1", "ABCD");
        let nobody = Role {
            is_moderator: false,
            is_voter: false,
            moderator_id: None,
            voter_id: None,
            session_code: "ABCD".to_string(),
        };

        assert_eq!(
            RoleRoute::resolve(SocketKind::ModerateDebate, &moderator),
            RoleRoute::Moderator {
                moderator_id: "m-1".to_string()
            }
        );
        assert_eq!(
            RoleRoute::resolve(SocketKind::VoteOnDebate, &voter),
            RoleRoute::Voter {
                voter_id: "v-1".to_string()
            }
        );
        assert_eq!(RoleRoute::resolve(SocketKind::VoteOnDebate, &moderator), RoleRoute::Inert);
        assert_eq!(RoleRoute::resolve(SocketKind::ModerateDebate, &voter), RoleRoute::Inert);
        assert_eq!(RoleRoute::resolve(SocketKind::ModerateDebate, &nobody), RoleRoute::Inert);
    }

    #[tokio::test]
    async fn test_check_in_follows_lifecycle() {
        let fx = setup(Duration::from_millis(50));
        let check_in = r#"{"type":"voter-check-in"}"#;

        assert_eq!(fx.voter.handle_text(check_in), Some(ServerMessage::Pending));
        assert_eq!(fx.moderator.handle_text(r#"{"type":"start-session"}"#), None);
        assert_eq!(fx.voter.handle_text(check_in), Some(ServerMessage::Start));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.voter.handle_text(check_in), Some(ServerMessage::End));
    }

    #[tokio::test]
    async fn test_start_session_broadcasts_to_voters() {
        let fx = setup(Duration::from_secs(60));
        let (tx, mut rx) = mpsc::channel(8);
        fx.state.connections.register(fx.voter.role().clone(), tx);

        fx.moderator.handle_text(r#"{"type":"start-session"}"#);
        fx.moderator.handle_text(r#"{"type":"start-session"}"#);

        assert_eq!(decode(rx.try_recv().unwrap()), ServerMessage::Start);
        assert!(rx.try_recv().is_err());
        fx.moderator.handle_text(r#"{"type":"close-debate"}"#);
    }

    #[tokio::test]
    async fn test_completion_broadcasts_end() {
        let fx = setup(Duration::from_millis(30));
        let (tx, mut rx) = mpsc::channel(8);
        fx.state.connections.register(fx.voter.role().clone(), tx);

        fx.moderator.handle_text(r#"{"type":"start-session"}"#);
        assert_eq!(decode(rx.recv().await.unwrap()), ServerMessage::Start);

        let end = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decode(end), ServerMessage::End);
    }

    #[tokio::test]
    async fn test_close_debate_scrubs_sessions_and_timer() {
        let fx = setup(Duration::from_millis(50));
        let code = fx.voter.role().session_code.clone();
        let (tx, mut rx) = mpsc::channel(8);
        fx.state.connections.register(fx.voter.role().clone(), tx);

        fx.moderator.handle_text(r#"{"type":"start-session"}"#);
        fx.moderator.handle_text(r#"{"type":"close-debate"}"#);

        assert!(fx.state.debates.get(&code).is_none());
        assert!(fx.state.sessions.role_for(&fx.moderator_session, &code).is_none());
        assert_eq!(fx.state.sessions.purge_debates(&[code]), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(decode(rx.try_recv().unwrap()), ServerMessage::Start);
        assert!(rx.try_recv().is_err(), "no end after close");

        // A second close finds nothing and is harmless.
        fx.moderator.handle_text(r#"{"type":"close-any-existing-debates"}"#);
    }

    #[tokio::test]
    async fn test_vote_overwrites_and_tallies() {
        let fx = setup(Duration::from_secs(60));
        let code = fx.voter.role().session_code.clone();

        fx.voter.handle_text(r#"{"type":"vote","data":{"participant":"p1"}}"#);
        fx.voter.handle_text(r#"{"type":"vote","data":{"participant":"p2"}}"#);

        let debate = fx.state.debates.get(&code).unwrap();
        assert_eq!(debate.vote_of(&fx.voter_id).as_deref(), Some("p2"));
        assert_eq!(debate.results().data, vec![0, 1]);

        fx.voter.handle_text(r#"{"type":"vote","data":{"participant":1}}"#);
        assert_eq!(debate.vote_of(&fx.voter_id).as_deref(), Some("p1"));
        assert_eq!(debate.results().data, vec![1, 0]);
    }

    #[tokio::test]
    async fn test_bad_input_is_dropped() {
        let fx = setup(Duration::from_secs(60));
        let code = fx.voter.role().session_code.clone();

        for body in [
            "not json",
            r#"{"type":"vote"}"#,
            r#"{"type":"vote","data":{"participant":"p9"}}"#,
            r#"{"type":"dance"}"#,
            r#"{"type":"start-session"}"#,
        ] {
            assert_eq!(fx.voter.handle_text(body), None, "{body}");
        }
        assert_eq!(fx.moderator.handle_text(r#"{"type":"voter-check-in"}"#), None);

        let debate = fx.state.debates.get(&code).unwrap();
        assert!(!debate.is_started());
        assert_eq!(debate.vote_of(&fx.voter_id), None);
    }

    #[tokio::test]
    async fn test_vote_after_debate_deleted_is_noop() {
        let fx = setup(Duration::from_secs(60));
        fx.moderator.handle_text(r#"{"type":"close-debate"}"#);

        assert_eq!(
            fx.voter.handle_text(r#"{"type":"vote","data":{"participant":"p1"}}"#),
            None
        );
        assert_eq!(fx.voter.handle_text(r#"{"type":"voter-check-in"}"#), None);
    }
}
