// ============================
// debate-backend-lib/src/auth/authenticator.rs
// ============================
//! Binds an inbound socket to a role and a live debate.
use std::sync::Arc;

use debate_common::Role;
use serde::Deserialize;

use crate::auth::SessionStore;
use crate::debate::Debate;
use crate::error::AppError;
use crate::registry::DebateRegistry;

/// Query string of a socket request
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SocketQuery {
    #[serde(rename = "sessionCode")]
    pub session_code: Option<String>,
}

impl SocketQuery {
    pub fn for_code(session_code: impl Into<String>) -> Self {
        Self {
            session_code: Some(session_code.into()),
        }
    }
}

/// A connection that passed authentication
#[derive(Debug, Clone)]
pub struct Authorized {
    pub debate: Arc<Debate>,
    pub role: Role,
}

/// Resolve `session_id` + `query` to a debate and role.
///
/// Each rejection cause maps to its own error: no `sessionCode`
/// (`MissingSessionCode`), no `activeDebates` entry (`MissingRole`), or no
/// live debate (`MissingDebate`).
pub fn authenticate(
    sessions: &SessionStore,
    debates: &DebateRegistry,
    session_id: &str,
    query: &SocketQuery,
) -> Result<Authorized, AppError> {
    let session_code = query
        .session_code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or(AppError::MissingSessionCode)?;

    let role = sessions
        .role_for(session_id, session_code)
        .ok_or_else(|| AppError::MissingRole(session_code.to_string()))?;

    let debate = debates
        .get(session_code)
        .filter(|d| !d.session_code().is_empty())
        .ok_or_else(|| AppError::MissingDebate(session_code.to_string()))?;

    let start_time = debate.start_time().map(|t| t.to_rfc3339());
    tracing::info!(
        is_moderator = role.is_moderator,
        is_voter = role.is_voter,
        session_id = %session_id,
        session_code = %debate.session_code(),
        start_time = ?start_time,
        allowed_duration_ms = debate.allowed_duration().as_millis() as u64,
        started = debate.is_started(),
        completed = debate.is_completed(),
        "Socket authenticated"
    );

    Ok(Authorized { debate, role })
}
