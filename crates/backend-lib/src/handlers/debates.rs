// ============================
// debate-backend-lib/src/handlers/debates.rs
// ============================
//! JSON endpoints through which a browser obtains a session and a role.
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use debate_common::Participant;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::error::AppError;
use crate::AppState;

/// Name recorded for voters that join without one
pub const ANONYMOUS_VOTER: &str = "anonymous";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDebateRequest {
    pub participants: Vec<String>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDebateResponse {
    pub session_code: String,
    pub moderator_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinDebateRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinDebateResponse {
    pub session_code: String,
    pub voter_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateSummary {
    pub session_code: String,
    pub participants: Vec<Participant>,
    pub started: bool,
    pub completed: bool,
}

/// `POST /api/debates`
pub async fn create_debate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateDebateRequest>,
) -> Result<Response, AppError> {
    let participants: Vec<String> = request
        .participants
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    if participants.is_empty() || participants.iter().any(String::is_empty) {
        return Err(AppError::InvalidInput(
            "A debate needs at least one named participant".to_string(),
        ));
    }
    let duration = match request.duration_secs {
        Some(0) => {
            return Err(AppError::InvalidInput("durationSecs must be positive".to_string()));
        },
        Some(secs) => Duration::from_secs(secs),
        None => state.settings.default_debate_duration(),
    };

    let (session_id, fresh) = resolve_session(&state, &headers);
    let debate = state.open_debate(&session_id, participants, duration);

    let body = CreateDebateResponse {
        session_code: debate.session_code().to_string(),
        moderator_id: session_id.clone(),
    };
    respond(&state, StatusCode::CREATED, fresh.then_some(session_id.as_str()), body)
}

/// `GET /api/debates/{code}`
pub async fn get_debate(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<DebateSummary>, AppError> {
    let debate = state
        .debates
        .get(&code)
        .ok_or(AppError::DebateNotFound(code))?;

    Ok(Json(DebateSummary {
        session_code: debate.session_code().to_string(),
        participants: debate.participants().to_vec(),
        started: debate.is_started(),
        completed: debate.is_completed(),
    }))
}

/// `POST /api/debates/{code}/voters`; the body is optional.
pub async fn join_debate(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: JoinDebateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        JoinDebateRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidInput(e.to_string()))?
    };
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(ANONYMOUS_VOTER);

    let (session_id, fresh) = resolve_session(&state, &headers);
    let role = state.join_debate(&session_id, &code, name)?;
    let voter_id = role
        .voter_id
        .ok_or_else(|| AppError::Internal("Voter role without voter id".to_string()))?;

    let body = JoinDebateResponse {
        session_code: role.session_code,
        voter_id,
    };
    respond(&state, StatusCode::CREATED, fresh.then_some(session_id.as_str()), body)
}

// Existing live session from the cookie, or a new one.
fn resolve_session(state: &AppState, headers: &HeaderMap) -> (String, bool) {
    match auth::session_cookie(headers, &state.settings.session_cookie) {
        Some(id) if state.sessions.exists(&id) => (id, false),
        _ => (state.sessions.create(), true),
    }
}

fn respond<T: Serialize>(
    state: &AppState,
    status: StatusCode,
    new_session: Option<&str>,
    body: T,
) -> Result<Response, AppError> {
    let mut response = (status, Json(body)).into_response();
    if let Some(session_id) = new_session {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            state.settings.session_cookie, session_id, state.settings.session_ttl_secs
        );
        let value = HeaderValue::from_str(&cookie).map_err(|e| AppError::Internal(e.to_string()))?;
        response.headers_mut().insert(SET_COOKIE, value);
    }
    Ok(response)
}
