// ================
// crates/backend-lib/src/messages.rs
// ================
//! Decoding of inbound socket frames into typed events.
use debate_common::ClientEnvelope;
use serde_json::Value;

use crate::error::AppError;

/// One decoded inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    StartSession,
    /// `close-debate` and `close-any-existing-debates`
    CloseDebate,
    Vote { participant: String },
    VoterCheckIn,
    /// Well-formed envelope with a type nobody handles
    Unknown(String),
}

impl ClientEvent {
    /// Wire name used in logs
    pub fn kind(&self) -> &str {
        match self {
            ClientEvent::StartSession => "start-session",
            ClientEvent::CloseDebate => "close-debate",
            ClientEvent::Vote { .. } => "vote",
            ClientEvent::VoterCheckIn => "voter-check-in",
            ClientEvent::Unknown(kind) => kind,
        }
    }
}

/// Parse a text frame.
///
/// Fails with `MalformedMessage` when the body is not a JSON envelope or a
/// `vote` lacks `data.participant`.
pub fn decode(text: &str) -> Result<ClientEvent, AppError> {
    let envelope: ClientEnvelope =
        serde_json::from_str(text).map_err(|e| AppError::MalformedMessage(e.to_string()))?;

    let event = match envelope.kind.as_str() {
        "start-session" => ClientEvent::StartSession,
        "close-debate" | "close-any-existing-debates" => ClientEvent::CloseDebate,
        "voter-check-in" => ClientEvent::VoterCheckIn,
        "vote" => ClientEvent::Vote {
            participant: participant_of(envelope.data.as_ref())?,
        },
        _ => ClientEvent::Unknown(envelope.kind),
    };

    Ok(event)
}

// A bare number `n` names participant `pn`.
fn participant_of(data: Option<&Value>) -> Result<String, AppError> {
    match data.and_then(|d| d.get("participant")) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(position) if position > 0 => Ok(format!("p{position}")),
            _ => Err(AppError::MalformedMessage(format!(
                "vote participant number must be a positive integer, got {n}"
            ))),
        },
        Some(other) => Err(AppError::MalformedMessage(format!(
            "vote participant must be a string, got {other}"
        ))),
        None => Err(AppError::MalformedMessage(
            "vote is missing data.participant".to_string(),
        )),
    }
}
