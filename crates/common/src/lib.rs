// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between debate clients and the server.
//! This module defines the WebSocket envelope and the state snapshots
//! pushed to moderators and voters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a socket connection may do for one debate.
///
/// Stored in a browser session's `activeDebates` map under the debate's
/// session code and bound to a connection once it authenticates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Connection controls start/stop of the debate
    #[serde(default)]
    pub is_moderator: bool,
    /// Connection casts votes
    #[serde(default)]
    pub is_voter: bool,
    /// Present iff `is_moderator`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderator_id: Option<String>,
    /// Present iff `is_voter`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_id: Option<String>,
    /// Code of the debate this role belongs to
    pub session_code: String,
}

impl Role {
    pub fn moderator(moderator_id: impl Into<String>, session_code: impl Into<String>) -> Self {
        Self {
            is_moderator: true,
            is_voter: false,
            moderator_id: Some(moderator_id.into()),
            voter_id: None,
            session_code: session_code.into(),
        }
    }

    pub fn voter(voter_id: impl Into<String>, session_code: impl Into<String>) -> Self {
        Self {
            is_moderator: false,
            is_voter: true,
            moderator_id: None,
            voter_id: Some(voter_id.into()),
            session_code: session_code.into(),
        }
    }
}

/// Raw inbound envelope: `{ "type": string, "data"?: object }`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Messages sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Periodic state push to the moderator of a debate
    ModeratorUpdate(ModeratorUpdate),
    /// The debate has started
    Start,
    /// The debate has ended
    End,
    /// The debate has not started yet (check-in reply only)
    Pending,
}

/// Full debate state as seen by its moderator
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModeratorUpdate {
    pub chart_data: ChartData,
    pub debate_details: DebateDetails,
    /// Voter names, or a single placeholder when nobody has joined
    pub audience: Vec<String>,
}

/// Vote tally, one slot per participant in participant order
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub data: Vec<u32>,
}

/// Timing block of a moderator update. All durations are milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DebateDetails {
    pub allowed_duration: u64,
    /// Unix epoch milliseconds, `None` until started
    pub start_time: Option<i64>,
    pub started: bool,
    pub completed: bool,
    pub time_remaining: u64,
    /// Allowed duration formatted as `m:ss`
    pub duration: String,
}

/// One debate participant voters can vote for
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
}
