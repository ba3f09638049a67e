// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const WS_REJECTED: &str = "ws.rejected";
pub const DEBATE_CREATED: &str = "debate.created";
pub const DEBATE_STARTED: &str = "debate.started";
pub const DEBATE_COMPLETED: &str = "debate.completed";
pub const DEBATE_CLOSED: &str = "debate.closed";
pub const VOTE_CAST: &str = "vote.cast";
pub const MESSAGE_MALFORMED: &str = "message.malformed";
pub const BROADCAST_TICK: &str = "broadcast.tick";
pub const BROADCAST_DROPPED: &str = "broadcast.dropped";
pub const SESSION_EXPIRED: &str = "session.expired";
