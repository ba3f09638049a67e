// ============================
// debate-backend-lib/src/connections.rs
// ============================
//! Connection registry: the live set of (connection, role) pairs.
//!
//! Entries are keyed by a per-connection id, so removal on close is O(1)
//! and never depends on comparing socket handles.
use axum::extract::ws::Message;
use dashmap::DashMap;
use debate_common::Role;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Identity of one live socket
pub type ConnectionId = Uuid;

/// Sender half of a connection's outbound queue
pub type ConnectionSender = mpsc::Sender<Message>;

/// Outcome of a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Outbound queue full; the message was dropped
    Full,
    /// Outbound queue full; a background task sends once it drains
    Deferred,
    /// The socket's writer has gone away
    Closed,
}

/// One live socket paired with the role it authenticated as
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub role: Role,
    tx: ConnectionSender,
}

impl ConnectionEntry {
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue `message` without waiting
    pub fn deliver(&self, message: Message) -> Delivery {
        match self.tx.try_send(message) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Queue `message`, waiting in the background when the queue is full.
    /// Outside a tokio runtime a full queue drops the message.
    pub fn deliver_eventually(&self, message: Message) -> Delivery {
        match self.tx.try_send(message) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(message)) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let tx = self.tx.clone();
                    runtime.spawn(async move {
                        let _ = tx.send(message).await;
                    });
                    Delivery::Deferred
                },
                Err(_) => Delivery::Full,
            },
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn moderates(&self, moderator_id: &str, session_code: &str) -> bool {
        self.role.is_moderator
            && self.role.moderator_id.as_deref() == Some(moderator_id)
            && self.role.session_code == session_code
    }

    fn votes_in(&self, session_code: &str) -> bool {
        self.role.is_voter && self.role.session_code == session_code
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    entries: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly authenticated connection
    pub fn register(&self, role: Role, tx: ConnectionSender) -> ConnectionId {
        let id = Uuid::new_v4();
        self.entries.insert(id, ConnectionEntry { id, role, tx });
        tracing::debug!(connection_id = %id, connections = self.entries.len(), "Connection registered");
        id
    }

    /// Remove a connection. Removing an unknown id is a no-op.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            tracing::debug!(connection_id = %id, connections = self.entries.len(), "Connection unregistered");
        }
        removed
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moderator connections of the debate `session_code` run by `moderator_id`
    pub fn moderators_of(&self, moderator_id: &str, session_code: &str) -> Vec<ConnectionEntry> {
        self.select(|entry| entry.moderates(moderator_id, session_code))
    }

    /// Voter connections of the debate `session_code`
    pub fn voters_of(&self, session_code: &str) -> Vec<ConnectionEntry> {
        self.select(|entry| entry.votes_in(session_code))
    }

    fn select(&self, wanted: impl Fn(&ConnectionEntry) -> bool) -> Vec<ConnectionEntry> {
        self.entries
            .iter()
            .filter(|entry| wanted(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}
