// ============================
// debate-backend-lib/src/broadcast.rs
// ============================
//! Outbound fan-out.
//!
//! Two triggers: a fixed-interval tick pushing `moderator-update` snapshots to
//! each debate's moderator connections, and event-driven `start`/`end` pushes
//! to a debate's voter connections. Closed sockets are pruned and skipped. A
//! full queue drops a tick, since the next one supersedes it, but `start` and
//! `end` wait in the background until the voter's queue drains.
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use debate_common::ServerMessage;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::connections::{ConnectionEntry, ConnectionRegistry, Delivery};
use crate::metrics::{BROADCAST_DROPPED, BROADCAST_TICK};
use crate::registry::DebateRegistry;

/// Serialize a server message into a text frame
pub fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize broadcast message");
            None
        },
    }
}

/// Push `message` to every open voter connection of `session_code`.
/// Returns the number of connections it was queued or deferred for.
pub fn broadcast_to_voters(
    connections: &ConnectionRegistry,
    session_code: &str,
    message: &ServerMessage,
) -> usize {
    let Some(frame) = encode(message) else {
        return 0;
    };

    let sent = connections
        .voters_of(session_code)
        .iter()
        .filter(|entry| {
            deliver(connections, entry, frame.clone(), ConnectionEntry::deliver_eventually)
        })
        .count();

    tracing::debug!(session_code = %session_code, sent, message = ?message, "Broadcast to voters");
    sent
}

/// One polling tick: a fresh snapshot of every live debate to its
/// moderator connections. Returns the number of updates queued.
pub fn broadcast_moderator_updates(debates: &DebateRegistry, connections: &ConnectionRegistry) -> usize {
    metrics::counter!(BROADCAST_TICK).increment(1);

    let mut sent = 0;
    for debate in debates.running_sessions() {
        let moderators = connections.moderators_of(debate.moderator_id(), debate.session_code());
        if moderators.is_empty() {
            continue;
        }

        let update = ServerMessage::ModeratorUpdate(debate.moderator_update());
        let Some(frame) = encode(&update) else {
            continue;
        };
        sent += moderators
            .iter()
            .filter(|entry| deliver(connections, entry, frame.clone(), ConnectionEntry::deliver))
            .count();
    }
    sent
}

/// Run [`broadcast_moderator_updates`] every `every` until aborted
pub fn spawn_broadcast_loop(
    debates: Arc<DebateRegistry>,
    connections: Arc<ConnectionRegistry>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            broadcast_moderator_updates(&debates, &connections);
        }
    })
}

fn deliver(
    connections: &ConnectionRegistry,
    entry: &ConnectionEntry,
    frame: Message,
    send: fn(&ConnectionEntry, Message) -> Delivery,
) -> bool {
    if !entry.is_open() {
        connections.remove(entry.id);
        return false;
    }
    match send(entry, frame) {
        Delivery::Sent => true,
        Delivery::Deferred => {
            tracing::debug!(connection_id = %entry.id, "Outbound queue full, delivery deferred");
            true
        },
        Delivery::Full => {
            metrics::counter!(BROADCAST_DROPPED).increment(1);
            tracing::debug!(connection_id = %entry.id, "Outbound queue full, message dropped");
            false
        },
        Delivery::Closed => {
            connections.remove(entry.id);
            false
        },
    }
}
