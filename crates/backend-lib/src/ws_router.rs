// ============================
// debate-backend-lib/src/ws_router.rs
// ============================
//! HTTP router and socket connection handling.
use std::sync::Arc;

use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, Uri},
    response::Response,
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::auth::{self, Authorized, SocketQuery};
use crate::broadcast;
use crate::error::AppError;
use crate::handlers::debates;
use crate::metrics::{WS_ACTIVE, WS_CONNECTION, WS_REJECTED};
use crate::websocket::WebSocketHandler;
use crate::AppState;

/// Socket endpoint, selected by the first path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    CreateDebate,
    ModerateDebate,
    VoteOnDebate,
}

impl SocketKind {
    pub const ALL: [SocketKind; 3] = [
        SocketKind::CreateDebate,
        SocketKind::ModerateDebate,
        SocketKind::VoteOnDebate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SocketKind::CreateDebate => "create-debate",
            SocketKind::ModerateDebate => "moderate-debate",
            SocketKind::VoteOnDebate => "vote-on-debate",
        }
    }

    /// `/vote-on-debate/anything` is `VoteOnDebate`; unknown segments are `None`.
    pub fn from_path(path: &str) -> Option<Self> {
        let segment = path.trim_start_matches('/').split('/').next()?;
        Self::ALL.into_iter().find(|kind| kind.as_str() == segment)
    }
}

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let sockets = SocketKind::ALL
        .into_iter()
        .fold(Router::<Arc<AppState>>::new(), |router, kind| {
            router
                .route(&format!("/{}", kind.as_str()), get(ws_handler))
                .route(&format!("/{}/{{*rest}}", kind.as_str()), get(ws_handler))
        });

    Router::new()
        .route("/api/debates", post(debates::create_debate))
        .route("/api/debates/{code}", get(debates::get_debate))
        .route("/api/debates/{code}/voters", post(debates::join_debate))
        .merge(sockets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Upgrade handler shared by all socket endpoints.
///
/// Requests without a live session cookie get `401` before any upgrade.
/// Requests that fail role authentication, including an unparseable query
/// string, are upgraded and then closed at once.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    query: Result<Query<SocketQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let kind = SocketKind::from_path(uri.path())
        .ok_or_else(|| AppError::InvalidInput(format!("Unknown socket path {}", uri.path())))?;

    let session_id = auth::session_cookie(&headers, &state.settings.session_cookie)
        .filter(|id| state.sessions.exists(id))
        .ok_or_else(|| {
            counter!(WS_REJECTED).increment(1);
            tracing::warn!(path = %uri.path(), "Socket request without a live session");
            AppError::MissingSession
        })?;

    counter!(WS_CONNECTION).increment(1);

    if kind == SocketKind::CreateDebate {
        let closed = state.close_debates_for_moderator(&session_id);
        tracing::info!(session_id = %session_id, closed = ?closed, "Create-debate socket cleared old debates");
        return Ok(ws.on_upgrade(drain));
    }

    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::debug!(query = ?uri.query(), error = %rejection, "Unparseable socket query");
            SocketQuery::default()
        },
    };

    let authorized = auth::authenticate(&state.sessions, &state.debates, &session_id, &query);
    match authorized {
        Ok(authorized) => Ok(ws.on_upgrade(move |socket| {
            handle_connection(socket, state, session_id, authorized, kind)
        })),
        Err(e) => {
            counter!(WS_REJECTED).increment(1);
            tracing::warn!(
                session_id = %session_id,
                kind = kind.as_str(),
                error = %e,
                "Socket authentication failed"
            );
            Ok(ws.on_upgrade(reject))
        },
    }
}

async fn reject(mut socket: WebSocket) {
    let _ = socket.send(Message::Close(None)).await;
}

// Create-debate sockets carry no messages; hold them until the client leaves.
async fn drain(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }
}

async fn handle_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    session_id: String,
    authorized: Authorized,
    kind: SocketKind,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(state.settings.outbound_buffer);

    let handler = WebSocketHandler::new(state.clone(), session_id.clone(), authorized.role.clone(), kind);
    let connection_id = state.connections.register(authorized.role, tx.clone());
    gauge!(WS_ACTIVE).increment(1.0);

    tracing::info!(
        connection_id = %connection_id,
        session_id = %session_id,
        session_code = %authorized.debate.session_code(),
        kind = kind.as_str(),
        route = ?handler.route(),
        "Socket connected"
    );

    // Writer: drain the outbound queue into the socket
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    // Reader: every text frame goes through the role router
    while let Some(frame) = stream.next().await {
        let reply = match frame {
            Ok(Message::Text(text)) => handler.handle_text(text.as_str()),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => handler.handle_text(text),
                Err(_) => {
                    tracing::debug!(connection_id = %connection_id, "Ignoring non-UTF-8 binary frame");
                    None
                },
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Socket read failed");
                break;
            },
        };

        if let Some(frame) = reply.as_ref().and_then(broadcast::encode) {
            if tx.send(frame).await.is_err() {
                break;
            }
        }
    }

    state.connections.remove(connection_id);
    gauge!(WS_ACTIVE).decrement(1.0);
    send_task.abort();

    tracing::info!(connection_id = %connection_id, session_id = %session_id, "Socket closed");
}
