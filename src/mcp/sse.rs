// ---------------------------------------------------------------------------
// mcp/sse.rs - MCP over server-sent events
// ---------------------------------------------------------------------------
//
// GET /sse opens a stream whose first event names the endpoint the client
// posts its messages to (`/messages/?session_id=<hex>`). Responses travel back
// on the stream as `message` events.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Extension;
use futures_util::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::auth::ClientLabel;
use crate::handlers::ApiError;
use crate::state::AppState;

/// Outbound messages buffered per session before senders wait.
const SESSION_BUFFER: usize = 32;
const KEEP_ALIVE: Duration = Duration::from_secs(15);
pub const MESSAGES_PATH: &str = "/messages/";

struct SessionEntry {
    client: ClientLabel,
    tx: mpsc::Sender<Value>,
}

/// Open SSE sessions keyed by session id.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    max_sessions: usize,
}

/// Removes its session from the registry when the stream is dropped.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
        tracing::info!(session_id = %self.id, "SSE session closed");
    }
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register a new session for `client`. `None` when the cap is reached.
    pub fn open(
        self: &Arc<Self>,
        client: ClientLabel,
    ) -> Option<(String, mpsc::Receiver<Value>, SessionGuard)> {
        let mut sessions = self.lock();
        if sessions.len() >= self.max_sessions {
            return None;
        }
        let id = Uuid::new_v4().simple().to_string();
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        sessions.insert(id.clone(), SessionEntry { client, tx });
        let guard = SessionGuard {
            registry: Arc::clone(self),
            id: id.clone(),
        };
        Some((id, rx, guard))
    }

    /// Sender of the session, if it exists and belongs to `client`.
    pub fn sender(&self, id: &str, client: &ClientLabel) -> Option<mpsc::Sender<Value>> {
        self.lock()
            .get(id)
            .filter(|entry| entry.client == *client)
            .map(|entry| entry.tx.clone())
    }

    fn remove(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Session ids are UUIDs in simple (32 lowercase hex) form.
fn is_valid_session_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

// ── GET /sse ────────────────────────────────────────────────────────────────

#[utoipa::path(get, path = "/sse", tag = "mcp",
    responses(
        (status = 200, description = "Event stream; the first `endpoint` event names the message URL", content_type = "text/event-stream"),
        (status = 401, description = "Missing or invalid token"),
        (status = 503, description = "Too many open sessions")
    ),
    security(("bearer" = []))
)]
pub async fn sse_handler(
    State(state): State<AppState>,
    Extension(client): Extension<ClientLabel>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (session_id, rx, guard) = state
        .sessions
        .open(client.clone())
        .ok_or_else(|| ApiError::Unavailable("Too many open MCP sessions".to_string()))?;

    tracing::info!(client = %client, session_id = %session_id, open = state.sessions.len(), "SSE session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{MESSAGES_PATH}?session_id={session_id}"));

    let messages = ReceiverStream::new(rx).map(move |message| {
        let _session = &guard;
        Event::default().event("message").data(message.to_string())
    });

    let stream = stream::once(async move { endpoint })
        .chain(messages)
        .map(Ok::<_, Infallible>)
        .take_until(state.shutdown.clone().cancelled_owned());

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

// ── POST /messages/ ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    session_id: Option<String>,
}

#[utoipa::path(post, path = "/messages/", tag = "mcp",
    params(("session_id" = String, Query, description = "Session id announced by the `endpoint` event")),
    request_body(content = String, content_type = "application/json", description = "JSON-RPC 2.0 message or batch"),
    responses(
        (status = 202, description = "Accepted; the response is delivered on the event stream"),
        (status = 400, description = "Missing or malformed session id or body"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Unknown session")
    ),
    security(("bearer" = []))
)]
pub async fn messages_handler(
    State(state): State<AppState>,
    Extension(client): Extension<ClientLabel>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let session_id = query
        .session_id
        .ok_or_else(|| ApiError::BadRequest("session_id is required".to_string()))?;
    if !is_valid_session_id(&session_id) {
        return Err(ApiError::BadRequest("Invalid session ID".to_string()));
    }
    let tx = state
        .sessions
        .sender(&session_id, &client)
        .ok_or_else(|| ApiError::NotFound("Could not find session".to_string()))?;

    let message: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Could not parse message: {e}")))?;

    tokio::spawn(async move {
        if let Some(response) = super::server::handle_message(&state, &client, message).await {
            if tx.send(response).await.is_err() {
                tracing::debug!(session_id = %session_id, "SSE session gone before response was delivered");
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}
