//! Request handlers for the Palaver server.
//!
//! The REST routes expose the pull interface over the log; the WebSocket
//! route owns the push session lifecycle (register, backfill, stream,
//! unregister).

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use palaver_core::{ChatHub, DeliveryError, Message, Outbound, Session, SessionId, SessionSink};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The chat hub: log, registry, broadcaster.
    pub hub: ChatHub,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            hub: ChatHub::new(),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route("/api/messages", get(list_messages).post(create_message))
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Palaver server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Query parameters for the pull interface.
#[derive(Debug, Deserialize)]
struct MessagesQuery {
    since: Option<i64>,
}

/// A message payload as submitted by clients.
///
/// Clients may include a timestamp of their own; it is ignored, since the
/// log assigns the authoritative one at append time.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewMessage {
    #[serde(default)]
    user_name: String,
    #[serde(default)]
    content: String,
}

/// Pull interface: the full history, or everything at positions >= `since`.
async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> Json<Vec<Message>> {
    let messages = match query.since {
        // Negative offsets clamp to the start of the log.
        Some(since) => state.hub.log().since(since.max(0) as usize),
        None => state.hub.log().snapshot(),
    };
    metrics::record_poll();
    Json(messages)
}

/// Pull-side write: validate, append, broadcast to push clients.
async fn create_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewMessage>,
) -> impl IntoResponse {
    match state.hub.submit(&body.user_name, &body.content) {
        Ok(message) => {
            metrics::record_message(message.content.len(), "rest");
            metrics::set_log_length(state.hub.log().len());
            (StatusCode::CREATED, Json(message)).into_response()
        }
        Err(e) => {
            debug!(error = %e, "Rejected message");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Queue-backed delivery sink.
///
/// Broadcast fan-out only enqueues; the connection's own task drains the
/// queue into the socket, so a slow socket backs up nobody else.
struct QueueSink(mpsc::UnboundedSender<Outbound>);

impl SessionSink for QueueSink {
    fn deliver(&self, frame: Outbound) -> Result<(), DeliveryError> {
        self.0.send(frame).map_err(|_| DeliveryError::Closed)
    }
}

/// Handle one WebSocket connection for its whole lifetime.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let session_id = SessionId::generate();
    debug!(session = %session_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    // Register first, snapshot second: any message missing from the
    // backfill was appended after registration and arrives through the
    // queue instead.
    state
        .hub
        .registry()
        .register(Session::new(session_id.clone(), Arc::new(QueueSink(tx))));

    // Replay the full history to this one connection. This is a
    // backfill, not a broadcast; it never touches other sessions.
    let backfill = state.hub.log().snapshot();
    let backfill_len = backfill.len() as u64;
    for message in &backfill {
        let payload = match message.to_wire() {
            Ok(payload) => payload,
            Err(e) => {
                error!(session = %session_id, error = %e, "Failed to encode backfill message");
                continue;
            }
        };
        if sender.send(WsMessage::Text(text_frame(&payload))).await.is_err() {
            state.hub.registry().unregister(&session_id);
            debug!(session = %session_id, "Disconnected during backfill");
            return;
        }
    }

    // Message processing loop
    loop {
        tokio::select! {
            // Queued broadcast frames
            Some(frame) = rx.recv() => {
                // Frames below the backfill length duplicate the backfill.
                if frame.seq < backfill_len {
                    continue;
                }
                metrics::record_message(frame.payload.len(), "push");
                if sender.send(WsMessage::Text(text_frame(&frame.payload))).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_inbound(&state, &session_id, &text);
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        let text = String::from_utf8_lossy(&data).into_owned();
                        handle_inbound(&state, &session_id, &text);
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!(session = %session_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session = %session_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(session = %session_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.hub.registry().unregister(&session_id);
    debug!(session = %session_id, "WebSocket disconnected");
}

/// Parse and submit one inbound chat frame.
///
/// Bad frames are logged and dropped; the connection stays up.
fn handle_inbound(state: &Arc<AppState>, session_id: &SessionId, text: &str) {
    match serde_json::from_str::<NewMessage>(text) {
        Ok(body) => match state.hub.submit(&body.user_name, &body.content) {
            Ok(_) => {
                metrics::record_message(text.len(), "ws");
                metrics::set_log_length(state.hub.log().len());
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "Rejected message");
            }
        },
        Err(e) => {
            warn!(session = %session_id, error = %e, "Unparseable message frame");
            metrics::record_error("parse");
        }
    }
}

/// The wire payload is JSON produced by the hub, so it is valid UTF-8.
fn text_frame(payload: &Bytes) -> String {
    String::from_utf8_lossy(payload).into_owned()
}
