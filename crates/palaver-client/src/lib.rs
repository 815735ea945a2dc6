//! Shared pieces for the Palaver command-line clients.

use chrono::Local;
use palaver_core::Message;

/// Render a message the way both clients print it.
#[must_use]
pub fn format_message(message: &Message) -> String {
    let local = message.timestamp.with_timezone(&Local);
    format!(
        "[{}] {}: {}",
        local.format("%H:%M:%S"),
        message.user_name,
        message.content
    )
}

/// Base HTTP URL of the server, from `PALAVER_URL` or the local default.
#[must_use]
pub fn server_url() -> String {
    std::env::var("PALAVER_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
}

/// WebSocket URL of the chat endpoint, from `PALAVER_WS_URL` or the
/// local default.
#[must_use]
pub fn ws_url() -> String {
    std::env::var("PALAVER_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080/chat".to_string())
}
