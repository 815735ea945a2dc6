//! Chat message value type and its JSON wire form.
//!
//! The same encoding is used for pull responses and push payloads, so a
//! client can parse both with one type.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single chat message.
///
/// Messages are immutable once appended; identity is the message's
/// position in the log, not a field on the message itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Display name of the sender.
    pub user_name: String,
    /// Message body.
    pub content: String,
    /// When the message was appended, RFC3339 on the wire.
    pub timestamp: DateTime<Utc>,
}

/// Wire encoding errors.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON encoding failed.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Message {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn new(user_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::at(user_name, content, Utc::now())
    }

    /// Create a message with an explicit timestamp.
    ///
    /// The log uses this to keep timestamps non-decreasing in log order.
    #[must_use]
    pub fn at(
        user_name: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            content: content.into(),
            timestamp,
        }
    }

    /// Encode to the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON encoding fails.
    pub fn to_wire(&self) -> Result<Bytes, WireError> {
        let json = serde_json::to_vec(self)?;
        Ok(Bytes::from(json))
    }
}
