//! # palaver-core
//!
//! Message log, session registry, and broadcast engine for the Palaver
//! group chat hub.
//!
//! This crate provides the concurrency-sensitive heart of the system:
//!
//! - **MessageLog** - Append-only, indexed sequence of chat messages
//! - **SessionRegistry** - Live push connections, safe for concurrent use
//! - **Broadcaster** - Serialize-once fan-out with per-session pruning
//! - **ChatHub** - Ingress funnel that appends then broadcasts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐
//! │   Writer    │────▶│   ChatHub   │────▶│   MessageLog    │
//! └─────────────┘     └──────┬──────┘     └─────────────────┘
//!                            │                     ▲
//!                            ▼                     │ since/snapshot
//!                     ┌─────────────┐     ┌────────┴────────┐
//!                     │ Broadcaster │     │     Pollers     │
//!                     └──────┬──────┘     └─────────────────┘
//!                            ▼
//!                     ┌─────────────┐
//!                     │  Sessions   │
//!                     └─────────────┘
//! ```
//!
//! Pull readers query the log directly by index; push readers receive
//! every accepted message through the broadcaster. Both observe the same
//! total order, assigned by the log at append time.

pub mod broadcast;
pub mod hub;
pub mod log;
pub mod message;
pub mod session;

pub use broadcast::Broadcaster;
pub use hub::{ChatHub, SubmitError};
pub use log::MessageLog;
pub use message::{Message, WireError};
pub use session::{DeliveryError, Outbound, Session, SessionId, SessionRegistry, SessionSink};
