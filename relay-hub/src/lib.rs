//! # relay-hub: Real-time message fan-out over WebSocket
//!
//! Every connected client can submit a text message; every connected
//! client receives each message, rendered as an HTML fragment for htmx.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   {"text": ...}    ┌──────────────┐
//! │ Receive loop │ ─────────────────► │  mpsc queue  │
//! │ (per client) │                    └──────┬───────┘
//! └──────────────┘                           │
//!        ▲                                   ▼
//!        │                            ┌──────────────┐
//!        │      rendered fragment     │  Dispatcher  │
//!   WebSocket ◄────────────────────── │  (single)    │
//!                                     └──────┬───────┘
//!                                            │
//!                                    ┌───────┴───────┐
//!                                    │   Registry    │
//!                                    │ (live conns)  │
//!                                    └───────────────┘
//! ```
//!
//! Receive loops only read; the dispatcher is the only writer to any
//! connection. A failed write evicts that connection without affecting
//! the others.
//!
//! ## Modules
//!
//! - [`message`]: Inbound JSON message and rendered outbound frame
//! - [`render`]: HTML fragment and index page templates
//! - [`connection`]: Connection identity and the write half
//! - [`registry`]: Set of live connections
//! - [`hub`]: Registry plus inbound queue
//! - [`dispatcher`]: Serialized fan-out
//! - [`receive`]: Per-connection read loop
//! - [`server`]: HTTP routes and WebSocket upgrade

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod message;
pub mod receive;
pub mod registry;
pub mod render;
pub mod server;

// Re-exports for convenience
pub use connection::{Connection, ConnectionId, WsConnection};
pub use dispatcher::Dispatcher;
pub use error::{HubError, Result};
pub use hub::{Hub, HubConfig, HubStats};
pub use message::{Frame, Message};
pub use receive::{receive_loop, LoopExit};
pub use registry::{ConnectionRegistry, FanOut, Visit};
pub use render::{render_index, render_message};
pub use server::{router, RelayServer, ServerConfig, PING_GREETING};
