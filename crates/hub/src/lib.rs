//! Real-time chat hub over WebSocket.
//!
//! Clients connect to [`HUB_PATH`] and exchange JSON frames described in
//! [`protocol`]. Each `sendMessage` runs as an independent turn on the
//! [`ChatEndpoint`]; its output is delivered according to [`Delivery`].

pub mod endpoint;
mod error;
pub mod outbox;
pub mod protocol;
mod server;

pub use endpoint::{ChatEndpoint, ChatTurn, TurnPhase};
pub use error::ServerError;
pub use outbox::{ConnectionOutbox, DEFAULT_HUB_CAPACITY, Delivery, Hub, Outbox};
pub use protocol::{ClientMessage, SYSTEM_SENDER, ServerEvent};
pub use server::{HUB_PATH, HubState, router, serve};
