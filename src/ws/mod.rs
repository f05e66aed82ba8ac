//! WebSocket layer: sessions, the connection hub, and message routing.
//!
//! The endpoint at `/ws_users` (also `/ws`) upgrades to a [`Session`]
//! registered with the [`ConnectionHub`], which dispatches client commands
//! and fans out change broadcasts.

pub mod handler;
pub mod hub;
pub mod messages;
pub mod origin;
pub mod session;

pub use hub::{BroadcastReport, ConnectionHub, MessageHandler, UserCommandHandler};
pub use messages::{ClientCommand, InboundMessage, OutboundMessage, Status};
pub use origin::OriginPolicy;
pub use session::{Delivery, Session, SessionConfig, SessionHandle, SessionId, SessionState};
