//! # user-gateway
//!
//! REST API and WebSocket gateway for user management.
//!
//! Every create/read/update/delete intent, whether it arrives over HTTP or
//! a WebSocket session, is serialized through a single request actor.
//! Successful mutations are published to a message transport, and an
//! event bridge fans them back out to every live session.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── Sessions + ConnectionHub (ws/)
//!     │
//!     ├── UserService → RequestActor (service/)
//!     │         │
//!     │         ├── UserStore (persistence/: in-memory or PostgreSQL)
//!     │         └── Publisher ──► EventBus (domain/)
//!     │                              │
//!     └── EventBridge (bridge/) ◄────┘ ──► ConnectionHub::broadcast
//! ```

pub mod api;
pub mod app_state;
pub mod bridge;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod server;
pub mod service;
pub mod ws;
