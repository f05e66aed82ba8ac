//! Service layer: serialized request handling.
//!
//! [`RequestActor`] owns the single writer loop over the user store;
//! [`UserService`] is the request/response façade the API and WebSocket
//! handlers call.

pub mod request_actor;
pub mod user_service;

pub use request_actor::{ActorConfig, ActorState, MutationRequest, RequestActor};
pub use user_service::UserService;
