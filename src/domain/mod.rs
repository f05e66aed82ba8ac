//! Domain layer: user model, validation, events, and the message transport.
//!
//! This module contains the server-side domain model: user records and
//! their payloads, the creation validator, the domain event envelope, and
//! the publish/subscribe seam with its in-process [`EventBus`].

pub mod event_bus;
pub mod user;
pub mod user_event;
pub mod validator;

pub use event_bus::{EventBus, EventSource, EventSubscription, Publisher, RawEvent};
pub use user::{NewUser, User, UserId, UserPatch};
pub use user_event::{DomainEvent, UserEventKind};
pub use validator::{DefaultValidator, Validator};
