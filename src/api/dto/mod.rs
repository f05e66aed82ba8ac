//! Data Transfer Objects for REST request/response serialization.
//!
//! Request bodies reuse the domain payloads ([`NewUser`](crate::domain::NewUser),
//! [`UserPatch`](crate::domain::UserPatch)) and responses return
//! [`User`](crate::domain::User) directly; only acknowledgements live here.

pub mod user_dto;

pub use user_dto::*;
