//! Persistence layer: the user storage collaborator.
//!
//! [`UserStore`] is the row-level interface the request actor drives. It
//! is called serially from the actor's single consumer task, so
//! implementations only need to be safe for shared ownership, not to
//! arbitrate concurrent mutations. Two backends are provided: an
//! in-memory map and PostgreSQL via `sqlx::PgPool`.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

pub use memory::InMemoryUserStore;
pub use postgres::PostgresUserStore;

use crate::domain::{NewUser, User, UserId, UserPatch};
use crate::error::GatewayError;

/// Row operations on the `users` collection.
#[async_trait]
pub trait UserStore: Send + Sync + std::fmt::Debug {
    /// Inserts a user and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DuplicateUser`] on a unique-email clash or
    /// [`GatewayError::Persistence`] on backend failure.
    async fn create(&self, user: NewUser) -> Result<User, GatewayError>;

    /// Returns every user ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] on backend failure.
    async fn list(&self) -> Result<Vec<User>, GatewayError>;

    /// Returns one user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserNotFound`] if `id` is absent.
    async fn get(&self, id: UserId) -> Result<User, GatewayError>;

    /// Applies a partial update and returns the new record.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserNotFound`] if `id` is absent or
    /// [`GatewayError::DuplicateUser`] if the new email is taken.
    async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, GatewayError>;

    /// Deletes one user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserNotFound`] if `id` is absent.
    async fn delete(&self, id: UserId) -> Result<(), GatewayError>;
}
