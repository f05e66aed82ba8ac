//! In-memory user store used when persistence is disabled and in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::UserStore;
use crate::domain::{NewUser, User, UserId, UserPatch};
use crate::error::GatewayError;

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<UserId, User>,
    next_id: i64,
}

impl Inner {
    /// Exact match, as the `users.email` unique constraint compares.
    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

/// `BTreeMap`-backed store with sequential identifiers starting at 1.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Inner>,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored users.
    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }

    /// Returns `true` if no users are stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.users.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<User, GatewayError> {
        let user = user.normalized();
        let mut inner = self.inner.write().await;
        if inner.email_taken(&user.email, None) {
            return Err(GatewayError::DuplicateUser);
        }
        inner.next_id = inner.next_id.saturating_add(1);
        let id = UserId::new(inner.next_id);
        let now = Utc::now();
        let record = User {
            id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            age: user.age,
            status: user.status,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(id, record.clone());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<User>, GatewayError> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn get(&self, id: UserId) -> Result<User, GatewayError> {
        self.inner
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or(GatewayError::UserNotFound(id))
    }

    async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, GatewayError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&id) {
            return Err(GatewayError::UserNotFound(id));
        }
        if let Some(email) = patch.email.as_deref()
            && inner.email_taken(email, Some(id))
        {
            return Err(GatewayError::DuplicateUser);
        }
        let user = inner
            .users
            .get_mut(&id)
            .ok_or(GatewayError::UserNotFound(id))?;
        user.apply_patch(patch, Utc::now());
        Ok(user.clone())
    }

    async fn delete(&self, id: UserId) -> Result<(), GatewayError> {
        self.inner
            .write()
            .await
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(GatewayError::UserNotFound(id))
    }
}
