//! User service: request/response façade over the [`RequestActor`].

use std::time::Duration;

use tokio::sync::oneshot;

use super::request_actor::{MutationRequest, RequestActor, Responder};
use crate::domain::{NewUser, User, UserId, UserPatch};
use crate::error::GatewayError;

/// Turns each user operation into an actor request and waits for its reply.
///
/// Every call submits exactly one [`MutationRequest`] and then waits at
/// most `response_timeout` for the single result. The HTTP API and the
/// WebSocket handlers both go through this type.
#[derive(Debug, Clone)]
pub struct UserService {
    actor: RequestActor,
    response_timeout: Duration,
}

impl UserService {
    /// Creates a service over a running actor.
    #[must_use]
    pub const fn new(actor: RequestActor, response_timeout: Duration) -> Self {
        Self {
            actor,
            response_timeout,
        }
    }

    /// Returns the underlying actor handle.
    #[must_use]
    pub const fn actor(&self) -> &RequestActor {
        &self.actor
    }

    /// Validates and creates a user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ValidationFailed`], [`GatewayError::DuplicateUser`],
    /// or any submission/timeout error from [`UserService::call`].
    pub async fn create_user(&self, user: NewUser) -> Result<User, GatewayError> {
        self.call(|respond_to| MutationRequest::CreateUser { user, respond_to })
            .await
    }

    /// Lists all users ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a submission/timeout error or a storage failure.
    pub async fn list_users(&self) -> Result<Vec<User>, GatewayError> {
        self.call(|respond_to| MutationRequest::GetUsers { respond_to })
            .await
    }

    /// Fetches one user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserNotFound`] if no user has `id`.
    pub async fn get_user(&self, id: UserId) -> Result<User, GatewayError> {
        self.call(|respond_to| MutationRequest::GetUser { id, respond_to })
            .await
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserNotFound`] or [`GatewayError::DuplicateUser`].
    pub async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, GatewayError> {
        self.call(|respond_to| MutationRequest::UpdateUser {
            id,
            patch,
            respond_to,
        })
        .await
    }

    /// Deletes a user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserNotFound`] if no user has `id`.
    pub async fn delete_user(&self, id: UserId) -> Result<(), GatewayError> {
        self.call(|respond_to| MutationRequest::DeleteUser { id, respond_to })
            .await
    }

    /// Submits one request and waits for its reply.
    ///
    /// # Errors
    ///
    /// - Submission errors from [`RequestActor::submit`].
    /// - [`GatewayError::Timeout`] if no reply arrives in time.
    /// - [`GatewayError::Internal`] if the reply channel is dropped unanswered.
    async fn call<T>(
        &self,
        build: impl FnOnce(Responder<T>) -> MutationRequest,
    ) -> Result<T, GatewayError> {
        let (respond_to, reply) = oneshot::channel();
        self.actor.submit(build(respond_to)).await?;
        match tokio::time::timeout(self.response_timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::Internal(
                "request actor dropped the reply".to_string(),
            )),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.response_timeout.as_millis(),
                    "timed out waiting for request actor"
                );
                Err(GatewayError::Timeout)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::domain::{DefaultValidator, EventBus, EventSource, Publisher};
    use crate::persistence::{InMemoryUserStore, UserStore};
    use crate::service::ActorConfig;

    fn service_over(store: Arc<dyn UserStore>, bus: &EventBus, timeout: Duration) -> UserService {
        let (actor, _join) = RequestActor::spawn(
            store,
            Arc::new(DefaultValidator::new()),
            Arc::new(bus.clone()) as Arc<dyn Publisher>,
            ActorConfig::default(),
            CancellationToken::new(),
        );
        UserService::new(actor, timeout)
    }

    fn ann() -> NewUser {
        NewUser {
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: "ann@x.com".into(),
            phone: None,
            age: Some(30),
            status: Some("Active".into()),
        }
    }

    /// Store whose operations never complete.
    #[derive(Debug)]
    struct StalledStore;

    #[async_trait]
    impl UserStore for StalledStore {
        async fn create(&self, _user: NewUser) -> Result<User, GatewayError> {
            std::future::pending().await
        }
        async fn list(&self) -> Result<Vec<User>, GatewayError> {
            std::future::pending().await
        }
        async fn get(&self, _id: UserId) -> Result<User, GatewayError> {
            std::future::pending().await
        }
        async fn update(&self, _id: UserId, _patch: UserPatch) -> Result<User, GatewayError> {
            std::future::pending().await
        }
        async fn delete(&self, _id: UserId) -> Result<(), GatewayError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn crud_round_trip_through_actor() {
        let bus = EventBus::new("users", 64);
        let service = service_over(Arc::new(InMemoryUserStore::new()), &bus, Duration::from_secs(2));

        let Ok(created) = service.create_user(ann()).await else {
            panic!("create failed");
        };
        let Ok(fetched) = service.get_user(created.id).await else {
            panic!("get failed");
        };
        assert_eq!(fetched, created);

        let patch = UserPatch {
            age: Some(31),
            ..UserPatch::default()
        };
        let Ok(updated) = service.update_user(created.id, patch).await else {
            panic!("update failed");
        };
        assert_eq!(updated.age, Some(31));

        assert!(service.delete_user(created.id).await.is_ok());
        let Ok(users) = service.list_users().await else {
            panic!("list failed");
        };
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn mutations_are_announced_on_the_bus() {
        let bus = EventBus::new("users", 64);
        let Ok(mut sub) = bus.subscribe("users").await else {
            panic!("subscribe failed");
        };
        let service = service_over(Arc::new(InMemoryUserStore::new()), &bus, Duration::from_secs(2));

        let Ok(created) = service.create_user(ann()).await else {
            panic!("create failed");
        };
        assert!(service.delete_user(created.id).await.is_ok());

        let Ok(Some(first)) = sub.next().await else {
            panic!("expected created record");
        };
        let Ok(Some(second)) = sub.next().await else {
            panic!("expected deleted record");
        };
        assert_eq!(first.key, "user_created");
        assert_eq!(second.key, "user_deleted");
    }

    #[tokio::test]
    async fn slow_actor_yields_timeout() {
        let bus = EventBus::new("users", 8);
        let service = service_over(Arc::new(StalledStore), &bus, Duration::from_millis(50));
        let result = service.list_users().await;
        assert!(matches!(result, Err(GatewayError::Timeout)));
    }

    #[tokio::test]
    async fn stopped_actor_yields_actor_stopped() {
        let bus = EventBus::new("users", 8);
        let cancel = CancellationToken::new();
        let (actor, join) = RequestActor::spawn(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(DefaultValidator::new()),
            Arc::new(bus) as Arc<dyn Publisher>,
            ActorConfig::default(),
            cancel.clone(),
        );
        let service = UserService::new(actor, Duration::from_secs(1));
        cancel.cancel();
        assert!(join.await.is_ok());
        assert!(matches!(service.get_user(UserId::new(1)).await, Err(GatewayError::ActorStopped)));
    }
}
