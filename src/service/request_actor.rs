//! Single-writer request actor.
//!
//! Every create/read/update/delete intent is funnelled through one bounded
//! MPSC queue drained by a single consumer task. Requests are applied to
//! the [`UserStore`] strictly in queue order, one at a time, so mutations
//! never interleave and the store needs no extra locking. Each request
//! carries its own one-shot reply channel and receives exactly one result.
//!
//! Lifecycle: the consumer is bound to a [`CancellationToken`]. On
//! cancellation the actor flips to [`ActorState::Cancelled`], closes the
//! queue (pending and future `submit` calls fail immediately), answers every
//! request still buffered with [`GatewayError::ActorStopped`], then exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{NewUser, Publisher, User, UserEventKind, UserId, UserPatch, Validator};
use crate::error::GatewayError;
use crate::persistence::UserStore;

/// One-shot reply destination for a request producing `T`.
pub type Responder<T> = oneshot::Sender<Result<T, GatewayError>>;

/// Queue and submission settings for [`RequestActor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorConfig {
    /// Number of requests that may wait in the queue.
    pub queue_capacity: usize,
    /// How long `submit` waits for queue capacity before giving up.
    pub submit_timeout: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            submit_timeout: Duration::from_secs(3),
        }
    }
}

/// A unit of work for the actor plus its reply destination.
#[derive(Debug)]
pub enum MutationRequest {
    /// Validate and insert a new user.
    CreateUser {
        /// Creation fields.
        user: NewUser,
        /// Reply destination.
        respond_to: Responder<User>,
    },
    /// List every user.
    GetUsers {
        /// Reply destination.
        respond_to: Responder<Vec<User>>,
    },
    /// Fetch one user.
    GetUser {
        /// Target user.
        id: UserId,
        /// Reply destination.
        respond_to: Responder<User>,
    },
    /// Apply a partial update.
    UpdateUser {
        /// Target user.
        id: UserId,
        /// Fields to change.
        patch: UserPatch,
        /// Reply destination.
        respond_to: Responder<User>,
    },
    /// Delete one user.
    DeleteUser {
        /// Target user.
        id: UserId,
        /// Reply destination.
        respond_to: Responder<()>,
    },
}

impl MutationRequest {
    /// Returns the request tag used in logs.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::CreateUser { .. } => "create_user",
            Self::GetUsers { .. } => "get_users",
            Self::GetUser { .. } => "get_user",
            Self::UpdateUser { .. } => "update_user",
            Self::DeleteUser { .. } => "delete_user",
        }
    }

    /// Answers the request with `err` without running it.
    fn reject(self, err: GatewayError) {
        let tag = self.tag();
        match self {
            Self::CreateUser { respond_to, .. }
            | Self::GetUser { respond_to, .. }
            | Self::UpdateUser { respond_to, .. } => deliver(tag, respond_to, Err(err)),
            Self::GetUsers { respond_to } => deliver(tag, respond_to, Err(err)),
            Self::DeleteUser { respond_to, .. } => deliver(tag, respond_to, Err(err)),
        }
    }
}

/// Observable actor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    /// Accepting and processing requests.
    Running,
    /// Cancelled; every submission is rejected.
    Cancelled,
}

/// Cloneable handle to the request actor.
#[derive(Debug, Clone)]
pub struct RequestActor {
    sender: mpsc::Sender<MutationRequest>,
    running: Arc<AtomicBool>,
    submit_timeout: Duration,
}

impl RequestActor {
    /// Starts the consumer task and returns a handle plus its join handle.
    ///
    /// The consumer runs until `cancel` fires or every handle is dropped.
    #[must_use]
    pub fn spawn(
        store: Arc<dyn UserStore>,
        validator: Arc<dyn Validator>,
        publisher: Arc<dyn Publisher>,
        config: ActorConfig,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            store,
            validator,
            publisher,
            receiver,
            running: Arc::clone(&running),
            cancel,
        };
        let join = tokio::spawn(worker.run());

        let actor = Self {
            sender,
            running,
            submit_timeout: config.submit_timeout,
        };
        (actor, join)
    }

    /// Enqueues a request.
    ///
    /// Waits up to the configured submission timeout for queue capacity.
    /// Success only means the request is queued; the result arrives on
    /// the request's own reply channel.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ActorStopped`] if the actor has been cancelled.
    /// - [`GatewayError::Timeout`] if the queue stayed full; the request
    ///   is dropped, not enqueued.
    pub async fn submit(&self, request: MutationRequest) -> Result<(), GatewayError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(GatewayError::ActorStopped);
        }
        let tag = request.tag();
        match self.sender.send_timeout(request, self.submit_timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                tracing::warn!(
                    tag,
                    timeout_ms = self.submit_timeout.as_millis(),
                    "request queue full, dropping request"
                );
                Err(GatewayError::Timeout)
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(GatewayError::ActorStopped),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ActorState {
        if self.running.load(Ordering::Acquire) && !self.sender.is_closed() {
            ActorState::Running
        } else {
            ActorState::Cancelled
        }
    }

    /// Returns the number of free queue slots.
    #[must_use]
    pub fn available_capacity(&self) -> usize {
        self.sender.capacity()
    }
}

/// State owned by the consumer task.
struct Worker {
    store: Arc<dyn UserStore>,
    validator: Arc<dyn Validator>,
    publisher: Arc<dyn Publisher>,
    receiver: mpsc::Receiver<MutationRequest>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        tracing::info!("request actor started");
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = self.receiver.recv() => match next {
                    Some(request) => self.process(request).await,
                    None => break,
                },
            }
        }
        self.shutdown().await;
    }

    /// Rejects new work, then answers whatever is still buffered.
    async fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        self.receiver.close();
        let mut rejected = 0usize;
        while let Some(request) = self.receiver.recv().await {
            request.reject(GatewayError::ActorStopped);
            rejected = rejected.saturating_add(1);
        }
        tracing::info!(rejected, "request actor stopped");
    }

    async fn process(&self, request: MutationRequest) {
        let tag = request.tag();
        tracing::debug!(tag, "processing request");
        match request {
            MutationRequest::CreateUser { user, respond_to } => {
                deliver(tag, respond_to, self.create(user).await);
            }
            MutationRequest::GetUsers { respond_to } => {
                deliver(tag, respond_to, self.store.list().await);
            }
            MutationRequest::GetUser { id, respond_to } => {
                deliver(tag, respond_to, self.store.get(id).await);
            }
            MutationRequest::UpdateUser {
                id,
                patch,
                respond_to,
            } => {
                deliver(tag, respond_to, self.update(id, patch).await);
            }
            MutationRequest::DeleteUser { id, respond_to } => {
                deliver(tag, respond_to, self.delete(id).await);
            }
        }
    }

    async fn create(&self, user: NewUser) -> Result<User, GatewayError> {
        self.validator.validate_create(&user)?;
        let created = self.store.create(user).await?;
        tracing::info!(user_id = %created.id, "user created");
        self.announce(UserEventKind::UserCreated, &created).await;
        Ok(created)
    }

    async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, GatewayError> {
        let updated = self.store.update(id, patch).await?;
        tracing::info!(user_id = %id, "user updated");
        self.announce(UserEventKind::UserUpdated, &updated).await;
        Ok(updated)
    }

    async fn delete(&self, id: UserId) -> Result<(), GatewayError> {
        self.store.delete(id).await?;
        tracing::info!(user_id = %id, "user deleted");
        self.announce(UserEventKind::UserDeleted, &serde_json::json!({ "user_id": id }))
            .await;
        Ok(())
    }

    /// Best-effort state-change notification; failures are only logged.
    async fn announce<T: Serialize + Sync>(&self, kind: UserEventKind, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(kind = kind.as_str(), error = %e, "failed to encode event payload");
                return;
            }
        };
        if let Err(e) = self.publisher.notify(kind, payload).await {
            tracing::warn!(kind = kind.as_str(), error = %e, "failed to publish state change");
        }
    }
}

/// Sends the single result for a request.
fn deliver<T>(tag: &'static str, respond_to: Responder<T>, result: Result<T, GatewayError>) {
    if respond_to.send(result).is_err() {
        tracing::debug!(tag, "caller went away before the reply");
    }
}
