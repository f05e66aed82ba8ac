//! Connection hub: live session registry, broadcast, and message dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::messages::{ClientCommand, InboundMessage, OutboundMessage, response_type};
use super::origin::OriginPolicy;
use super::session::{Delivery, SessionConfig, SessionHandle, SessionId};
use crate::error::GatewayError;
use crate::service::UserService;

/// Executes one decoded client command.
#[async_trait]
pub trait MessageHandler: Send + Sync + std::fmt::Debug {
    /// Runs `command` and returns the success `data` for the reply.
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying operation fails with.
    async fn handle(&self, command: ClientCommand) -> Result<Value, GatewayError>;
}

/// Runs user commands through the [`UserService`].
#[derive(Debug, Clone)]
pub struct UserCommandHandler {
    service: UserService,
}

impl UserCommandHandler {
    /// Creates a handler over `service`.
    #[must_use]
    pub const fn new(service: UserService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for UserCommandHandler {
    async fn handle(&self, command: ClientCommand) -> Result<Value, GatewayError> {
        let data = match command {
            ClientCommand::CreateUser(user) => to_data(&self.service.create_user(user).await?)?,
            ClientCommand::GetUsers => to_data(&self.service.list_users().await?)?,
            ClientCommand::GetUser { id } => to_data(&self.service.get_user(id).await?)?,
            ClientCommand::UpdateUser { id, patch } => {
                to_data(&self.service.update_user(id, patch).await?)?
            }
            ClientCommand::DeleteUser { id } => {
                self.service.delete_user(id).await?;
                serde_json::json!({ "user_id": id })
            }
        };
        Ok(data)
    }
}

fn to_data<T: serde::Serialize>(value: &T) -> Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::Internal(e.to_string()))
}

/// Outcome of one [`ConnectionHub::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions the message was queued for.
    pub delivered: usize,
    /// Sessions whose queue was full.
    pub dropped: usize,
    /// Sessions found closed and unregistered.
    pub closed: usize,
}

/// Owns every live session and routes messages to and from them.
///
/// The registry sits behind a read/write lock: broadcasts share the read
/// lock, registration takes the write lock. The handler table is built in
/// [`ConnectionHub::new`] and never changes afterwards, so dispatch reads
/// it without locking.
#[derive(Debug)]
pub struct ConnectionHub {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    handlers: HashMap<&'static str, Arc<dyn MessageHandler>>,
    origin_policy: OriginPolicy,
    session_config: SessionConfig,
}

impl ConnectionHub {
    /// Creates a hub with a handler for every [`ClientCommand`] tag.
    #[must_use]
    pub fn new(
        service: UserService,
        origin_policy: OriginPolicy,
        session_config: SessionConfig,
    ) -> Self {
        let handler: Arc<dyn MessageHandler> = Arc::new(UserCommandHandler::new(service));
        let handlers = ClientCommand::TAGS
            .iter()
            .map(|tag| (*tag, Arc::clone(&handler)))
            .collect();
        Self {
            sessions: RwLock::new(HashMap::new()),
            handlers,
            origin_policy,
            session_config,
        }
    }

    /// Returns the upgrade origin gate.
    #[must_use]
    pub const fn origin_policy(&self) -> &OriginPolicy {
        &self.origin_policy
    }

    /// Returns the settings new sessions run with.
    #[must_use]
    pub const fn session_config(&self) -> SessionConfig {
        self.session_config
    }

    /// Adds a session to the registry.
    pub async fn register(&self, handle: SessionHandle) {
        let id = handle.id();
        let count = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(id, handle);
            sessions.len()
        };
        tracing::debug!(session_id = %id, sessions = count, "session registered");
    }

    /// Removes a session. Returns `false` if it was not registered.
    pub async fn unregister(&self, id: SessionId) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!(session_id = %id, "session unregistered");
        }
        removed
    }

    /// Returns the number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Returns `true` if `id` is registered.
    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    #[cfg(test)]
    pub(crate) async fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Asks every registered session to shut down. Returns how many were
    /// signalled.
    pub async fn close_all(&self) -> usize {
        let sessions = self.sessions.read().await;
        for handle in sessions.values() {
            handle.request_shutdown();
        }
        tracing::info!(sessions = sessions.len(), "closing all sessions");
        sessions.len()
    }

    /// Queues `{type, status: success, data}` for every registered session.
    ///
    /// Never waits on a session: a full queue drops the message for that
    /// session only, and closed sessions are unregistered afterwards.
    pub async fn broadcast(&self, msg_type: &str, data: Value) -> BroadcastReport {
        let message = OutboundMessage::success(msg_type, data);
        let mut report = BroadcastReport::default();
        let mut gone = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, handle) in sessions.iter() {
                match handle.try_deliver(message.clone()) {
                    Delivery::Delivered => report.delivered = report.delivered.saturating_add(1),
                    Delivery::Full => {
                        tracing::warn!(session_id = %id, msg_type, "outbound queue full, dropping broadcast");
                        report.dropped = report.dropped.saturating_add(1);
                    }
                    Delivery::Closed => gone.push(*id),
                }
            }
        }
        for id in gone {
            if self.unregister(id).await {
                report.closed = report.closed.saturating_add(1);
            }
        }
        tracing::debug!(
            msg_type,
            delivered = report.delivered,
            dropped = report.dropped,
            closed = report.closed,
            "broadcast"
        );
        report
    }

    /// Routes one inbound message and writes the reply to `session`.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UnknownMessageType`] if no handler is registered
    ///   for the tag (an error reply is still sent).
    /// - The handler's error, after an error reply has been sent.
    /// - [`GatewayError::Transport`] if the session closed before the reply
    ///   could be queued.
    pub async fn dispatch(
        &self,
        inbound: InboundMessage,
        session: &SessionHandle,
    ) -> Result<(), GatewayError> {
        let reply_type = response_type(&inbound.msg_type);
        let Some(handler) = self.handlers.get(inbound.msg_type.as_str()) else {
            let err = GatewayError::UnknownMessageType(inbound.msg_type);
            session
                .send(OutboundMessage::error(reply_type, err.client_message()))
                .await?;
            return Err(err);
        };

        let result = match ClientCommand::decode(&inbound) {
            Ok(command) => handler.handle(command).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(data) => session.send(OutboundMessage::success(reply_type, data)).await,
            Err(err) => {
                if err.is_internal() {
                    tracing::error!(session_id = %session.id(), error = %err, "handler failed");
                }
                session
                    .send(OutboundMessage::error(reply_type, err.client_message()))
                    .await?;
                Err(err)
            }
        }
    }
}
