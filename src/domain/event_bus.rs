//! Message transport seam and its in-process implementation.
//!
//! The request actor announces state changes through a [`Publisher`]; the
//! event bridge consumes them through an [`EventSource`]. An external
//! broker sits behind these traits in a multi-process deployment.
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel and implements
//! both sides for a single process.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{DomainEvent, UserEventKind};
use crate::error::GatewayError;

/// One transport record: a partition key plus an encoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Record key (the event kind name).
    pub key: String,
    /// Encoded [`DomainEvent`] envelope.
    pub value: Vec<u8>,
}

/// Outbound side of the transport.
#[async_trait]
pub trait Publisher: Send + Sync + std::fmt::Debug {
    /// Announces a state change.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the record cannot be
    /// encoded or handed to the transport.
    async fn notify(&self, kind: UserEventKind, payload: serde_json::Value)
    -> Result<(), GatewayError>;
}

/// Inbound side of the transport.
#[async_trait]
pub trait EventSource: Send + Sync + std::fmt::Debug {
    /// Opens a subscription on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the subscription cannot be
    /// established.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn EventSubscription>, GatewayError>;
}

/// A live subscription yielding records in transport order.
#[async_trait]
pub trait EventSubscription: Send {
    /// Waits for the next record. `Ok(None)` means the upstream closed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] on a connection-level failure.
    async fn next(&mut self) -> Result<Option<RawEvent>, GatewayError>;
}

/// Broadcast bus for [`RawEvent`]s on a single topic.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest events are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    topic: String,
    sender: broadcast::Sender<RawEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` serving `topic` with the given capacity.
    #[must_use]
    pub fn new(topic: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            topic: topic.into(),
            sender,
        }
    }

    /// Returns the topic this bus serves.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes a record to all subscribers.
    ///
    /// Returns the number of receivers that received the record.
    /// If there are no active receivers, the record is silently dropped.
    pub fn publish(&self, event: RawEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl Publisher for EventBus {
    async fn notify(
        &self,
        kind: UserEventKind,
        payload: serde_json::Value,
    ) -> Result<(), GatewayError> {
        let value = DomainEvent::new(kind, payload).encode()?;
        let receivers = self.publish(RawEvent {
            key: kind.as_str().to_string(),
            value,
        });
        tracing::debug!(kind = kind.as_str(), receivers, "event published");
        Ok(())
    }
}

#[async_trait]
impl EventSource for EventBus {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn EventSubscription>, GatewayError> {
        if topic != self.topic {
            return Err(GatewayError::Transport(format!("unknown topic {topic}")));
        }
        Ok(Box::new(BusSubscription {
            receiver: self.sender.subscribe(),
        }))
    }
}

/// Subscription handed out by [`EventBus`].
#[derive(Debug)]
struct BusSubscription {
    receiver: broadcast::Receiver<RawEvent>,
}

#[async_trait]
impl EventSubscription for BusSubscription {
    async fn next(&mut self) -> Result<Option<RawEvent>, GatewayError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(Some(event)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event subscriber lagged behind bus");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}
