//! Event bridge: message transport → session broadcast.
//!
//! Subscribes to the change topic, decodes each [`DomainEvent`] envelope and
//! asks the [`ConnectionHub`] to broadcast it. Malformed records are logged
//! and skipped. A failed or closed subscription is re-established after a
//! back-off, so one transient upstream error never stops consumption.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{DomainEvent, EventSource, EventSubscription, RawEvent};
use crate::ws::{BroadcastReport, ConnectionHub};

/// Consumes domain events and fans them out to live sessions.
#[derive(Debug)]
pub struct EventBridge {
    source: Arc<dyn EventSource>,
    hub: Arc<ConnectionHub>,
    topic: String,
    retry_backoff: Duration,
}

impl EventBridge {
    /// Creates a bridge reading `topic` from `source`.
    #[must_use]
    pub fn new(
        source: Arc<dyn EventSource>,
        hub: Arc<ConnectionHub>,
        topic: impl Into<String>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            source,
            hub,
            topic: topic.into(),
            retry_backoff,
        }
    }

    /// Runs the bridge on its own task until `cancel` fires.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        tracing::info!(topic = %self.topic, "event bridge started");
        loop {
            let subscription = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                subscription = self.source.subscribe(&self.topic) => subscription,
            };
            match subscription {
                Ok(subscription) => {
                    tracing::info!(topic = %self.topic, "subscribed to change events");
                    if self.consume(subscription, &cancel).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(topic = %self.topic, error = %e, "subscribe failed");
                }
            }

            tracing::debug!(
                backoff_ms = self.retry_backoff.as_millis(),
                "retrying subscription"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.retry_backoff) => {}
            }
        }
        tracing::info!(topic = %self.topic, "event bridge stopped");
    }

    /// Forwards records until the subscription ends. Returns `true` if it
    /// stopped because of cancellation.
    async fn consume(
        &self,
        mut subscription: Box<dyn EventSubscription>,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return true,
                next = subscription.next() => next,
            };
            match next {
                Ok(Some(raw)) => {
                    self.forward(&raw).await;
                }
                Ok(None) => {
                    tracing::warn!(topic = %self.topic, "upstream closed the subscription");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(topic = %self.topic, error = %e, "subscription failed");
                    return false;
                }
            }
        }
    }

    async fn forward(&self, raw: &RawEvent) -> Option<BroadcastReport> {
        let event = match DomainEvent::decode(&raw.value) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(key = %raw.key, error = %e, "skipping malformed event");
                return None;
            }
        };
        let msg_type = event.kind.broadcast_type();
        let report = self.hub.broadcast(msg_type, event.payload).await;
        tracing::debug!(
            kind = event.kind.as_str(),
            msg_type,
            delivered = report.delivered,
            "event forwarded"
        );
        Some(report)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::{EventBus, Publisher, UserEventKind};
    use crate::error::GatewayError;
    use crate::ws::hub::tests::test_hub;
    use crate::ws::{OutboundMessage, SessionHandle};

    /// Fails the first `failures` subscriptions, then delegates to the bus.
    #[derive(Debug)]
    struct FlakySource {
        bus: EventBus,
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl EventSource for FlakySource {
        async fn subscribe(&self, topic: &str) -> Result<Box<dyn EventSubscription>, GatewayError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(GatewayError::Transport("broker unreachable".into()));
            }
            self.bus.subscribe(topic).await
        }
    }

    async fn listener(hub: &ConnectionHub) -> mpsc::Receiver<OutboundMessage> {
        let (handle, queue) = SessionHandle::new(16);
        hub.register(handle).await;
        queue
    }

    async fn wait_subscribed(bus: &EventBus, count: usize) {
        while bus.receiver_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn next(queue: &mut mpsc::Receiver<OutboundMessage>) -> OutboundMessage {
        match tokio::time::timeout(Duration::from_secs(5), queue.recv()).await {
            Ok(Some(message)) => message,
            Ok(None) => panic!("session queue closed"),
            Err(_) => panic!("no broadcast arrived"),
        }
    }

    #[tokio::test]
    async fn created_event_becomes_list_update_broadcast() {
        let bus = EventBus::new("users", 16);
        let hub = test_hub();
        let mut queue = listener(&hub).await;
        let cancel = CancellationToken::new();
        let join = EventBridge::new(
            Arc::new(bus.clone()),
            Arc::clone(&hub),
            "users",
            Duration::from_millis(10),
        )
        .spawn(cancel.clone());
        wait_subscribed(&bus, 1).await;

        let payload = json!({"user_id": 1, "email": "ann@x.com"});
        assert!(bus.notify(UserEventKind::UserCreated, payload.clone()).await.is_ok());

        let message = next(&mut queue).await;
        assert_eq!(message.msg_type, "user_list_updated");
        assert_eq!(message.data, Some(payload));

        cancel.cancel();
        assert!(join.await.is_ok());
    }

    #[tokio::test]
    async fn malformed_records_are_skipped() {
        let bus = EventBus::new("users", 16);
        let hub = test_hub();
        let mut queue = listener(&hub).await;
        let cancel = CancellationToken::new();
        let _join = EventBridge::new(
            Arc::new(bus.clone()),
            Arc::clone(&hub),
            "users",
            Duration::from_millis(10),
        )
        .spawn(cancel.clone());
        wait_subscribed(&bus, 1).await;

        bus.publish(RawEvent {
            key: "user_created".into(),
            value: b"{not json".to_vec(),
        });
        bus.publish(RawEvent {
            key: "user_created".into(),
            value: br#"{"type":"user_exploded","payload":{}}"#.to_vec(),
        });
        assert!(bus.notify(UserEventKind::UserDeleted, json!({"user_id": 4})).await.is_ok());

        let message = next(&mut queue).await;
        assert_eq!(message.msg_type, "user_deleted");
        assert_eq!(message.data, Some(json!({"user_id": 4})));
        assert!(queue.try_recv().is_err());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_is_retried_after_failure() {
        let bus = EventBus::new("users", 16);
        let source = Arc::new(FlakySource {
            bus: bus.clone(),
            failures: 2,
            attempts: AtomicUsize::new(0),
        });
        let hub = test_hub();
        let mut queue = listener(&hub).await;
        let cancel = CancellationToken::new();
        let _join = EventBridge::new(
            Arc::clone(&source) as Arc<dyn EventSource>,
            Arc::clone(&hub),
            "users",
            Duration::from_secs(1),
        )
        .spawn(cancel.clone());
        wait_subscribed(&bus, 1).await;
        assert_eq!(source.attempts.load(Ordering::SeqCst), 3);

        assert!(bus.notify(UserEventKind::UserUpdated, json!({"user_id": 2})).await.is_ok());
        assert_eq!(next(&mut queue).await.msg_type, "user_updated");
        cancel.cancel();
    }

    #[tokio::test]
    async fn wrong_topic_keeps_retrying_until_cancelled() {
        let bus = EventBus::new("users", 16);
        let hub = test_hub();
        let cancel = CancellationToken::new();
        let join = EventBridge::new(
            Arc::new(bus),
            hub,
            "orders",
            Duration::from_secs(3600),
        )
        .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let stopped = tokio::time::timeout(Duration::from_secs(1), join).await;
        assert!(matches!(stopped, Ok(Ok(()))), "bridge did not stop during back-off");
    }
}
