//! Per-connection session: inbound pump, outbound pump, heartbeat.
//!
//! A session owns one bidirectional connection. Two cooperating pumps run
//! while it is open:
//!
//! - the inbound pump reads frames, enforces the frame-size ceiling and the
//!   heartbeat read deadline, and hands decoded messages to the hub;
//! - the outbound pump drains the session's bounded queue and writes a
//!   ping every `ping_interval`.
//!
//! Either pump may end the session through [`Session::close`]. Only the
//! first caller performs teardown (hub removal and pump shutdown).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::hub::ConnectionHub;
use super::messages::{InboundMessage, OutboundMessage};
use crate::error::GatewayError;

/// Upper bound on a single frame write.
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Tag used on envelopes that answer an undecodable frame.
const ERROR_TYPE: &str = "error";

/// Unique identity of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Session lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Created, not yet registered.
    Connecting = 0,
    /// Registered and pumping.
    Open = 1,
    /// Teardown started.
    Closing = 2,
    /// Both pumps have exited.
    Closed = 3,
}

impl SessionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Heartbeat, size and queue settings for sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Read deadline; only a pong extends it.
    pub pong_wait: Duration,
    /// Ping cadence, shorter than `pong_wait`.
    pub ping_interval: Duration,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound queue capacity per session.
    pub outbound_capacity: usize,
}

impl SessionConfig {
    /// Builds a config for `pong_wait` with pings at 9/10 of it.
    #[must_use]
    pub fn with_pong_wait(pong_wait: Duration) -> Self {
        Self {
            pong_wait,
            ping_interval: pong_wait.saturating_mul(9) / 10,
            max_message_size: 512,
            outbound_capacity: 256,
        }
    }

    /// Sets the frame-size ceiling.
    #[must_use]
    pub const fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Sets the outbound queue capacity.
    #[must_use]
    pub const fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::with_pong_wait(Duration::from_secs(10))
    }
}

/// Result of a non-blocking delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the outbound pump.
    Delivered,
    /// Queue full; message dropped for this session.
    Full,
    /// Session gone.
    Closed,
}

/// Cloneable reference to a session, held by the hub.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    outbound: mpsc::Sender<OutboundMessage>,
    state: Arc<AtomicU8>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    /// Creates a handle and the receiving end of its outbound queue.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (outbound, queue) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: SessionId::new(),
            outbound,
            state: Arc::new(AtomicU8::new(SessionState::Connecting as u8)),
            shutdown: CancellationToken::new(),
        };
        (handle, queue)
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` once teardown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Queues `message` without waiting.
    pub fn try_deliver(&self, message: OutboundMessage) -> Delivery {
        if self.is_shutdown() {
            return Delivery::Closed;
        }
        match self.outbound.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Queues `message`, waiting for capacity.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the session has shut down.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), GatewayError> {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(GatewayError::Transport("session closed".to_string())),
            sent = self.outbound.send(message) => {
                sent.map_err(|_| GatewayError::Transport("session closed".to_string()))
            }
        }
    }

    /// Asks the session to shut down; its pumps then run teardown.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    fn open(&self) {
        let _ = self.state.compare_exchange(
            SessionState::Connecting as u8,
            SessionState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Moves `Connecting|Open` to `Closing`; `true` only for the caller
    /// that made the transition.
    fn begin_close(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= SessionState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn finish(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::Release);
    }
}

/// A running session bound to its hub.
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    hub: Arc<ConnectionHub>,
}

impl Session {
    /// Registers a new session with `hub` and pumps the connection until
    /// both directions have stopped.
    ///
    /// `sink` and `stream` are the two halves of the connection; any
    /// `Sink<Message>` and `Stream<Item = Result<Message, E>>` pair works.
    pub async fn run<Si, St, E>(
        hub: Arc<ConnectionHub>,
        sink: Si,
        stream: St,
        config: SessionConfig,
    ) -> SessionId
    where
        Si: Sink<Message> + Unpin + Send,
        Si::Error: fmt::Display,
        St: Stream<Item = Result<Message, E>> + Unpin + Send,
        E: fmt::Display,
    {
        let (handle, queue) = SessionHandle::new(config.outbound_capacity);
        let id = handle.id();
        hub.register(handle.clone()).await;
        handle.open();
        tracing::info!(session_id = %id, "session opened");

        let session = Self { handle, hub };
        tokio::join!(
            session.inbound(stream, &config),
            session.outbound(sink, queue, &config),
        );

        session.handle.finish();
        tracing::info!(session_id = %id, "session closed");
        id
    }

    /// Returns the hub-facing handle.
    #[must_use]
    pub const fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Starts teardown.
    ///
    /// The first call unregisters the session and stops both pumps; later
    /// calls do nothing. Returns whether this call performed the teardown.
    pub async fn close(&self, reason: &str) -> bool {
        if !self.handle.begin_close() {
            return false;
        }
        tracing::info!(session_id = %self.handle.id, reason, "closing session");
        self.hub.unregister(self.handle.id).await;
        self.handle.shutdown.cancel();
        true
    }

    async fn inbound<St, E>(&self, mut stream: St, config: &SessionConfig)
    where
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        let mut deadline = Instant::now() + config.pong_wait;
        let reason = loop {
            let frame = tokio::select! {
                biased;
                () = self.handle.shutdown.cancelled() => break "shutdown",
                frame = stream.next() => frame,
                () = tokio::time::sleep_until(deadline) => break "heartbeat timeout",
            };
            let text = match frame {
                None => break "peer disconnected",
                Some(Err(e)) => {
                    tracing::debug!(session_id = %self.handle.id, error = %e, "read failed");
                    break "read error";
                }
                Some(Ok(Message::Pong(_))) => {
                    deadline = Instant::now() + config.pong_wait;
                    continue;
                }
                Some(Ok(Message::Close(_))) => break "peer closed",
                Some(Ok(Message::Ping(_))) => None,
                Some(Ok(Message::Text(text))) => Some(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Some(text),
                    Err(_) => {
                        self.reply_error("binary frame is not valid utf-8");
                        break "malformed frame";
                    }
                },
            };
            if Instant::now() >= deadline {
                break "heartbeat timeout";
            }
            let Some(text) = text else {
                continue;
            };
            if text.len() > config.max_message_size {
                tracing::warn!(
                    session_id = %self.handle.id,
                    size = text.len(),
                    limit = config.max_message_size,
                    "frame exceeds size limit"
                );
                self.reply_error("message too large");
                break "message too large";
            }
            let inbound = match InboundMessage::decode(&text) {
                Ok(inbound) => inbound,
                Err(e) => {
                    self.reply_error(&e.client_message());
                    break "malformed message";
                }
            };
            if let Err(e) = self.hub.dispatch(inbound, &self.handle).await {
                tracing::debug!(session_id = %self.handle.id, error = %e, "dispatch failed");
            }
        };
        self.close(reason).await;
    }

    async fn outbound<Si>(
        &self,
        mut sink: Si,
        mut queue: mpsc::Receiver<OutboundMessage>,
        config: &SessionConfig,
    ) where
        Si: Sink<Message> + Unpin,
        Si::Error: fmt::Display,
    {
        let period = config.ping_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let reason = loop {
            let frame = tokio::select! {
                biased;
                () = self.handle.shutdown.cancelled() => {
                    self.flush(&mut sink, &mut queue).await;
                    let _ = write(&mut sink, Message::Close(None)).await;
                    break "shutdown";
                }
                next = queue.recv() => match next {
                    Some(message) => match message.to_json() {
                        Ok(text) => Message::text(text),
                        Err(e) => {
                            tracing::warn!(session_id = %self.handle.id, error = %e, "dropping unencodable message");
                            continue;
                        }
                    },
                    None => break "outbound queue closed",
                },
                _ = ticker.tick() => Message::Ping(Bytes::new()),
            };
            if let Err(e) = write(&mut sink, frame).await {
                tracing::debug!(session_id = %self.handle.id, error = %e, "write failed");
                break "write failed";
            }
        };
        self.close(reason).await;
    }

    /// Writes whatever is already queued, so replies sent just before
    /// teardown still precede the close frame.
    async fn flush<Si>(&self, sink: &mut Si, queue: &mut mpsc::Receiver<OutboundMessage>)
    where
        Si: Sink<Message> + Unpin,
        Si::Error: fmt::Display,
    {
        while let Ok(message) = queue.try_recv() {
            let Ok(text) = message.to_json() else {
                continue;
            };
            if write(sink, Message::text(text)).await.is_err() {
                return;
            }
        }
    }

    /// Queues an error envelope for a frame that could not be handled.
    fn reply_error(&self, message: &str) {
        let envelope = OutboundMessage::error(ERROR_TYPE, message);
        if self.handle.try_deliver(envelope) != Delivery::Delivered {
            tracing::debug!(session_id = %self.handle.id, "could not queue error reply");
        }
    }
}

/// Writes one frame within [`WRITE_WAIT`].
async fn write<Si>(sink: &mut Si, frame: Message) -> Result<(), String>
where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    match tokio::time::timeout(WRITE_WAIT, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("write timed out".to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::convert::Infallible;
    use std::pin::Pin;

    use super::*;
    use crate::ws::hub::tests::test_hub;
    use crate::ws::messages::Status;

    type TestSink = Pin<Box<dyn Sink<Message, Error = String> + Send>>;
    type TestStream = Pin<Box<dyn Stream<Item = Result<Message, Infallible>> + Send>>;

    /// Remote end of an in-memory connection.
    struct Peer {
        to_session: mpsc::Sender<Message>,
        from_session: mpsc::Receiver<Message>,
    }

    impl Peer {
        async fn send_text(&self, text: &str) {
            assert!(self.to_session.send(Message::text(text.to_owned())).await.is_ok());
        }

        async fn next_frame(&mut self) -> Message {
            let Some(frame) = self.from_session.recv().await else {
                panic!("session hung up");
            };
            frame
        }

        /// Skips pings and decodes the next text frame.
        async fn next_envelope(&mut self) -> OutboundMessage {
            loop {
                match self.next_frame().await {
                    Message::Ping(_) => {}
                    Message::Text(text) => {
                        let Ok(envelope) = serde_json::from_str(text.as_str()) else {
                            panic!("bad envelope: {}", text.as_str());
                        };
                        return envelope;
                    }
                    other => panic!("unexpected frame: {other:?}"),
                }
            }
        }
    }

    fn pipe() -> (TestSink, TestStream, Peer) {
        let (to_session, inbound) = mpsc::channel::<Message>(64);
        let (outbound, from_session) = mpsc::channel::<Message>(64);
        let stream = futures_util::stream::unfold(inbound, |mut rx| async move {
            rx.recv().await.map(|m| (Ok::<_, Infallible>(m), rx))
        });
        let sink = futures_util::sink::unfold(outbound, |tx, m: Message| async move {
            tx.send(m).await.map_err(|e| e.to_string())?;
            Ok::<_, String>(tx)
        });
        (
            Box::pin(sink),
            Box::pin(stream),
            Peer {
                to_session,
                from_session,
            },
        )
    }

    async fn wait_registered(hub: &ConnectionHub) {
        while hub.is_empty().await {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_is_closed_after_pong_wait() {
        let hub = test_hub();
        let (sink, stream, mut peer) = pipe();
        let started = Instant::now();
        let run = tokio::spawn(Session::run(
            Arc::clone(&hub),
            sink,
            stream,
            SessionConfig::default(),
        ));
        wait_registered(&hub).await;

        assert!(matches!(peer.next_frame().await, Message::Ping(_)));
        assert!(matches!(peer.next_frame().await, Message::Close(_)));
        assert!(run.await.is_ok());

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "closed too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(11), "closed too late: {elapsed:?}");
        assert!(hub.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_keep_the_session_alive() {
        let hub = test_hub();
        let (sink, stream, peer) = pipe();
        let run = tokio::spawn(Session::run(
            Arc::clone(&hub),
            sink,
            stream,
            SessionConfig::default(),
        ));
        wait_registered(&hub).await;

        let Peer {
            to_session,
            mut from_session,
        } = peer;
        let responder_tx = to_session.clone();
        let responder = tokio::spawn(async move {
            while let Some(frame) = from_session.recv().await {
                if matches!(frame, Message::Ping(_))
                    && responder_tx.send(Message::Pong(Bytes::new())).await.is_err()
                {
                    break;
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(hub.len().await, 1);

        responder.abort();
        drop(to_session);
        assert!(run.await.is_ok());
        assert!(hub.is_empty().await);
    }

    #[tokio::test]
    async fn oversized_frame_gets_error_then_close() {
        let hub = test_hub();
        let (sink, stream, mut peer) = pipe();
        let run = tokio::spawn(Session::run(
            Arc::clone(&hub),
            sink,
            stream,
            SessionConfig::default(),
        ));
        wait_registered(&hub).await;

        peer.send_text(&"a".repeat(600)).await;
        let envelope = peer.next_envelope().await;
        assert_eq!(envelope.status, Status::Error);
        assert_eq!(envelope.error.as_deref(), Some("message too large"));
        assert!(matches!(peer.next_frame().await, Message::Close(_)));
        assert!(run.await.is_ok());
        assert!(hub.is_empty().await);
    }

    #[tokio::test]
    async fn malformed_json_gets_error_then_close() {
        let hub = test_hub();
        let (sink, stream, mut peer) = pipe();
        let run = tokio::spawn(Session::run(
            Arc::clone(&hub),
            sink,
            stream,
            SessionConfig::default(),
        ));
        wait_registered(&hub).await;

        peer.send_text("{not json").await;
        let envelope = peer.next_envelope().await;
        assert_eq!(envelope.msg_type, "error");
        assert_eq!(envelope.status, Status::Error);
        assert!(matches!(peer.next_frame().await, Message::Close(_)));
        assert!(run.await.is_ok());
    }

    #[tokio::test]
    async fn unknown_type_keeps_session_open() {
        let hub = test_hub();
        let (sink, stream, mut peer) = pipe();
        let _run = tokio::spawn(Session::run(
            Arc::clone(&hub),
            sink,
            stream,
            SessionConfig::default(),
        ));
        wait_registered(&hub).await;

        peer.send_text(r#"{"type":"nope","payload":{}}"#).await;
        let envelope = peer.next_envelope().await;
        assert_eq!(envelope.msg_type, "nope_response");
        assert_eq!(envelope.error.as_deref(), Some("unknown message type: nope"));

        peer.send_text(r#"{"type":"get_users","payload":{}}"#).await;
        let envelope = peer.next_envelope().await;
        assert_eq!(envelope.msg_type, "get_users_response");
        assert_eq!(envelope.status, Status::Success);
        assert_eq!(hub.len().await, 1);
    }

    #[tokio::test]
    async fn peer_close_frame_ends_session() {
        let hub = test_hub();
        let (sink, stream, peer) = pipe();
        let run = tokio::spawn(Session::run(
            Arc::clone(&hub),
            sink,
            stream,
            SessionConfig::default(),
        ));
        wait_registered(&hub).await;

        assert!(peer.to_session.send(Message::Close(None)).await.is_ok());
        let Ok(id) = run.await else {
            panic!("session task failed");
        };
        assert!(!hub.contains(id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_tears_the_session_down_once() {
        let hub = test_hub();
        let (_, stream, peer) = pipe();
        let writes = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let broken: TestSink = Box::pin(futures_util::sink::unfold(
            Arc::clone(&writes),
            |writes, _frame: Message| async move {
                writes.fetch_add(1, Ordering::SeqCst);
                Err::<Arc<std::sync::atomic::AtomicUsize>, String>("broken pipe".to_string())
            },
        ));
        let started = Instant::now();
        let run = tokio::spawn(Session::run(
            Arc::clone(&hub),
            broken,
            stream,
            SessionConfig::default(),
        ));
        wait_registered(&hub).await;
        let handles = hub.handles().await;
        let [handle] = handles.as_slice() else {
            panic!("expected one registered session");
        };
        let handle = handle.clone();

        let Ok(id) = run.await else {
            panic!("session task failed");
        };
        // The first ping is the first write, well before the pong deadline.
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(handle.id(), id);
        assert_eq!(handle.state(), SessionState::Closed);
        assert!(handle.is_shutdown());
        assert!(hub.is_empty().await);
        assert!(!hub.unregister(id).await);

        let session = Session {
            handle,
            hub: Arc::clone(&hub),
        };
        assert!(!session.close("late").await);
        drop(peer);
    }

    #[tokio::test]
    async fn close_is_idempotent_across_callers() {
        let hub = test_hub();
        let (handle, _queue) = SessionHandle::new(4);
        hub.register(handle.clone()).await;
        handle.open();
        let session = Arc::new(Session {
            handle: handle.clone(),
            hub: Arc::clone(&hub),
        });

        let a = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.close("inbound").await }
        });
        let b = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.close("outbound").await }
        });
        let (Ok(a), Ok(b)) = (a.await, b.await) else {
            panic!("close task failed");
        };
        assert!(a ^ b, "exactly one close must win");
        assert!(!session.close("again").await);
        assert!(hub.is_empty().await);
        assert!(handle.is_shutdown());
        assert_eq!(handle.state(), SessionState::Closing);
    }

    #[test]
    fn ping_interval_is_nine_tenths_of_pong_wait() {
        let config = SessionConfig::default();
        assert_eq!(config.pong_wait, Duration::from_secs(10));
        assert_eq!(config.ping_interval, Duration::from_secs(9));
        assert_eq!(config.max_message_size, 512);
    }

    #[test]
    fn delivery_after_shutdown_reports_closed() {
        let (handle, _queue) = SessionHandle::new(1);
        assert_eq!(
            handle.try_deliver(OutboundMessage::success("a", serde_json::Value::Null)),
            Delivery::Delivered
        );
        assert_eq!(
            handle.try_deliver(OutboundMessage::success("b", serde_json::Value::Null)),
            Delivery::Full
        );
        handle.shutdown.cancel();
        assert_eq!(
            handle.try_deliver(OutboundMessage::success("c", serde_json::Value::Null)),
            Delivery::Closed
        );
    }
}
