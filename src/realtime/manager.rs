//! Realtime session manager
//!
//! Owns the physical chat connection and drives its state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected | Error
//! Connected    -> Disconnected | Error
//! Error        -> Connecting (reconnect) | Disconnected (manual stop)
//! ```
//!
//! After an unexpected drop the manager reconnects with a linearly
//! growing delay, up to a bounded number of attempts; past the cap it
//! parks in `Error` until `connect()` is called again. All subscriptions
//! are invalidated by any disconnect; callers re-subscribe explicitly
//! once the channel is back (see DESIGN.md for the policy decision).
//!
//! One io task per connection handles the writer channel, inbound frames,
//! outbound heartbeats and the heartbeat watchdog in a single select
//! loop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::Config;
use crate::error::ClientError;
use crate::realtime::dispatch;
use crate::realtime::message::ChatMessage;
use crate::realtime::stomp::{Command, Frame};
use crate::realtime::subscription::{MessageHandler, SubscriptionMultiplexer};
use crate::realtime::transport::{Connection, InboundEvent, Transport, WsTransport};
use crate::realtime::{APP_PREFIX, TOPIC_PREFIX};
use crate::session::SessionStore;

/// How long to wait for the CONNECTED reply before giving up.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound silence tolerated before the connection counts as dead,
/// in heartbeat intervals.
const HEARTBEAT_GRACE_INTERVALS: u32 = 3;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Why the io loop ended.
enum IoOutcome {
    /// Writer channel closed: explicit disconnect
    Requested,
    /// Peer closed the connection
    PeerClosed,
    /// Transport or protocol failure (includes heartbeat miss)
    Failed(ClientError),
}

struct ManagerInner {
    config: Arc<Config>,
    session: SessionStore,
    transport: Arc<dyn Transport>,
    state: Mutex<ConnectionState>,
    subscriptions: SubscriptionMultiplexer,
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    attempts: AtomicU32,
    auto_reconnect: AtomicBool,
    io_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

impl ManagerInner {
    fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock().expect("state lock poisoned");
        if *state != next {
            tracing::debug!("[Realtime] state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    fn outbound_sender(&self) -> Option<mpsc::UnboundedSender<Frame>> {
        self.outbound.lock().expect("outbound lock poisoned").clone()
    }
}

/// Owns the chat channel: connection state machine, bounded reconnect,
/// heartbeats, and per-room subscriptions over the one connection.
///
/// Cheap to clone; clones share the same connection and registry.
#[derive(Clone)]
pub struct RealtimeSessionManager {
    inner: Arc<ManagerInner>,
}

impl RealtimeSessionManager {
    /// Manager over the production websocket transport.
    pub fn new(config: Config, session: SessionStore) -> Self {
        Self::with_transport(config, session, Arc::new(WsTransport))
    }

    /// Manager over an injected transport (tests, alternative stacks).
    pub fn with_transport(
        config: Config,
        session: SessionStore,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config: Arc::new(config),
                session,
                transport,
                state: Mutex::new(ConnectionState::Disconnected),
                subscriptions: SubscriptionMultiplexer::new(),
                outbound: Mutex::new(None),
                attempts: AtomicU32::new(0),
                auto_reconnect: AtomicBool::new(false),
                io_task: Mutex::new(None),
                reconnect_task: Mutex::new(None),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Room ids with an active subscription.
    pub fn subscribed_rooms(&self) -> Vec<i64> {
        self.inner.subscriptions.rooms()
    }

    /// Open the channel. No-op when already connected.
    ///
    /// Returns the first attempt's outcome; on failure the bounded
    /// reconnect schedule is armed so a transient startup failure heals
    /// the same way a mid-session drop does.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }
        self.inner.auto_reconnect.store(true, Ordering::SeqCst);
        self.inner.attempts.store(0, Ordering::SeqCst);

        // A manual connect supersedes any backoff timer still armed from
        // an earlier failure; left running it would open a second
        // connection over this one.
        let pending = self
            .inner
            .reconnect_task
            .lock()
            .expect("reconnect lock poisoned")
            .take();
        if let Some(handle) = pending {
            handle.abort();
        }

        match Self::establish(self.inner.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                Self::schedule_reconnect(self.inner.clone());
                Err(err)
            }
        }
    }

    /// Tear the channel down. Cancels any pending reconnect, closes the
    /// transport, clears all subscriptions, and stays down until the next
    /// explicit `connect()`.
    pub async fn disconnect(&self) {
        self.inner.auto_reconnect.store(false, Ordering::SeqCst);

        let reconnect = self
            .inner
            .reconnect_task
            .lock()
            .expect("reconnect lock poisoned")
            .take();
        if let Some(handle) = reconnect {
            handle.abort();
        }

        // Best-effort goodbye, then drop the writer; the io task sees the
        // closed channel and winds the connection down.
        if let Some(sender) = self.inner.outbound_sender() {
            let _ = sender.send(Frame::new(Command::Disconnect));
        }
        let outbound = self
            .inner
            .outbound
            .lock()
            .expect("outbound lock poisoned")
            .take();
        drop(outbound);

        let io_task = self
            .inner
            .io_task
            .lock()
            .expect("io task lock poisoned")
            .take();
        if let Some(handle) = io_task {
            let _ = handle.await;
        }

        self.inner.subscriptions.clear();
        self.inner.set_state(ConnectionState::Disconnected);
        tracing::info!("[Realtime] disconnected");
    }

    /// Subscribe to a room's messages. Idempotent: a room that already
    /// has a handler keeps it and no second transport subscription is
    /// issued. Fails fast when the channel is not connected.
    pub fn subscribe_to_room(
        &self,
        room_id: i64,
        handler: MessageHandler,
    ) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let Some(subscription_id) = self.inner.subscriptions.register(room_id, handler) else {
            tracing::debug!("[Realtime] already subscribed to room {}", room_id);
            return Ok(());
        };

        let frame = Frame::new(Command::Subscribe)
            .with_header("id", subscription_id)
            .with_header("destination", format!("{}{}", TOPIC_PREFIX, room_id))
            .with_header("ack", "auto");
        if let Err(err) = self.send_frame(frame) {
            self.inner.subscriptions.remove(room_id);
            return Err(err);
        }
        tracing::info!("[Realtime] subscribed to room {}", room_id);
        Ok(())
    }

    /// Drop a room subscription. No-op when the room is not subscribed.
    pub fn unsubscribe_from_room(&self, room_id: i64) -> Result<(), ClientError> {
        let Some(subscription_id) = self.inner.subscriptions.remove(room_id) else {
            return Ok(());
        };
        // The transport may already be gone; the mapping is dropped either way.
        if self.state() == ConnectionState::Connected {
            let frame = Frame::new(Command::Unsubscribe).with_header("id", subscription_id);
            self.send_frame(frame)?;
        }
        tracing::info!("[Realtime] unsubscribed from room {}", room_id);
        Ok(())
    }

    /// Publish a chat message to a room using the session identity.
    pub fn send_message(&self, room_id: i64, content: &str) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let identity = self
            .inner
            .session
            .identity()
            .ok_or(ClientError::NotAuthenticated)?;
        let message = ChatMessage::new(room_id, &identity, content);
        let frame = Frame::new(Command::Send)
            .with_header("destination", format!("{}{}", APP_PREFIX, room_id))
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&message)?);
        self.send_frame(frame)
    }

    fn send_frame(&self, frame: Frame) -> Result<(), ClientError> {
        let sender = self
            .inner
            .outbound_sender()
            .ok_or(ClientError::NotConnected)?;
        sender.send(frame).map_err(|_| ClientError::ConnectionClosed)
    }

    /// One connection attempt: open the transport, run the STOMP
    /// handshake, and hand the connection to a fresh io task.
    async fn establish(inner: Arc<ManagerInner>) -> Result<(), ClientError> {
        inner.set_state(ConnectionState::Connecting);
        let url = inner.config.ws_url();

        let mut connection = match inner.transport.connect(&url).await {
            Ok(connection) => connection,
            Err(err) => {
                inner.set_state(ConnectionState::Error);
                return Err(err);
            }
        };

        if let Err(err) = Self::handshake(&inner, connection.as_mut()).await {
            connection.close().await;
            inner.set_state(ConnectionState::Error);
            return Err(err);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        *inner.outbound.lock().expect("outbound lock poisoned") = Some(sender);
        inner.set_state(ConnectionState::Connected);
        inner.attempts.store(0, Ordering::SeqCst);
        tracing::info!("[Realtime] connected to {}", url);

        let io_inner = inner.clone();
        let handle = tokio::spawn(Self::run_io(io_inner, connection, receiver));
        *inner.io_task.lock().expect("io task lock poisoned") = Some(handle);
        Ok(())
    }

    async fn handshake(
        inner: &ManagerInner,
        connection: &mut dyn Connection,
    ) -> Result<(), ClientError> {
        let heartbeat_ms = inner.config.heartbeat_interval().as_millis();
        let mut connect = Frame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("heart-beat", format!("{},{}", heartbeat_ms, heartbeat_ms));
        if let Some(token) = inner.session.token() {
            connect = connect.with_header("Authorization", format!("Bearer {}", token));
        }
        connection.send(&connect).await?;

        let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            loop {
                match connection.recv().await {
                    Some(Ok(InboundEvent::Frame(frame))) => return Ok(frame),
                    Some(Ok(InboundEvent::Heartbeat)) => continue,
                    Some(Err(err)) => return Err(err),
                    None => return Err(ClientError::ConnectionClosed),
                }
            }
        })
        .await
        .map_err(|_| ClientError::HandshakeTimeout)??;

        match reply.command() {
            Command::Connected => Ok(()),
            Command::Error => Err(ClientError::protocol(format!(
                "broker rejected connect: {}",
                reply.header("message").unwrap_or("unknown")
            ))),
            other => Err(ClientError::protocol(format!(
                "expected CONNECTED, got {}",
                other
            ))),
        }
    }

    /// The per-connection io loop: writer channel, inbound dispatch,
    /// outbound heartbeats and the inbound-silence watchdog.
    async fn run_io(
        inner: Arc<ManagerInner>,
        mut connection: Box<dyn Connection>,
        mut outbound: mpsc::UnboundedReceiver<Frame>,
    ) {
        let heartbeat = inner.config.heartbeat_interval();
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_inbound = Instant::now();

        let outcome = loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(err) = connection.send(&frame).await {
                            break IoOutcome::Failed(err);
                        }
                    }
                    None => break IoOutcome::Requested,
                },
                event = connection.recv() => match event {
                    Some(Ok(InboundEvent::Heartbeat)) => {
                        last_inbound = Instant::now();
                    }
                    Some(Ok(InboundEvent::Frame(frame))) => {
                        last_inbound = Instant::now();
                        match frame.command() {
                            Command::Message => dispatch::dispatch(&inner.subscriptions, &frame),
                            Command::Error => {
                                break IoOutcome::Failed(ClientError::protocol(format!(
                                    "broker error: {}",
                                    frame.header("message").unwrap_or("unknown")
                                )));
                            }
                            other => {
                                tracing::debug!("[Realtime] ignoring {} frame", other);
                            }
                        }
                    }
                    Some(Err(err)) => break IoOutcome::Failed(err),
                    None => break IoOutcome::PeerClosed,
                },
                _ = ticker.tick() => {
                    if last_inbound.elapsed() > heartbeat * HEARTBEAT_GRACE_INTERVALS {
                        break IoOutcome::Failed(ClientError::transport("heartbeat missed"));
                    }
                    if let Err(err) = connection.send_heartbeat().await {
                        break IoOutcome::Failed(err);
                    }
                }
            }
        };

        connection.close().await;
        inner.subscriptions.clear();
        inner
            .outbound
            .lock()
            .expect("outbound lock poisoned")
            .take();

        match outcome {
            IoOutcome::Requested => {
                inner.set_state(ConnectionState::Disconnected);
            }
            IoOutcome::PeerClosed => {
                tracing::warn!("[Realtime] connection closed by peer");
                inner.set_state(ConnectionState::Disconnected);
                Self::schedule_reconnect(inner);
            }
            IoOutcome::Failed(err) => {
                tracing::warn!("[Realtime] connection failed: {}", err);
                inner.set_state(ConnectionState::Error);
                Self::schedule_reconnect(inner);
            }
        }
    }

    /// Arm the next reconnect attempt, or park in `Error` once the cap is
    /// exhausted. Delay grows linearly with the attempt number, so it is
    /// monotonically non-decreasing.
    fn schedule_reconnect(inner: Arc<ManagerInner>) {
        if !inner.auto_reconnect.load(Ordering::SeqCst) {
            return;
        }
        let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let max_attempts = inner.config.max_reconnect_attempts();
        if attempt > max_attempts {
            tracing::warn!(
                "[Realtime] reconnect attempts exhausted ({}), giving up until connect() is called",
                max_attempts
            );
            inner.set_state(ConnectionState::Error);
            return;
        }

        let delay = inner.config.reconnect_base_delay() * attempt;
        tracing::info!(
            "[Realtime] reconnecting in {:?} (attempt {}/{})",
            delay,
            attempt,
            max_attempts
        );

        let task_inner = inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !task_inner.auto_reconnect.load(Ordering::SeqCst) {
                return;
            }
            // A manual connect may have raced the timer; the channel is
            // already (coming) up, so this attempt is stale.
            match task_inner.state() {
                ConnectionState::Connected | ConnectionState::Connecting => return,
                ConnectionState::Disconnected | ConnectionState::Error => {}
            }
            if let Err(err) = Self::establish(task_inner.clone()).await {
                tracing::warn!("[Realtime] reconnect attempt {} failed: {}", attempt, err);
                Self::schedule_reconnect(task_inner);
            }
        });
        *inner
            .reconnect_task
            .lock()
            .expect("reconnect lock poisoned") = Some(handle);
    }
}
