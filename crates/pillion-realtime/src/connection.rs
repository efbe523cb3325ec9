//! The connection state machine and the actor task that drives it.
//!
//! One [`ConnectionActor`] task owns everything mutable about the
//! connection: the state, the live transport link, the attempt counter,
//! and the reconnect timer. Callers talk to it exclusively through the
//! command queue, so state transitions, timer firings, and inbound-frame
//! dispatch are serialized: there is no interleaving between "the
//! reconnect timer fired" and "the user called disconnect".

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pillion_core::events::{ClientMessage, GeoPoint, InboundEvent, ServerEvent, decode_frame};
use pillion_core::ids::RideId;

use crate::config::RealtimeConfig;
use crate::credentials::CredentialProvider;
use crate::handlers::HandlerRegistry;
use crate::policy::ReconnectPolicy;
use crate::subscriptions::SubscriptionSet;
use crate::transport::{Transport, TransportEvent, TransportStreams};

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of the realtime connection.
///
/// `Failed` is terminal under automatic control: the client stays there
/// until a manual `connect()` starts a fresh connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none wanted.
    Disconnected,
    /// An open attempt is in flight.
    Connecting,
    /// The link is up; frames flow.
    Connected,
    /// The link dropped; a retry is scheduled.
    Reconnecting,
    /// Retries are exhausted; awaiting a manual connect.
    Failed,
}

impl ConnectionState {
    /// Whether outbound sends are currently honored.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// What callers can ask the actor to do.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    Subscribe(RideId),
    Unsubscribe(RideId),
    SendLocation { ride_id: RideId, point: GeoPoint },
    SendEmergency { ride_id: RideId, point: GeoPoint },
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

/// A live transport link plus per-connection handshake bookkeeping.
struct ActiveLink {
    streams: TransportStreams,
    handshake_acked: bool,
}

/// The single owner of connection state. Runs until the command channel
/// closes (the client handle was dropped).
pub(crate) struct ConnectionActor {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    policy: Box<dyn ReconnectPolicy>,
    config: RealtimeConfig,
    handlers: Arc<HandlerRegistry>,
    subscriptions: Arc<RwLock<SubscriptionSet>>,
    commands: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    attempts: Arc<AtomicU32>,
    conn_id: String,
    token: Option<String>,
    link: Option<ActiveLink>,
    reconnect_at: Option<Instant>,
}

impl ConnectionActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        policy: Box<dyn ReconnectPolicy>,
        config: RealtimeConfig,
        handlers: Arc<HandlerRegistry>,
        subscriptions: Arc<RwLock<SubscriptionSet>>,
        commands: mpsc::Receiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
        attempts: Arc<AtomicU32>,
    ) -> Self {
        Self {
            transport,
            credentials,
            policy,
            config,
            handlers,
            subscriptions,
            commands,
            state_tx,
            attempts,
            conn_id: Uuid::now_v7().to_string(),
            token: None,
            link: None,
            reconnect_at: None,
        }
    }

    /// The serialized event loop.
    pub(crate) async fn run(mut self) {
        loop {
            let has_link = self.link.is_some();
            let deadline = self.reconnect_at;
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        // All client handles are gone; shut down.
                        None => break,
                    }
                }
                event = Self::next_transport_event(self.link.as_mut()), if has_link => {
                    match event {
                        Some(TransportEvent::Message(text)) => self.handle_frame(&text),
                        Some(TransportEvent::Closed { reason }) => self.handle_closed(reason),
                        None => self.handle_closed(None),
                    }
                }
                () = Self::sleep_until(deadline), if deadline.is_some() => {
                    self.reconnect_at = None;
                    self.open_link().await;
                }
            }
        }
        self.drop_link();
        debug!(conn_id = %self.conn_id, "connection actor stopped");
    }

    async fn next_transport_event(link: Option<&mut ActiveLink>) -> Option<TransportEvent> {
        match link {
            Some(link) => link.streams.inbound.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn sleep_until(deadline: Option<Instant>) {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }

    // -- command handling --

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.handle_connect().await,
            Command::Disconnect => self.handle_disconnect(),
            Command::Subscribe(ride_id) => {
                let added = self.subscriptions.write().insert(ride_id.clone());
                if added {
                    debug!(conn_id = %self.conn_id, ride_id = %ride_id, "subscription added");
                }
                // Send regardless of `added`: duplicates are acceptable to
                // the server, and the set itself never double-stores.
                if self.state().is_connected() {
                    self.send_message(&ClientMessage::SubscribeRide { ride_id });
                }
            }
            Command::Unsubscribe(ride_id) => {
                let removed = self.subscriptions.write().remove(&ride_id);
                if removed {
                    debug!(conn_id = %self.conn_id, ride_id = %ride_id, "subscription removed");
                }
                if self.state().is_connected() {
                    self.send_message(&ClientMessage::UnsubscribeRide { ride_id });
                }
            }
            Command::SendLocation { ride_id, point } => {
                self.send_if_connected(ClientMessage::LocationUpdate {
                    ride_id,
                    location: point.stamped(Utc::now()),
                });
            }
            Command::SendEmergency { ride_id, point } => {
                self.send_if_connected(ClientMessage::EmergencyAlert {
                    ride_id,
                    location: point.stamped(Utc::now()),
                });
            }
        }
    }

    async fn handle_connect(&mut self) {
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!(conn_id = %self.conn_id, "connect ignored, already active");
                return;
            }
            ConnectionState::Disconnected
            | ConnectionState::Reconnecting
            | ConnectionState::Failed => {}
        }

        // Fresh connection: new identity, counter reset, pending retry
        // cancelled. Subscriptions carry over untouched.
        self.reconnect_at = None;
        self.attempts.store(0, Ordering::Relaxed);
        self.conn_id = Uuid::now_v7().to_string();
        self.drop_link();
        self.set_state(ConnectionState::Connecting);

        match self.credentials.bearer_token().await {
            Ok(token) => {
                self.token = Some(token);
                self.open_link().await;
            }
            Err(error) => {
                // Without a token there is nothing to retry with: retries
                // reuse the credential fetched at connect time.
                warn!(conn_id = %self.conn_id, %error, "credential lookup failed");
                self.set_state(ConnectionState::Failed);
            }
        }
    }

    fn handle_disconnect(&mut self) {
        // Cancel any pending retry so no stray attempt fires later.
        self.reconnect_at = None;
        self.drop_link();
        self.token = None;
        self.attempts.store(0, Ordering::Relaxed);
        self.set_state(ConnectionState::Disconnected);
        info!(conn_id = %self.conn_id, reason = "client requested", "disconnected");
        // Subscriptions are preserved: a later connect replays them all.
    }

    // -- link lifecycle --

    async fn open_link(&mut self) {
        self.set_state(ConnectionState::Connecting);
        let Some(token) = self.token.clone() else {
            // Only reachable if a retry fires after disconnect cleared the
            // token, which cancellation prevents. Treat as terminal.
            warn!(conn_id = %self.conn_id, "no credential held, abandoning connect");
            self.set_state(ConnectionState::Failed);
            return;
        };

        let url = self.config.ws_url(&token);
        let attempt = self.attempts.load(Ordering::Relaxed) + 1;
        info!(conn_id = %self.conn_id, attempt, "connect attempt");

        let timeout = Duration::from_millis(self.config.handshake_timeout_ms);
        match tokio::time::timeout(timeout, self.transport.open(&url)).await {
            Ok(Ok(streams)) => {
                self.link = Some(ActiveLink {
                    streams,
                    handshake_acked: false,
                });
                // A successful open ends the failure streak: the policy is
                // consulted with consecutive failures only.
                self.attempts.store(0, Ordering::Relaxed);
                self.set_state(ConnectionState::Connected);
                info!(conn_id = %self.conn_id, attempt, "connected");
                self.replay_subscriptions();
            }
            Ok(Err(error)) => {
                warn!(conn_id = %self.conn_id, attempt, %error, "open failed");
                self.schedule_reconnect();
            }
            Err(_elapsed) => {
                warn!(
                    conn_id = %self.conn_id,
                    attempt,
                    timeout_ms = self.config.handshake_timeout_ms,
                    "handshake timed out"
                );
                self.schedule_reconnect();
            }
        }
    }

    fn handle_closed(&mut self, reason: Option<String>) {
        self.drop_link();
        info!(
            conn_id = %self.conn_id,
            reason = reason.as_deref().unwrap_or("connection closed"),
            "disconnected"
        );
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        match self.policy.next_delay(attempt) {
            Some(delay) => {
                self.set_state(ConnectionState::Reconnecting);
                self.reconnect_at = Some(Instant::now() + delay);
                info!(
                    conn_id = %self.conn_id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "reconnect scheduled"
                );
            }
            None => {
                self.set_state(ConnectionState::Failed);
                warn!(conn_id = %self.conn_id, attempts = attempt, "reconnect attempts exhausted");
            }
        }
    }

    fn drop_link(&mut self) {
        // Dropping the streams closes the connection (the write pump sends
        // a Close frame on the way out).
        self.link = None;
    }

    // -- outbound --

    fn replay_subscriptions(&mut self) {
        let topics = self.subscriptions.read().snapshot();
        if topics.is_empty() {
            return;
        }
        debug!(conn_id = %self.conn_id, count = topics.len(), "replaying subscriptions");
        for ride_id in topics {
            self.send_message(&ClientMessage::SubscribeRide { ride_id });
        }
    }

    fn send_if_connected(&mut self, message: ClientMessage) {
        if self.state().is_connected() && self.link.is_some() {
            self.send_message(&message);
        } else {
            // Documented drop: callers needing delivery guarantees must
            // check connection status or retry at a higher layer.
            debug!(
                conn_id = %self.conn_id,
                state = %self.state(),
                "not connected, dropping outbound frame"
            );
        }
    }

    fn send_message(&mut self, message: &ClientMessage) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        let Some(json) = message.encode() else {
            return;
        };
        if let Err(error) = link.streams.outbound.try_send(json) {
            warn!(conn_id = %self.conn_id, %error, "failed to queue outbound frame");
        }
    }

    // -- inbound --

    fn handle_frame(&mut self, text: &str) {
        let event = match decode_frame(text) {
            Ok(event) => event,
            Err(error) => {
                // Size only: frames can carry rider locations.
                warn!(
                    conn_id = %self.conn_id,
                    payload_bytes = text.len(),
                    %error,
                    "dropped undecodable frame"
                );
                return;
            }
        };

        if let InboundEvent::Event(server_event) = &event {
            match server_event {
                ServerEvent::ConnectionEstablished => {
                    if let Some(link) = self.link.as_mut() {
                        if !link.handshake_acked {
                            link.handshake_acked = true;
                            debug!(conn_id = %self.conn_id, "handshake acknowledged");
                        }
                    }
                }
                ServerEvent::Error { message } => {
                    warn!(conn_id = %self.conn_id, message = %message, "server reported error");
                }
                _ => {}
            }
        }

        self.handlers.dispatch(&event);
    }

    // -- state --

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(conn_id = %self.conn_id, state = %state, "state changed");
        }
    }
}
