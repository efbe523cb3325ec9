//! The public realtime client handle.
//!
//! [`RealtimeClient`] is an explicit instance constructed by the host
//! application and passed to whoever needs it; there is no process-wide
//! singleton. Every operation returns immediately: commands are queued to
//! the connection actor and outcomes are observed through state changes
//! and dispatched events, never through return values.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::warn;

use pillion_core::events::{GeoPoint, InboundEvent};
use pillion_core::ids::RideId;

use crate::config::RealtimeConfig;
use crate::connection::{Command, ConnectionActor, ConnectionState};
use crate::credentials::CredentialProvider;
use crate::handlers::{HandlerError, HandlerId, HandlerRegistry};
use crate::policy::{FixedInterval, ReconnectPolicy};
use crate::subscriptions::SubscriptionSet;
use crate::transport::{Transport, WsTransport};

/// Point-in-time snapshot of the connection, for debug surfaces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Consecutive failed open attempts of the current connection.
    pub reconnect_attempts: u32,
    /// Subscribed rides, in insertion order.
    pub subscriptions: Vec<RideId>,
}

/// Handle to the realtime connection.
///
/// Cheap to construct once and share behind an `Arc`. Dropping the last
/// handle closes the command queue; the actor shuts down and closes any
/// live connection.
pub struct RealtimeClient {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    handlers: Arc<HandlerRegistry>,
    subscriptions: Arc<RwLock<SubscriptionSet>>,
    attempts: Arc<AtomicU32>,
    dropped_commands: AtomicU64,
}

impl RealtimeClient {
    /// A client over the production WebSocket transport with the default
    /// fixed-interval reconnect policy.
    ///
    /// Must be called within a tokio runtime: the connection actor is
    /// spawned here.
    #[must_use]
    pub fn new(config: RealtimeConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let transport = Arc::new(WsTransport::new(
            config.outbound_buffer,
            config.inbound_buffer,
        ));
        let policy = Box::new(FixedInterval::from_config(&config.reconnect));
        Self::with_parts(transport, credentials, policy, config)
    }

    /// A client with every seam injected: transport, credentials, and
    /// reconnect policy.
    #[must_use]
    pub fn with_parts(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        policy: Box<dyn ReconnectPolicy>,
        config: RealtimeConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let handlers = Arc::new(HandlerRegistry::new());
        let subscriptions = Arc::new(RwLock::new(SubscriptionSet::new()));
        let attempts = Arc::new(AtomicU32::new(0));

        let actor = ConnectionActor::new(
            transport,
            credentials,
            policy,
            config,
            handlers.clone(),
            subscriptions.clone(),
            command_rx,
            state_tx,
            attempts.clone(),
        );
        let _ = tokio::spawn(actor.run());

        Self {
            commands: command_tx,
            state_rx,
            handlers,
            subscriptions,
            attempts,
            dropped_commands: AtomicU64::new(0),
        }
    }

    // -- lifecycle --

    /// Open the connection using a fresh token from the credential
    /// provider. Idempotent while already connecting or connected; from
    /// `Failed` it starts over with a reset attempt counter.
    pub fn connect(&self) {
        self.send_command(Command::Connect);
    }

    /// Close the connection and cancel any pending reconnect. The
    /// subscription set is preserved, so a later [`connect`](Self::connect)
    /// resubscribes everything.
    pub fn disconnect(&self) {
        self.send_command(Command::Disconnect);
    }

    // -- subscriptions --

    /// Start watching a ride. Takes effect on the wire immediately if
    /// connected, and is replayed after every future (re)connect either
    /// way.
    pub fn subscribe(&self, ride_id: impl Into<RideId>) {
        self.send_command(Command::Subscribe(ride_id.into()));
    }

    /// Stop watching a ride.
    pub fn unsubscribe(&self, ride_id: impl Into<RideId>) {
        self.send_command(Command::Unsubscribe(ride_id.into()));
    }

    // -- outbound sends --

    /// Share the local rider's position with a ride. Timestamped at send.
    ///
    /// Fire-and-forget: while not connected this is a documented no-op,
    /// nothing is queued. Callers needing delivery guarantees must check
    /// [`state`](Self::state) or retry at a higher layer.
    pub fn send_location_update(&self, ride_id: impl Into<RideId>, point: GeoPoint) {
        self.send_command(Command::SendLocation {
            ride_id: ride_id.into(),
            point,
        });
    }

    /// Raise an SOS for a ride. Best-effort, same drop semantics as
    /// [`send_location_update`](Self::send_location_update).
    pub fn send_emergency_alert(&self, ride_id: impl Into<RideId>, point: GeoPoint) {
        self.send_command(Command::SendEmergency {
            ride_id: ride_id.into(),
            point,
        });
    }

    // -- handlers --

    /// Register a handler for an event tag. Handlers run on the
    /// connection's serialized context and must not block it; hand
    /// long-running work off to a task.
    pub fn on<F>(&self, event_type: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&InboundEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers.on(event_type, handler)
    }

    /// Remove one handler registration, leaving others for the same tag
    /// untouched.
    pub fn off(&self, id: HandlerId) -> bool {
        self.handlers.off(id)
    }

    // -- observation --

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A watch receiver for awaiting state changes.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Snapshot of state, attempt counter, and subscriptions.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state(),
            reconnect_attempts: self.attempts.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.read().snapshot(),
        }
    }

    /// Commands dropped because the queue was full or the actor was gone.
    #[must_use]
    pub fn dropped_commands(&self) -> u64 {
        self.dropped_commands.load(Ordering::Relaxed)
    }

    fn send_command(&self, command: Command) {
        if let Err(error) = self.commands.try_send(command) {
            let _ = self.dropped_commands.fetch_add(1, Ordering::Relaxed);
            warn!(%error, "realtime command dropped");
        }
    }
}
