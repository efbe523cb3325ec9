//! # pillion-realtime
//!
//! Reconnecting WebSocket event client for PILLION ride updates.
//!
//! The [`RealtimeClient`] maintains one persistent connection to the ride
//! server, recovers automatically from transient failures, tracks the set
//! of rides being watched, and routes inbound events to registered
//! handlers while emitting outbound frames (location pings, emergency
//! alerts, subscribe/unsubscribe requests).
//!
//! Guarantees:
//!
//! - The subscription set is the source of truth for "what should be
//!   subscribed" and is replayed in full, in insertion order, after every
//!   successful (re)connect.
//! - All state transitions, reconnect timers, and handler dispatch run on
//!   one serialized actor task; callers hand work in through a queue.
//! - A failing handler never affects its siblings or the connection.
//! - Undecodable frames are dropped and logged, never fatal.
//! - Outbound sends while not connected are a documented drop, not an
//!   error.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pillion_realtime::{RealtimeClient, RealtimeConfig, StaticToken};
//!
//! # async fn demo() {
//! let client = RealtimeClient::new(
//!     RealtimeConfig::default(),
//!     Arc::new(StaticToken::new("bearer-token")),
//! );
//! let _watch = client.on("ride_status_update", |event| {
//!     println!("ride update: {event:?}");
//!     Ok(())
//! });
//! client.subscribe("42");
//! client.connect();
//! # }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod handlers;
pub mod policy;
pub mod subscriptions;
pub mod transport;

pub use client::{ConnectionStatus, RealtimeClient};
pub use config::RealtimeConfig;
pub use connection::ConnectionState;
pub use credentials::{CredentialError, CredentialProvider, StaticToken};
pub use handlers::{HandlerError, HandlerId};
pub use policy::{ExponentialBackoff, FixedInterval, ReconnectPolicy};
pub use transport::{Transport, TransportError, TransportEvent, TransportStreams, WsTransport};
