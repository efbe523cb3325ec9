//! # pillion-core
//!
//! Foundation types for the PILLION realtime client.
//!
//! This crate provides the portable, sync-only vocabulary shared by the
//! realtime client and its host application:
//!
//! - **Branded IDs**: [`RideId`](ids::RideId) and [`UserId`](ids::UserId)
//!   newtypes that deserialize from the wire's mixed string/integer forms
//! - **Wire events**: [`ServerEvent`](events::ServerEvent) inbound frames,
//!   [`ClientMessage`](events::ClientMessage) outbound frames, and
//!   [`decode_frame`](events::decode_frame)
//! - **Reconnect building blocks**: [`ReconnectConfig`](retry::ReconnectConfig)
//!   and the backoff math used by the pluggable reconnect policies
//! - **Logging**: [`init_subscriber`](logging::init_subscriber) for `tracing`
//!   setup
//!
//! Async execution lives in `pillion-realtime`, which has access to tokio.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod logging;
pub mod retry;

pub use events::{
    ClientMessage, DecodeError, EventPriority, GeoLocation, GeoPoint, InboundEvent, ServerEvent,
    decode_frame,
};
pub use ids::{RideId, UserId};
pub use retry::ReconnectConfig;
