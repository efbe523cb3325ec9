//! Wire frame vocabulary for the realtime connection.
//!
//! Frames are UTF-8 text carrying a JSON object with a top-level string
//! `type` field. Two families:
//!
//! - **[`ServerEvent`]**: Inbound frames the server pushes (ride lifecycle,
//!   location pings, emergency alerts, subscription acks).
//! - **[`ClientMessage`]**: Outbound frames the client emits (subscribe /
//!   unsubscribe, location pings, emergency alerts).
//!
//! Both are transient: decoded, dispatched, and dropped. Nothing here is
//! persisted. Unknown extra fields on known frames are ignored so that
//! server-side additions never break older clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::{RideId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Locations
// ─────────────────────────────────────────────────────────────────────────────

/// A coordinate pair supplied by the host application's location provider.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl GeoPoint {
    /// Attach a timestamp, producing the wire form.
    #[must_use]
    pub fn stamped(self, timestamp: DateTime<Utc>) -> GeoLocation {
        GeoLocation {
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp,
        }
    }
}

/// A timestamped coordinate as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// When the fix was taken (ISO-8601 on the wire).
    pub timestamp: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound frames
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatch priority of an inbound event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    /// Regular ride traffic.
    Normal,
    /// Emergency traffic; the integration layer should surface it
    /// immediately and prominently.
    High,
}

/// A frame pushed by the server.
///
/// `ride_data`, `requester`, and `confirmed_riders` are opaque payloads:
/// the client routes them to interested handlers without interpreting them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Handshake acknowledgement sent once after the socket is accepted.
    ConnectionEstablished,

    /// Server-side error report. No client state change.
    Error {
        /// Human-readable description.
        message: String,
    },

    /// A watched ride changed status.
    RideStatusUpdate {
        /// Ride the update is about.
        ride_id: RideId,
        /// New status label (e.g. `"ongoing"`).
        new_status: String,
        /// Full ride snapshot.
        ride_data: Value,
    },

    /// Someone asked to join a hosted ride.
    NewRideRequest {
        /// Ride the request targets.
        ride_id: RideId,
        /// Requester profile data.
        requester: Value,
    },

    /// A ride was confirmed with its final rider list.
    RideConfirmed {
        /// Confirmed ride.
        ride_id: RideId,
        /// Profiles of the confirmed riders.
        confirmed_riders: Vec<Value>,
    },

    /// A participant's live position during an ongoing ride.
    LocationUpdate {
        /// Ride the ping belongs to.
        ride_id: RideId,
        /// Participant that moved.
        user_id: UserId,
        /// Where they are.
        location: GeoLocation,
    },

    /// SOS raised by a ride participant.
    EmergencyAlert {
        /// Ride the alert belongs to.
        ride_id: RideId,
        /// Participant that raised the alert.
        user_id: UserId,
        /// Where it happened.
        location: GeoLocation,
    },

    /// Acknowledgement of a `subscribe_ride` request.
    RideSubscription {
        /// Ride now subscribed.
        ride_id: RideId,
    },

    /// Acknowledgement of an `unsubscribe_ride` request.
    RideUnsubscription {
        /// Ride no longer subscribed.
        ride_id: RideId,
    },
}

impl ServerEvent {
    /// The wire `type` tag of this event.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished => "connection_established",
            Self::Error { .. } => "error",
            Self::RideStatusUpdate { .. } => "ride_status_update",
            Self::NewRideRequest { .. } => "new_ride_request",
            Self::RideConfirmed { .. } => "ride_confirmed",
            Self::LocationUpdate { .. } => "location_update",
            Self::EmergencyAlert { .. } => "emergency_alert",
            Self::RideSubscription { .. } => "ride_subscription",
            Self::RideUnsubscription { .. } => "ride_unsubscription",
        }
    }

    /// Dispatch priority ([`EventPriority::High`] only for emergencies).
    #[must_use]
    pub fn priority(&self) -> EventPriority {
        match self {
            Self::EmergencyAlert { .. } => EventPriority::High,
            _ => EventPriority::Normal,
        }
    }
}

/// Wire tags this client decodes into typed [`ServerEvent`]s.
const KNOWN_TYPES: &[&str] = &[
    "connection_established",
    "error",
    "ride_status_update",
    "new_ride_request",
    "ride_confirmed",
    "location_update",
    "emergency_alert",
    "ride_subscription",
    "ride_unsubscription",
];

/// A decoded inbound frame, ready for handler dispatch.
///
/// Frames with a tag the client does not recognize are still dispatchable
/// to handlers registered for that literal tag; they are never an error.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    /// A recognized, fully typed server event.
    Event(ServerEvent),
    /// A well-formed frame with an unrecognized `type` tag.
    Unrecognized {
        /// The literal tag.
        event_type: String,
        /// The whole frame, untouched.
        payload: Value,
    },
}

impl InboundEvent {
    /// The wire `type` tag, recognized or not.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Event(event) => event.tag(),
            Self::Unrecognized { event_type, .. } => event_type,
        }
    }

    /// Dispatch priority of this frame.
    #[must_use]
    pub fn priority(&self) -> EventPriority {
        match self {
            Self::Event(event) => event.priority(),
            Self::Unrecognized { .. } => EventPriority::Normal,
        }
    }
}

/// Why an inbound frame could not be decoded.
///
/// Every variant is droppable: the connection ignores the frame and
/// reports it through tracing, nothing more.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame was not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame had no top-level string `type` field.
    #[error("frame has no string `type` field")]
    MissingType,

    /// A recognized tag arrived with an invalid payload.
    #[error("invalid `{event_type}` payload: {source}")]
    Payload {
        /// The recognized tag.
        event_type: String,
        /// What serde rejected.
        source: serde_json::Error,
    },
}

/// Decode one text frame into an [`InboundEvent`].
///
/// A recognized `type` with a payload that fails validation (e.g. a missing
/// required field) is an error and the frame must be dropped. An
/// unrecognized `type` on a well-formed frame is not.
pub fn decode_frame(text: &str) -> Result<InboundEvent, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let Some(tag) = value.get("type").and_then(Value::as_str) else {
        return Err(DecodeError::MissingType);
    };

    if KNOWN_TYPES.contains(&tag) {
        let event_type = tag.to_owned();
        match serde_json::from_value::<ServerEvent>(value) {
            Ok(event) => Ok(InboundEvent::Event(event)),
            Err(source) => Err(DecodeError::Payload { event_type, source }),
        }
    } else {
        Ok(InboundEvent::Unrecognized {
            event_type: tag.to_owned(),
            payload: value,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound frames
// ─────────────────────────────────────────────────────────────────────────────

/// A frame the client emits.
///
/// Fire-and-forget: no acknowledgement is tracked. The server injects the
/// sender's `user_id` before fanning location and emergency frames out to
/// other subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving events for a ride.
    SubscribeRide {
        /// Ride to watch.
        ride_id: RideId,
    },

    /// Stop receiving events for a ride.
    UnsubscribeRide {
        /// Ride to stop watching.
        ride_id: RideId,
    },

    /// Share the local rider's position with the ride.
    LocationUpdate {
        /// Ride the ping belongs to.
        ride_id: RideId,
        /// Stamped position.
        location: GeoLocation,
    },

    /// Raise an SOS for the ride.
    EmergencyAlert {
        /// Ride the alert belongs to.
        ride_id: RideId,
        /// Stamped position.
        location: GeoLocation,
    },
}

impl ClientMessage {
    /// Serialize to the wire text form.
    ///
    /// Returns `None` (after tracing the failure) if serialization fails,
    /// so callers drop the frame instead of tearing the connection down.
    #[must_use]
    pub fn encode(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(error) => {
                tracing::warn!(%error, "failed to serialize outbound frame");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        "2026-08-04T10:00:00Z".parse().unwrap()
    }

    // -- decode_frame: recognized types --

    #[test]
    fn decode_connection_established() {
        // The backend attaches message + timestamp; both are ignored.
        let event = decode_frame(
            r#"{"type":"connection_established","message":"Connected to PILLION real-time updates","timestamp":"2026-08-04T10:00:00"}"#,
        )
        .unwrap();
        assert_eq!(event, InboundEvent::Event(ServerEvent::ConnectionEstablished));
        assert_eq!(event.event_type(), "connection_established");
    }

    #[test]
    fn decode_server_error() {
        let event = decode_frame(r#"{"type":"error","message":"Unknown message type: nope"}"#)
            .unwrap();
        let InboundEvent::Event(ServerEvent::Error { message }) = event else {
            panic!("expected error event");
        };
        assert_eq!(message, "Unknown message type: nope");
    }

    #[test]
    fn decode_ride_status_update() {
        let event = decode_frame(
            r#"{"type":"ride_status_update","ride_id":42,"new_status":"ongoing","ride_data":{"origin":"campus"},"timestamp":"2026-08-04T10:00:00"}"#,
        )
        .unwrap();
        let InboundEvent::Event(ServerEvent::RideStatusUpdate {
            ride_id,
            new_status,
            ride_data,
        }) = event
        else {
            panic!("expected ride_status_update");
        };
        // Integer ride ids normalize to strings
        assert_eq!(ride_id, RideId::from("42"));
        assert_eq!(new_status, "ongoing");
        assert_eq!(ride_data["origin"], "campus");
    }

    #[test]
    fn decode_new_ride_request() {
        let event = decode_frame(
            r#"{"type":"new_ride_request","ride_id":"7","requester":{"full_name":"Asha"}}"#,
        )
        .unwrap();
        let InboundEvent::Event(ServerEvent::NewRideRequest { ride_id, requester }) = event else {
            panic!("expected new_ride_request");
        };
        assert_eq!(ride_id.as_str(), "7");
        assert_eq!(requester["full_name"], "Asha");
    }

    #[test]
    fn decode_ride_confirmed() {
        let event = decode_frame(
            r#"{"type":"ride_confirmed","ride_id":7,"confirmed_riders":[{"id":1},{"id":2}]}"#,
        )
        .unwrap();
        let InboundEvent::Event(ServerEvent::RideConfirmed {
            confirmed_riders, ..
        }) = event
        else {
            panic!("expected ride_confirmed");
        };
        assert_eq!(confirmed_riders.len(), 2);
    }

    #[test]
    fn decode_location_update() {
        let event = decode_frame(
            r#"{"type":"location_update","ride_id":7,"user_id":3,"location":{"latitude":12.97,"longitude":77.59,"timestamp":"2026-08-04T10:00:00.000Z"}}"#,
        )
        .unwrap();
        let InboundEvent::Event(ServerEvent::LocationUpdate {
            user_id, location, ..
        }) = event
        else {
            panic!("expected location_update");
        };
        assert_eq!(user_id.as_str(), "3");
        assert!((location.latitude - 12.97).abs() < f64::EPSILON);
        assert_eq!(location.timestamp, ts());
    }

    #[test]
    fn decode_emergency_alert_is_high_priority() {
        let event = decode_frame(
            r#"{"type":"emergency_alert","ride_id":7,"user_id":3,"location":{"latitude":0.0,"longitude":0.0,"timestamp":"2026-08-04T10:00:00Z"},"message":"EMERGENCY: SOS alert triggered"}"#,
        )
        .unwrap();
        assert_eq!(event.priority(), EventPriority::High);
        assert_eq!(event.event_type(), "emergency_alert");
    }

    #[test]
    fn decode_subscription_acks() {
        let sub = decode_frame(r#"{"type":"ride_subscription","ride_id":42,"message":"Subscribed to ride 42 updates"}"#).unwrap();
        assert_eq!(sub.event_type(), "ride_subscription");
        let unsub =
            decode_frame(r#"{"type":"ride_unsubscription","ride_id":42}"#).unwrap();
        assert_eq!(unsub.event_type(), "ride_unsubscription");
    }

    #[test]
    fn non_emergency_events_are_normal_priority() {
        let event = decode_frame(
            r#"{"type":"ride_status_update","ride_id":1,"new_status":"pending","ride_data":{}}"#,
        )
        .unwrap();
        assert_eq!(event.priority(), EventPriority::Normal);
    }

    // -- decode_frame: unrecognized types --

    #[test]
    fn unrecognized_type_is_not_an_error() {
        let event = decode_frame(r#"{"type":"server_maintenance","at":"23:00"}"#).unwrap();
        let InboundEvent::Unrecognized {
            event_type,
            payload,
        } = event
        else {
            panic!("expected unrecognized frame");
        };
        assert_eq!(event_type, "server_maintenance");
        assert_eq!(payload["at"], "23:00");
    }

    #[test]
    fn unrecognized_type_is_normal_priority() {
        let event = decode_frame(r#"{"type":"whatever"}"#).unwrap();
        assert_eq!(event.priority(), EventPriority::Normal);
    }

    // -- decode_frame: failures --

    #[test]
    fn invalid_json_fails() {
        assert!(matches!(
            decode_frame("not json at all"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn missing_type_fails() {
        assert!(matches!(
            decode_frame(r#"{"ride_id":42}"#),
            Err(DecodeError::MissingType)
        ));
    }

    #[test]
    fn non_string_type_fails() {
        assert!(matches!(
            decode_frame(r#"{"type":42}"#),
            Err(DecodeError::MissingType)
        ));
    }

    #[test]
    fn non_object_frame_fails() {
        assert!(matches!(
            decode_frame(r#"[1,2,3]"#),
            Err(DecodeError::MissingType)
        ));
    }

    #[test]
    fn known_type_with_missing_field_fails() {
        // ride_status_update requires new_status
        let err = decode_frame(r#"{"type":"ride_status_update","ride_id":42}"#).unwrap_err();
        let DecodeError::Payload { event_type, .. } = err else {
            panic!("expected payload error");
        };
        assert_eq!(event_type, "ride_status_update");
    }

    #[test]
    fn known_type_with_malformed_location_fails() {
        let err = decode_frame(
            r#"{"type":"location_update","ride_id":1,"user_id":2,"location":{"latitude":"north"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::Payload { .. }));
    }

    // -- ClientMessage --

    #[test]
    fn encode_subscribe_ride() {
        let json = ClientMessage::SubscribeRide {
            ride_id: RideId::from("42"),
        }
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, json!({"type": "subscribe_ride", "ride_id": "42"}));
    }

    #[test]
    fn encode_unsubscribe_ride() {
        let json = ClientMessage::UnsubscribeRide {
            ride_id: RideId::from("42"),
        }
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "unsubscribe_ride");
    }

    #[test]
    fn encode_location_update() {
        let json = ClientMessage::LocationUpdate {
            ride_id: RideId::from("7"),
            location: GeoPoint {
                latitude: 12.97,
                longitude: 77.59,
            }
            .stamped(ts()),
        }
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "location_update");
        assert_eq!(value["ride_id"], "7");
        assert!((value["location"]["latitude"].as_f64().unwrap() - 12.97).abs() < f64::EPSILON);
        assert!(value["location"]["timestamp"].is_string());
    }

    #[test]
    fn encode_emergency_alert() {
        let json = ClientMessage::EmergencyAlert {
            ride_id: RideId::from("7"),
            location: GeoPoint {
                latitude: 1.0,
                longitude: 2.0,
            }
            .stamped(ts()),
        }
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "emergency_alert");
        assert_eq!(value["location"]["longitude"], 2.0);
    }

    // -- GeoPoint --

    #[test]
    fn geo_point_stamped() {
        let location = GeoPoint {
            latitude: -33.87,
            longitude: 151.21,
        }
        .stamped(ts());
        assert!((location.latitude + 33.87).abs() < f64::EPSILON);
        assert_eq!(location.timestamp, ts());
    }

    // -- tags --

    #[test]
    fn tags_match_wire_names() {
        assert_eq!(ServerEvent::ConnectionEstablished.tag(), "connection_established");
        assert_eq!(
            ServerEvent::Error {
                message: String::new()
            }
            .tag(),
            "error"
        );
        assert_eq!(
            ServerEvent::RideSubscription {
                ride_id: RideId::from("1")
            }
            .tag(),
            "ride_subscription"
        );
    }
}
