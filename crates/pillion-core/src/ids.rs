//! Branded ID newtypes for type safety.
//!
//! Rides and users are addressed by server-assigned identifiers. The client
//! never mints them, so these are plain newtype wrappers around `String`
//! that exist to prevent passing a user ID where a ride ID is expected.
//!
//! The backend addresses both by integer primary key while clients exchange
//! them as opaque strings, so deserialization accepts either JSON form.
//! Serialization always produces a string.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! wire_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                Self(n.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct IdVisitor;

                impl Visitor<'_> for IdVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str("a string or integer identifier")
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        Ok($name(v.to_owned()))
                    }

                    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                        Ok($name(v))
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                        Ok($name(v.to_string()))
                    }

                    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                        Ok($name(v.to_string()))
                    }
                }

                deserializer.deserialize_any(IdVisitor)
            }
        }
    };
}

wire_id! {
    /// Identifier of a ride, the topic unit for realtime subscriptions.
    RideId
}

wire_id! {
    /// Identifier of a user (rider or host).
    UserId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ride_id_from_str() {
        let id = RideId::from("42");
        assert_eq!(id.as_str(), "42");
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn ride_id_from_u64() {
        let id = RideId::from(42u64);
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn ride_id_into_inner() {
        let id = RideId::from("ride_7");
        assert_eq!(id.into_inner(), "ride_7");
    }

    #[test]
    fn ride_id_deref() {
        let id = RideId::from("abc");
        assert!(id.starts_with("ab"));
    }

    #[test]
    fn ride_id_equality() {
        assert_eq!(RideId::from("1"), RideId::from(1u64));
        assert_ne!(RideId::from("1"), RideId::from("2"));
    }

    #[test]
    fn serialize_as_string() {
        let json = serde_json::to_string(&RideId::from(42u64)).unwrap();
        assert_eq!(json, "\"42\"");
    }

    #[test]
    fn deserialize_from_string() {
        let id: RideId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn deserialize_from_integer() {
        // The backend sends ride ids as JSON integers
        let id: RideId = serde_json::from_str("42").unwrap();
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn deserialize_from_negative_integer() {
        let id: UserId = serde_json::from_str("-3").unwrap();
        assert_eq!(id.as_str(), "-3");
    }

    #[test]
    fn deserialize_rejects_other_types() {
        assert!(serde_json::from_str::<RideId>("true").is_err());
        assert!(serde_json::from_str::<RideId>("[1]").is_err());
        assert!(serde_json::from_str::<RideId>("{}").is_err());
    }

    #[test]
    fn user_id_roundtrip() {
        let id = UserId::from("user_9");
        let json = serde_json::to_string(&id).unwrap();
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn ids_are_distinct_types() {
        // Compile-time check: RideId and UserId do not unify
        fn takes_ride(_: &RideId) {}
        let ride = RideId::from("1");
        takes_ride(&ride);
    }

    #[test]
    fn string_conversion() {
        let id = RideId::from("x");
        let s: String = id.into();
        assert_eq!(s, "x");
    }
}
