use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier as it travels on the wire. The API types ids as GraphQL `Int`
/// but some deployments hand out opaque strings, so both are accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Text(String),
}

impl From<RawId> for String {
    fn from(value: RawId) -> Self {
        match value {
            RawId::Int(value) => value.to_string(),
            RawId::Text(value) => value,
        }
    }
}

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value.to_string())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self.0.parse::<i64>() {
                    Ok(numeric) if numeric.to_string() == self.0 => {
                        serializer.serialize_i64(numeric)
                    }
                    _ => serializer.serialize_str(&self.0),
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into()))
            }
        }
    };
}

id_newtype!(HotelId);
id_newtype!(UserId);
id_newtype!(
    /// Room type of a hotel. Catalog reads accept opaque string ids, but the
    /// `saveHotelReservation` mutation declares its ids as `Int`, so only
    /// numeric ids can be booked; a string id is refused by the server.
    RoomTypeId
);
id_newtype!(ReservationId);

/// Which end of a stay a calendar pick applies to. Range pickers report the
/// two anchors as separate events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateAnchor {
    StartDate,
    EndDate,
}

impl DateAnchor {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "START" | "START_DATE" => Some(Self::StartDate),
            "END" | "END_DATE" => Some(Self::EndDate),
            _ => None,
        }
    }
}
