use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned, ser::Error as _};

use crate::AggregateId;

/// Sequence number of an event within its aggregate's stream.
///
/// Version 0 means "no events yet". The first event of an aggregate carries
/// version 1 and every further event increments it by exactly one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a new aggregate.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the version reached after `count` more events.
    pub fn advance(&self, count: usize) -> Self {
        Self(self.0 + count as i64)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// One entry of the event log.
///
/// The payload holds the event body only; `event_type` names which variant it
/// belongs to. Together they form the `(event_type, payload)` pair carried on
/// the wire and stored in the `events` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// Position of the event in its aggregate's stream, starting at 1.
    pub version: Version,

    /// The type of the event (e.g., "TabOpened", "DrinksServed").
    pub event_type: String,

    /// The event body as JSON.
    pub payload: serde_json::Value,

    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Creates an envelope from a raw payload, stamped with the current time.
    pub fn new(
        aggregate_id: AggregateId,
        version: Version,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_id,
            version,
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Wraps a typed event.
    ///
    /// Event enums are expected to serialize adjacently tagged, as
    /// `{"type": <name>, "data": <body>}`. The tag becomes `event_type` and the
    /// body becomes the payload.
    pub fn encode<E: Serialize>(
        aggregate_id: AggregateId,
        version: Version,
        event: &E,
    ) -> Result<Self, serde_json::Error> {
        let serde_json::Value::Object(mut tagged) = serde_json::to_value(event)? else {
            return Err(serde_json::Error::custom(
                "event must serialize as a tagged object",
            ));
        };

        let event_type = match tagged.remove("type") {
            Some(serde_json::Value::String(name)) => name,
            _ => {
                return Err(serde_json::Error::custom(
                    "event is missing its \"type\" tag",
                ));
            }
        };
        let payload = tagged.remove("data").unwrap_or(serde_json::Value::Null);

        Ok(Self::new(aggregate_id, version, event_type, payload))
    }

    /// Turns the envelope back into a typed event.
    ///
    /// Fails when `event_type` names no known variant or the payload does not
    /// match that variant's shape.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        let mut tagged = serde_json::Map::new();
        tagged.insert(
            "type".to_string(),
            serde_json::Value::String(self.event_type.clone()),
        );
        if !self.payload.is_null() {
            tagged.insert("data".to_string(), self.payload.clone());
        }
        serde_json::from_value(serde_json::Value::Object(tagged))
    }
}
