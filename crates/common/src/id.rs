use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use svix_ksuid::{Ksuid, KsuidLike};
use thiserror::Error;

/// Seconds between the Unix epoch and the KSUID epoch (2014-05-13T16:53:20Z).
const EPOCH_OFFSET: i64 = 1_400_000_000;

const ENCODED_LEN: usize = 27;

/// Errors returned when parsing an [`AggregateId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("aggregate id must be {ENCODED_LEN} characters, got {0}")]
    InvalidLength(usize),

    #[error("aggregate id contains non-base62 character {0:?}")]
    InvalidCharacter(char),

    #[error("aggregate id is not a valid KSUID: {0}")]
    Malformed(String),
}

/// Unique identifier for an aggregate instance.
///
/// Wraps a KSUID: a second count since the KSUID epoch followed by sixteen
/// random bytes. Identifiers order by the second they were created in, in
/// both their byte and their base62 text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Ksuid);

impl AggregateId {
    /// Creates a new identifier stamped with the current time.
    pub fn new() -> Self {
        Self(Ksuid::new(None, None))
    }

    /// Creates a new identifier stamped with the given time.
    ///
    /// Times outside the KSUID range are clamped to it.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        let seconds = (timestamp.timestamp() - EPOCH_OFFSET).clamp(0, i64::from(u32::MAX));
        Self(Ksuid::new_raw(seconds as u32, None))
    }

    /// Creates an identifier from its raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(Ksuid::from_bytes(bytes))
    }

    /// Returns the underlying KSUID.
    pub fn as_ksuid(&self) -> Ksuid {
        self.0
    }

    /// Returns the creation time, truncated to the second.
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.0.timestamp_seconds(), 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_base62())
    }
}

impl FromStr for AggregateId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let len = s.chars().count();
        if len != ENCODED_LEN {
            return Err(IdParseError::InvalidLength(len));
        }
        if let Some(bad) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(IdParseError::InvalidCharacter(bad));
        }
        Ksuid::from_base62(s)
            .map(Self)
            .map_err(|err| IdParseError::Malformed(err.to_string()))
    }
}

impl From<Ksuid> for AggregateId {
    fn from(ksuid: Ksuid) -> Self {
        Self(ksuid)
    }
}
