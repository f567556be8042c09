//! Stable, creation-time-ordered identifiers.
//!
//! Queue ids, message ids, and claim ids all share one concrete shape: a
//! 12-byte value — 4 bytes of seconds-since-epoch, 5 bytes of process-local
//! randomness, 3 bytes of monotonic counter — rendered as a 24-character hex
//! string at the API boundary. This is the same shape (and the same
//! ordering properties) as a MongoDB `ObjectId`, which is what lets message
//! and claim ids be "monotone with creation time" without a separate
//! sequence column.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::clock::ClockSource;

/// A 12-byte, hex-rendered, creation-time-ordered identifier.
///
/// Byte ordering is big-endian on both the timestamp and counter fields, so
/// `Ord` on the raw bytes (and on the hex string) agrees with creation
/// order at one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Id([u8; 12]);

/// Error returned when a string cannot be parsed as an [`Id`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed id: {0:?}")]
pub struct MalformedId(String);

impl Id {
    /// Seconds-since-epoch this id was minted at, extracted from the leading
    /// 4 bytes.
    #[must_use]
    pub fn created_at_secs(&self) -> u64 {
        u64::from(u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]))
    }

    /// Raw 12-byte representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Id {
    type Err = MalformedId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 {
            return Err(MalformedId(s.to_string()));
        }
        let decoded = hex::decode(s).map_err(|_| MalformedId(s.to_string()))?;
        let bytes: [u8; 12] = decoded.try_into().map_err(|_| MalformedId(s.to_string()))?;
        Ok(Id(bytes))
    }
}

impl TryFrom<String> for Id {
    type Error = MalformedId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.to_string()
    }
}

/// Mints [`Id`]s from an injected clock plus a process-local random salt and
/// monotonic counter, mirroring how a MongoDB driver mints `ObjectId`s.
pub struct IdGenerator {
    clock: Arc<dyn ClockSource>,
    process_unique: [u8; 5],
    counter: AtomicU32,
}

impl IdGenerator {
    /// Creates a generator backed by the given clock, seeding its
    /// process-unique salt and starting counter from the OS RNG.
    #[must_use]
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        let mut rng = rand::rng();
        let mut process_unique = [0u8; 5];
        rng.fill_bytes(&mut process_unique);
        Self {
            clock,
            process_unique,
            counter: AtomicU32::new(rng.next_u32() & 0x00FF_FFFF),
        }
    }

    /// Mints a new, strictly-increasing-per-process [`Id`].
    pub fn generate(&self) -> Id {
        let secs = self.clock.now_secs() as u32;
        let counter = self.counter.fetch_add(1, AtomicOrdering::Relaxed) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&self.process_unique);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        Id(bytes)
    }
}
