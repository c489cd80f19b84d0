//! Shared types for lock operations.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::MAX_LOCK_KEY_SIZE;

/// Name of a lock on the remote broker.
///
/// Keys are globally unique on the broker and may be reused for several
/// get/acquire/release rounds within one request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockKey(String);

impl LockKey {
    /// Create a lock key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key can be sent to the broker.
    ///
    /// Empty keys and keys above [`MAX_LOCK_KEY_SIZE`] are rejected.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.len() <= MAX_LOCK_KEY_SIZE
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LockKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for LockKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A lock operation recorded by the profiler.
///
/// Actions are ordered only within the life-cycle of a single key:
/// `Get` then `Acquire` then `Release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Obtain a lock pointer.
    Get,
    /// Claim a previously obtained pointer.
    Acquire,
    /// Release an acquired pointer.
    Release,
    /// An action this version does not know; validators skip it.
    #[serde(other)]
    Unknown,
}

impl Action {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Acquire => "acquire",
            Action::Release => "release",
            Action::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long an unacquired pointer stays valid on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockTimeout {
    /// The broker never expires the pointer.
    #[default]
    Never,
    /// The broker expires the pointer after this duration.
    After(Duration),
}

impl LockTimeout {
    /// Timeout in whole microseconds, the broker's unit. `None` means no expiry.
    pub fn as_micros(&self) -> Option<u64> {
        match self {
            LockTimeout::Never => None,
            LockTimeout::After(d) => Some(u64::try_from(d.as_micros()).unwrap_or(u64::MAX)),
        }
    }
}

/// Opaque token returned by the broker for a pending reservation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockPointer(String);

impl LockPointer {
    /// Wrap a broker token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
