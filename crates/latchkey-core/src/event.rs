//! Profiling events and request-scoped event collections.
//!
//! A [`ProfileEvent`] is created once per lock operation and never mutated.
//! Events sharing a [`RequestIdentity`] are grouped into an
//! [`EventCollection`] whose insertion order is the order the validators walk.

use std::fmt;
use std::panic::Location;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::MAX_EVENTS_PER_REQUEST;
use crate::error::CollectionError;
use crate::types::Action;
use crate::types::LockKey;

/// Source location of the code that issued a lock operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    /// Source file path.
    pub file: String,
    /// Line number (1-based).
    pub line: u32,
    /// Column number (1-based).
    pub column: u32,
    /// Enclosing module or type, when the caller supplies it.
    pub module: Option<String>,
    /// Enclosing function, when the caller supplies it.
    pub function: Option<String>,
}

impl CallSite {
    /// Call site of the function calling this one.
    ///
    /// Propagates through other `#[track_caller]` functions, so a lock
    /// method marked `#[track_caller]` records the line in user code.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(Location::caller())
    }

    /// Build from a compiler-provided location.
    pub fn from_location(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
            module: None,
            function: None,
        }
    }

    /// Attach the enclosing module path (typically `module_path!()`).
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Attach the enclosing function name.
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.module, &self.function) {
            (Some(m), Some(func)) => write!(f, "{m}::{func} ({}:{})", self.file, self.line),
            (None, Some(func)) => write!(f, "{func} ({}:{})", self.file, self.line),
            (Some(m), None) => write!(f, "{m} ({}:{})", self.file, self.line),
            (None, None) => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// Deterministic grouping key for one logical execution.
///
/// Derived from the entry URI and the instant the request started, so every
/// event with the same identity also shares the same entry URI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestIdentity(String);

impl RequestIdentity {
    /// Derive the identity for a request entered at `request_uri` at `initiated_at`.
    pub fn derive(request_uri: &str, initiated_at: DateTime<Utc>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(request_uri.as_bytes());
        hasher.update(&[0u8]);
        hasher.update(&initiated_at.timestamp_millis().to_le_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex.as_str()[..32].to_string())
    }

    /// Wrap an identity read back from storage.
    pub fn from_string(identity: String) -> Self {
        Self(identity)
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recorded lock operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEvent {
    request_uri: String,
    request_identity: RequestIdentity,
    call_site: CallSite,
    key: LockKey,
    action: Action,
    response: serde_json::Value,
    timestamp: DateTime<Utc>,
    raw_call_stack: Option<String>,
}

impl ProfileEvent {
    /// Record a lock operation.
    pub fn new(
        request_uri: impl Into<String>,
        request_identity: RequestIdentity,
        call_site: CallSite,
        key: LockKey,
        action: Action,
        response: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            request_uri: request_uri.into(),
            request_identity,
            call_site,
            key,
            action,
            response,
            timestamp,
            raw_call_stack: None,
        }
    }

    /// Attach a rendered backtrace captured at the call site.
    pub fn with_raw_call_stack(mut self, stack: String) -> Self {
        self.raw_call_stack = Some(stack);
        self
    }

    /// Entry URI of the request that issued the operation.
    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    /// Identity of the request that issued the operation.
    pub fn request_identity(&self) -> &RequestIdentity {
        &self.request_identity
    }

    /// Where the operation was issued.
    pub fn call_site(&self) -> &CallSite {
        &self.call_site
    }

    /// Lock key.
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Operation kind.
    pub fn action(&self) -> Action {
        self.action
    }

    /// Broker response to the operation.
    pub fn response(&self) -> &serde_json::Value {
        &self.response
    }

    /// When the operation was recorded.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Backtrace captured at record time, if enabled.
    pub fn raw_call_stack(&self) -> Option<&str> {
        self.raw_call_stack.as_deref()
    }

    /// Stable digest of the event's identifying fields.
    pub fn digest(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        self.feed(&mut hasher);
        hasher.finalize()
    }

    fn feed(&self, hasher: &mut blake3::Hasher) {
        hasher.update(self.request_identity.as_str().as_bytes());
        hasher.update(self.call_site.file.as_bytes());
        hasher.update(&self.call_site.line.to_le_bytes());
        hasher.update(self.key.as_str().as_bytes());
        hasher.update(self.action.as_str().as_bytes());
        hasher.update(self.response.to_string().as_bytes());
        hasher.update(&self.timestamp.timestamp_micros().to_le_bytes());
    }
}

/// Ordered events of a single request.
///
/// Insertion order is authoritative; nothing re-sorts by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCollection {
    request_identity: RequestIdentity,
    events: Vec<ProfileEvent>,
    /// Events refused after the collection reached its bound.
    #[serde(default)]
    dropped: usize,
}

impl EventCollection {
    /// Create an empty collection for one request.
    pub fn new(request_identity: RequestIdentity) -> Self {
        Self {
            request_identity,
            events: Vec::new(),
            dropped: 0,
        }
    }

    /// Append an event, bounded by [`MAX_EVENTS_PER_REQUEST`].
    ///
    /// Fails with [`CollectionError::IdentityMismatch`] if the event belongs to
    /// another request. The collection is left unchanged on failure.
    pub fn append(&mut self, event: ProfileEvent) -> Result<&mut Self, CollectionError> {
        self.append_bounded(event, MAX_EVENTS_PER_REQUEST)
    }

    /// Append an event, failing with [`CollectionError::CapacityExceeded`]
    /// once the collection holds `max` events.
    pub fn append_bounded(&mut self, event: ProfileEvent, max: usize) -> Result<&mut Self, CollectionError> {
        if event.request_identity() != &self.request_identity {
            return Err(CollectionError::IdentityMismatch {
                expected: self.request_identity.to_string(),
                actual: event.request_identity().to_string(),
            });
        }
        if self.events.len() >= max {
            return Err(CollectionError::CapacityExceeded {
                identity: self.request_identity.to_string(),
                max,
            });
        }
        self.events.push(event);
        Ok(self)
    }

    /// Count one event refused for capacity.
    pub fn note_dropped(&mut self) {
        self.dropped = self.dropped.saturating_add(1);
    }

    /// Number of events refused for capacity; they are not analysed.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Identity shared by every event.
    pub fn request_identity(&self) -> &RequestIdentity {
        &self.request_identity
    }

    /// Entry URI, taken from the first event.
    pub fn request_uri(&self) -> Result<&str, CollectionError> {
        self.events.first().map(ProfileEvent::request_uri).ok_or_else(|| CollectionError::Empty {
            identity: self.request_identity.to_string(),
        })
    }

    /// Events in insertion order.
    pub fn events(&self) -> &[ProfileEvent] {
        &self.events
    }

    /// Event at a position.
    pub fn get(&self, position: usize) -> Option<&ProfileEvent> {
        self.events.get(position)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, ProfileEvent> {
        self.events.iter()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the collection holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Distinct keys in order of first appearance.
    pub fn keys(&self) -> Vec<&LockKey> {
        let mut keys: Vec<&LockKey> = Vec::new();
        for event in &self.events {
            if !keys.contains(&event.key()) {
                keys.push(event.key());
            }
        }
        keys
    }

    /// Stable digest over every event in order, hex-encoded.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.request_identity.as_str().as_bytes());
        for event in &self.events {
            event.feed(&mut hasher);
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl<'a> IntoIterator for &'a EventCollection {
    type Item = &'a ProfileEvent;
    type IntoIter = std::slice::Iter<'a, ProfileEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
