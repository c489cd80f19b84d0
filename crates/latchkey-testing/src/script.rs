//! Hand-written event sequences for validator tests.

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use latchkey_core::Action;
use latchkey_core::CallSite;
use latchkey_core::EventCollection;
use latchkey_core::LockKey;
use latchkey_core::ProfileEvent;
use latchkey_core::RequestIdentity;

/// Fixed start instant so identities are stable across test runs.
const SCRIPT_EPOCH_MS: i64 = 1_700_000_000_000;

/// Builder for the events of one request.
///
/// Each step records the test line that added it as the event's call site.
#[derive(Debug, Clone)]
pub struct EventScript {
    request_uri: String,
    started_at: DateTime<Utc>,
    identity: RequestIdentity,
    events: Vec<ProfileEvent>,
}

impl EventScript {
    /// Start a script for a request entered at `request_uri`.
    pub fn new(request_uri: &str) -> Self {
        Self::started_at(request_uri, 0)
    }

    /// Start a script whose request began `offset_ms` after the script epoch.
    ///
    /// Scripts with the same URI and offset share a request identity.
    pub fn started_at(request_uri: &str, offset_ms: i64) -> Self {
        let started_at = Utc.timestamp_millis_opt(SCRIPT_EPOCH_MS + offset_ms).single().unwrap_or_else(Utc::now);
        Self {
            request_uri: request_uri.to_string(),
            started_at,
            identity: RequestIdentity::derive(request_uri, started_at),
            events: Vec::new(),
        }
    }

    /// Identity shared by the script's events.
    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    /// Append a GET.
    #[track_caller]
    pub fn get(self, key: &str) -> Self {
        let site = CallSite::caller();
        self.push(site, key, Action::Get, serde_json::Value::String(format!("{key}#pointer")))
    }

    /// Append an ACQUIRE.
    #[track_caller]
    pub fn acquire(self, key: &str) -> Self {
        let site = CallSite::caller();
        self.push(site, key, Action::Acquire, serde_json::Value::Bool(true))
    }

    /// Append a RELEASE.
    #[track_caller]
    pub fn release(self, key: &str) -> Self {
        let site = CallSite::caller();
        self.push(site, key, Action::Release, serde_json::Value::Bool(true))
    }

    /// Append an action this version does not know.
    #[track_caller]
    pub fn unknown(self, key: &str) -> Self {
        let site = CallSite::caller();
        self.push(site, key, Action::Unknown, serde_json::Value::Null)
    }

    /// Append an arbitrary action.
    #[track_caller]
    pub fn action(self, key: &str, action: Action) -> Self {
        let site = CallSite::caller();
        self.push(site, key, action, serde_json::Value::Null)
    }

    fn push(mut self, site: CallSite, key: &str, action: Action, response: serde_json::Value) -> Self {
        // Spread timestamps so stored order and time order agree.
        let timestamp = self.started_at + chrono::Duration::milliseconds(self.events.len() as i64);
        self.events.push(ProfileEvent::new(
            self.request_uri.clone(),
            self.identity.clone(),
            site,
            LockKey::new(key),
            action,
            response,
            timestamp,
        ));
        self
    }

    /// The events in script order.
    pub fn events(self) -> Vec<ProfileEvent> {
        self.events
    }

    /// Collect into a request collection.
    pub fn build(self) -> EventCollection {
        let mut collection = EventCollection::new(self.identity.clone());
        for event in self.events {
            collection.append(event).expect("script events share one identity");
        }
        collection
    }
}
