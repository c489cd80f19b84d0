//! Validation findings.
//!
//! A violation is data, not an error: validation is a query over recorded
//! events and never interrupts the lock operations it analyses.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::event::CallSite;
use crate::event::ProfileEvent;
use crate::event::RequestIdentity;
use crate::types::LockKey;

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// A second GET before the pointer from the first was acquired.
    DuplicateGet,
    /// ACQUIRE with no pending GET on the key.
    AcquireWithoutGet,
    /// ACQUIRE while the key is already held.
    DuplicateAcquire,
    /// RELEASE with no ACQUIRE on the key.
    ReleaseWithoutAcquire,
    /// RELEASE while locks acquired inside this one are still held.
    CrossedRelease {
        /// Keys acquired after this one and not yet released.
        still_held: Vec<LockKey>,
    },
    /// Acquired and never released before the request ended.
    Unreleased,
    /// The request hit its event bound; later events were not analysed.
    Truncated {
        /// Number of events left out.
        dropped: usize,
    },
}

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Suspicious but possibly intended.
    Notice,
    /// The recorded sequence breaks the locking discipline.
    Warning,
}

/// A located validation finding.
///
/// Refers to the offending event by request identity and position instead of
/// owning it; the call site is copied so the finding stands on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Request whose events contain the finding.
    pub request_identity: RequestIdentity,
    /// Index of the offending event inside the request's collection.
    pub position: usize,
    /// Key of the offending event.
    pub key: LockKey,
    /// Where the offending operation was issued.
    pub call_site: CallSite,
    /// Finding type.
    pub kind: ViolationKind,
    /// Severity.
    pub severity: Severity,
}

impl Violation {
    /// Build a `Warning` violation for the event at `position`.
    pub fn warning(position: usize, event: &ProfileEvent, kind: ViolationKind) -> Self {
        Self::located(position, event, kind, Severity::Warning)
    }

    /// Build a violation for the event at `position`.
    pub fn located(position: usize, event: &ProfileEvent, kind: ViolationKind, severity: Severity) -> Self {
        Self {
            request_identity: event.request_identity().clone(),
            position,
            key: event.key().clone(),
            call_site: event.call_site().clone(),
            kind,
            severity,
        }
    }

    /// Human-readable description.
    pub fn message(&self) -> String {
        let key = &self.key;
        match &self.kind {
            ViolationKind::DuplicateGet => format!("duplicate get of lock pointer for key `{key}`"),
            ViolationKind::AcquireWithoutGet => format!("acquire without get for key `{key}`"),
            ViolationKind::DuplicateAcquire => format!("duplicate acquire for key `{key}`"),
            ViolationKind::ReleaseWithoutAcquire => format!("release without acquire for key `{key}`"),
            ViolationKind::CrossedRelease { still_held } => {
                let held: Vec<&str> = still_held.iter().map(LockKey::as_str).collect();
                format!("cannot release `{key}` while nested locks are still held: {}", held.join(", "))
            }
            ViolationKind::Unreleased => format!("lock `{key}` acquired but never released"),
            ViolationKind::Truncated { dropped } => {
                format!("request stopped at event bound after `{key}`; {dropped} later events not analysed")
            }
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at #{} in request {} ({})", self.message(), self.position, self.request_identity, self.call_site)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::Action;

    #[test]
    fn test_crossed_release_message_lists_held_keys() {
        let event = ProfileEvent::new(
            "/a",
            RequestIdentity::derive("/a", Utc::now()),
            CallSite::caller(),
            LockKey::new("A"),
            Action::Release,
            serde_json::Value::Bool(true),
            Utc::now(),
        );
        let violation = Violation::warning(
            4,
            &event,
            ViolationKind::CrossedRelease {
                still_held: vec![LockKey::new("B"), LockKey::new("C")],
            },
        );
        assert_eq!(violation.message(), "cannot release `A` while nested locks are still held: B, C");
        assert_eq!(violation.severity, Severity::Warning);
        assert_eq!(violation.position, 4);
    }
}
