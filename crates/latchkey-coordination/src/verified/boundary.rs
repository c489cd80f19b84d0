//! Request boundary checks: locks still held when a request ends, and
//! requests cut short by the event bound.
//!
//! Separate from the order and nesting passes: an unreleased lock may be
//! intended (the broker expires leases), so findings are `Notice` severity.

use std::collections::HashMap;

use latchkey_core::Action;
use latchkey_core::EventCollection;
use latchkey_core::LockKey;
use latchkey_core::Severity;
use latchkey_core::Violation;
use latchkey_core::ViolationKind;

/// Report every key whose last ACQUIRE has no matching RELEASE.
///
/// Each finding points at that ACQUIRE; results are sorted by position.
pub fn check_unreleased(collection: &EventCollection) -> Vec<Violation> {
    let mut held: HashMap<&LockKey, usize> = HashMap::new();

    for (position, event) in collection.iter().enumerate() {
        match event.action() {
            Action::Acquire => {
                held.insert(event.key(), position);
            }
            Action::Release => {
                held.remove(event.key());
            }
            Action::Get | Action::Unknown => {}
        }
    }

    let mut positions: Vec<usize> = held.into_values().collect();
    positions.sort_unstable();
    positions
        .into_iter()
        .filter_map(|position| {
            collection
                .get(position)
                .map(|event| Violation::located(position, event, ViolationKind::Unreleased, Severity::Notice))
        })
        .collect()
}

/// Report a request whose events were cut at the collection bound.
///
/// The finding points at the last analysed event.
pub fn check_truncated(collection: &EventCollection) -> Option<Violation> {
    let dropped = collection.dropped();
    if dropped == 0 {
        return None;
    }
    let position = collection.len().checked_sub(1)?;
    let event = collection.get(position)?;
    Some(Violation::located(position, event, ViolationKind::Truncated { dropped }, Severity::Notice))
}
