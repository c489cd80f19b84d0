//! Per-key life-cycle order.
//!
//! Within one request, each key must follow GET → ACQUIRE → RELEASE, and may
//! repeat that round any number of times. Keys are checked independently.
//!
//! All violations are reported, at most one per key: the first violation in
//! a key's sub-sequence halts that key, while other keys keep being checked.

use std::collections::HashMap;

use latchkey_core::Action;
use latchkey_core::EventCollection;
use latchkey_core::LockKey;
use latchkey_core::Violation;
use latchkey_core::ViolationKind;

/// Sequencing state of a single key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyOrderState {
    /// A GET is pending acquisition.
    pub was_get: bool,
    /// The key is currently acquired.
    pub was_acquired: bool,
}

/// Advance a key's state by one action.
///
/// Unknown actions leave the state unchanged.
#[inline]
pub fn next_key_order_state(state: KeyOrderState, action: Action) -> Result<KeyOrderState, ViolationKind> {
    match action {
        Action::Get => {
            if state.was_get {
                return Err(ViolationKind::DuplicateGet);
            }
            Ok(KeyOrderState {
                was_get: true,
                ..state
            })
        }
        Action::Acquire => {
            if !state.was_get {
                return Err(ViolationKind::AcquireWithoutGet);
            }
            if state.was_acquired {
                return Err(ViolationKind::DuplicateAcquire);
            }
            Ok(KeyOrderState {
                was_get: false,
                was_acquired: true,
            })
        }
        Action::Release => {
            if !state.was_acquired {
                return Err(ViolationKind::ReleaseWithoutAcquire);
            }
            Ok(KeyOrderState {
                was_acquired: false,
                ..state
            })
        }
        Action::Unknown => Ok(state),
    }
}

/// Check the life-cycle order of every key in a request.
///
/// Returns one violation per misordered key, sorted by position.
pub fn check_key_order(collection: &EventCollection) -> Vec<Violation> {
    // None marks a key halted by its first violation.
    let mut states: HashMap<&LockKey, Option<KeyOrderState>> = HashMap::new();
    let mut violations = Vec::new();

    for (position, event) in collection.iter().enumerate() {
        let slot = states.entry(event.key()).or_insert(Some(KeyOrderState::default()));
        let Some(state) = *slot else {
            continue;
        };
        match next_key_order_state(state, event.action()) {
            Ok(next) => *slot = Some(next),
            Err(kind) => {
                violations.push(Violation::warning(position, event, kind));
                *slot = None;
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use latchkey_testing::EventScript;

    use super::*;

    #[test]
    fn test_well_formed_rounds_pass() {
        let collection = EventScript::new("/r").get("A").acquire("A").release("A").get("A").acquire("A").release("A").build();
        assert!(check_key_order(&collection).is_empty());
    }

    #[test]
    fn test_duplicate_get_at_second_get() {
        let collection = EventScript::new("/r").get("A").get("A").build();
        let violations = check_key_order(&collection);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::DuplicateGet);
        assert_eq!(violations[0].position, 1);
    }

    #[test]
    fn test_acquire_without_get() {
        let collection = EventScript::new("/r").acquire("A").build();
        let violations = check_key_order(&collection);
        assert_eq!(violations[0].kind, ViolationKind::AcquireWithoutGet);
        assert_eq!(violations[0].position, 0);
    }

    #[test]
    fn test_duplicate_acquire() {
        let collection = EventScript::new("/r").get("A").acquire("A").get("A").acquire("A").build();
        let violations = check_key_order(&collection);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::DuplicateAcquire);
        assert_eq!(violations[0].position, 3);
    }

    #[test]
    fn test_release_without_acquire() {
        let collection = EventScript::new("/r").get("A").release("A").build();
        let violations = check_key_order(&collection);
        assert_eq!(violations[0].kind, ViolationKind::ReleaseWithoutAcquire);
        assert_eq!(violations[0].position, 1);
    }

    #[test]
    fn test_first_violation_halts_key_but_not_others() {
        // A fails at #1 and would fail again at #3; B fails at #5.
        let collection =
            EventScript::new("/r").get("A").get("A").get("B").release("A").acquire("B").acquire("B").build();
        let violations = check_key_order(&collection);
        assert_eq!(violations.len(), 2);
        assert_eq!((violations[0].key.as_str(), violations[0].position), ("A", 1));
        assert_eq!((violations[1].key.as_str(), violations[1].position), ("B", 5));
        assert_eq!(violations[1].kind, ViolationKind::AcquireWithoutGet);
    }

    #[test]
    fn test_unknown_actions_ignored() {
        let collection = EventScript::new("/r").get("A").unknown("A").acquire("A").unknown("A").release("A").build();
        assert!(check_key_order(&collection).is_empty());
    }

    #[test]
    fn test_state_transitions() {
        let s = next_key_order_state(KeyOrderState::default(), Action::Get).unwrap();
        assert_eq!(
            s,
            KeyOrderState {
                was_get: true,
                was_acquired: false
            }
        );
        let s = next_key_order_state(s, Action::Acquire).unwrap();
        assert_eq!(
            s,
            KeyOrderState {
                was_get: false,
                was_acquired: true
            }
        );
        let s = next_key_order_state(s, Action::Release).unwrap();
        assert_eq!(s, KeyOrderState::default());
    }
}
