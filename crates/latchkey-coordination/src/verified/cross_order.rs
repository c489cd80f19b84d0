//! Cross-key nesting of critical sections.
//!
//! Critical sections over different keys may nest to any depth but must never
//! cross:
//!
//! ```text
//! valid            crossed
//! <A>              <A>
//!   <B>              <B>
//!   </B>           </A>
//! </A>               </B>
//! ```
//!
//! Each key tracks the full set of keys acquired while it was held, not just
//! the innermost one, so patterns with three or more overlapping keys are
//! caught at the first release that would break containment.

use std::collections::BTreeSet;
use std::collections::HashMap;

use latchkey_core::Action;
use latchkey_core::EventCollection;
use latchkey_core::LockKey;
use latchkey_core::Violation;
use latchkey_core::ViolationKind;

/// Nesting state of one key during a single validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossOrderState {
    /// Key being tracked.
    pub key: LockKey,
    /// Whether the key is currently acquired.
    pub is_held: bool,
    /// Keys acquired while this one was held and not yet released.
    pub contained_keys: BTreeSet<LockKey>,
}

impl CrossOrderState {
    /// Fresh, unheld state.
    pub fn new(key: LockKey) -> Self {
        Self {
            key,
            is_held: false,
            contained_keys: BTreeSet::new(),
        }
    }
}

/// Check that critical sections in a request nest without crossing.
///
/// Halts at, and returns, the first crossed release.
pub fn check_cross_order(collection: &EventCollection) -> Option<Violation> {
    let mut states: HashMap<LockKey, CrossOrderState> = collection
        .keys()
        .into_iter()
        .map(|key| (key.clone(), CrossOrderState::new(key.clone())))
        .collect();

    for (position, event) in collection.iter().enumerate() {
        let key = event.key();
        match event.action() {
            Action::Acquire => {
                for other in states.values_mut() {
                    if other.is_held && &other.key != key {
                        other.contained_keys.insert(key.clone());
                    }
                }
                if let Some(state) = states.get_mut(key) {
                    state.is_held = true;
                }
            }
            Action::Release => {
                if let Some(state) = states.get_mut(key) {
                    state.is_held = false;
                    if !state.contained_keys.is_empty() {
                        let still_held = state.contained_keys.iter().cloned().collect();
                        return Some(Violation::warning(position, event, ViolationKind::CrossedRelease { still_held }));
                    }
                }
                for other in states.values_mut() {
                    other.contained_keys.remove(key);
                }
            }
            Action::Get | Action::Unknown => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use latchkey_testing::EventScript;

    use super::*;

    #[test]
    fn test_nested_passes() {
        let collection = EventScript::new("/r").acquire("A").acquire("B").release("B").release("A").build();
        assert_eq!(check_cross_order(&collection), None);
    }

    #[test]
    fn test_crossed_fails_at_outer_release() {
        let collection = EventScript::new("/r").acquire("A").acquire("B").release("A").release("B").build();
        let violation = check_cross_order(&collection).unwrap();
        assert_eq!(violation.position, 2);
        assert_eq!(violation.key.as_str(), "A");
        assert_eq!(violation.kind, ViolationKind::CrossedRelease {
            still_held: vec![LockKey::new("B")]
        });
    }

    #[test]
    fn test_sequential_sections_pass() {
        let collection = EventScript::new("/r").acquire("A").release("A").acquire("B").release("B").build();
        assert_eq!(check_cross_order(&collection), None);
    }

    #[test]
    fn test_three_keys_reports_every_still_held_key() {
        let collection =
            EventScript::new("/r").acquire("A").acquire("B").acquire("C").release("A").build();
        let violation = check_cross_order(&collection).unwrap();
        assert_eq!(violation.position, 3);
        assert_eq!(violation.kind, ViolationKind::CrossedRelease {
            still_held: vec![LockKey::new("B"), LockKey::new("C")]
        });
    }

    #[test]
    fn test_three_keys_middle_release_crossed() {
        // B is released while C, acquired inside B, is still held.
        let collection = EventScript::new("/r")
            .acquire("A")
            .acquire("B")
            .acquire("C")
            .release("B")
            .release("C")
            .release("A")
            .build();
        let violation = check_cross_order(&collection).unwrap();
        assert_eq!((violation.key.as_str(), violation.position), ("B", 3));
    }

    #[test]
    fn test_deep_nesting_passes() {
        let collection = EventScript::new("/r")
            .acquire("A")
            .acquire("B")
            .acquire("C")
            .release("C")
            .acquire("D")
            .release("D")
            .release("B")
            .release("A")
            .build();
        assert_eq!(check_cross_order(&collection), None);
    }

    #[test]
    fn test_reacquire_after_release_inside_outer() {
        let collection = EventScript::new("/r")
            .acquire("A")
            .acquire("B")
            .release("B")
            .acquire("B")
            .release("B")
            .release("A")
            .build();
        assert_eq!(check_cross_order(&collection), None);
    }

    #[test]
    fn test_get_events_ignored() {
        let collection = EventScript::new("/r")
            .get("A")
            .acquire("A")
            .get("B")
            .acquire("B")
            .release("B")
            .release("A")
            .build();
        assert_eq!(check_cross_order(&collection), None);
    }
}
