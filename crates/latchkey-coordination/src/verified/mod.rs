//! Pure validators over recorded lock events.
//!
//! Every function here is deterministic and side-effect free: it reads one
//! request's [`EventCollection`] and returns findings as [`Violation`]
//! values. Distinct request collections share nothing and may be validated
//! in parallel.
//!
//! # Module Organization
//!
//! - [`order`]: per-key GET → ACQUIRE → RELEASE sequencing
//! - [`cross_order`]: multi-key nesting (critical sections never cross)
//! - [`boundary`]: locks still held when the request ends, and requests cut
//!   at the event bound
//!
//! # Tiger Style
//!
//! - No panics; malformed input yields findings, not errors
//! - Events are walked in collection order, never re-sorted

pub mod boundary;
pub mod cross_order;
pub mod order;

use latchkey_core::EventCollection;
use latchkey_core::Violation;

pub use boundary::check_truncated;
pub use boundary::check_unreleased;
pub use cross_order::CrossOrderState;
pub use cross_order::check_cross_order;
pub use order::KeyOrderState;
pub use order::check_key_order;
pub use order::next_key_order_state;

/// Which passes to run on a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationPasses {
    /// Also report locks still held at the end of the request.
    pub check_unreleased: bool,
}

/// Run every enabled pass on one request.
///
/// Findings are ordered by pass (order, then nesting, then boundary) and by
/// position within a pass. Nesting findings on a request that already failed
/// the order pass are advisory, since the nesting pass assumes well-ordered
/// keys.
pub fn validate_collection(collection: &EventCollection, passes: ValidationPasses) -> Vec<Violation> {
    let mut violations = check_key_order(collection);
    violations.extend(check_cross_order(collection));
    if passes.check_unreleased {
        violations.extend(check_unreleased(collection));
    }
    violations.extend(check_truncated(collection));
    violations
}
