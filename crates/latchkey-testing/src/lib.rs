//! Testing infrastructure for latchkey.
//!
//! - [`DeterministicLockAdapter`]: in-memory lock broker with a manual clock,
//!   contention, lease expiry and connection fault injection
//! - [`EventScript`]: builder for hand-written request event sequences
//!
//! # Usage
//!
//! ```ignore
//! let broker = Arc::new(DeterministicLockAdapter::new());
//! let mut mutex = MutexCoordinator::new(broker.clone(), MutexConfig::default());
//! mutex.establish_connection().await?;
//!
//! let collection = EventScript::new("/orders").get("A").acquire("A").release("A").build();
//! assert!(check_key_order(&collection).is_empty());
//! ```

mod broker;
mod script;

pub use broker::DeterministicLockAdapter;
pub use script::EventScript;
