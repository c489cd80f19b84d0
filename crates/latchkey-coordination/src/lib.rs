//! Lock coordination with call-order profiling.
//!
//! This crate drives named, leased locks on a remote broker and records every
//! lock operation so misuse can be detected after the fact:
//!
//! - `MutexCoordinator` - per-key GET → ACQUIRE → RELEASE driver
//! - `Profiler` - request-scoped recorder, map builder and validator
//! - [`verified`] - pure order, nesting and boundary validators
//! - `JsonFileReportSink` - writes the call map and findings as JSON
//!
//! The broker, the event store and the report renderer are external
//! collaborators behind the traits in [`latchkey_core`].
//!
//! ## Example
//!
//! ```ignore
//! use latchkey_coordination::{MutexCoordinator, MutexConfig, Profiler, RequestContext};
//!
//! let profiler = Arc::new(Profiler::new(RequestContext::new("/checkout")?).with_storage(store));
//! let mut mutex = MutexCoordinator::new(adapter, MutexConfig::default()).with_profiler(profiler.clone());
//! mutex.establish_connection().await?;
//!
//! let key = LockKey::new("order:42");
//! mutex.get(key.clone(), LockTimeout::After(Duration::from_secs(5))).await?;
//! mutex.acquire(&key).await?;
//! // Critical section
//! mutex.release(&key).await?;
//!
//! if let Some(violation) = profiler.validate().await? {
//!     eprintln!("{violation}");
//! }
//! ```

mod context;
mod error;
mod mutex;
mod profiler;
mod report;
pub mod verified;
mod writer;

pub use context::RequestContext;
pub use error::MutexError;
pub use error::ProfilerError;
pub use mutex::LockState;
pub use mutex::MutexConfig;
pub use mutex::MutexCoordinator;
pub use profiler::Profiler;
pub use profiler::ProfilerConfig;
pub use profiler::validate_map;
pub use report::JsonFileReportSink;
pub use verified::ValidationPasses;
