//! Data model and external contracts for latchkey lock profiling.
//!
//! - [`ProfileEvent`] - one recorded lock operation
//! - [`EventCollection`] - ordered events of one request
//! - [`ProfileMap`] - RequestURI → RequestIdentity → events
//! - [`Violation`] - located validation finding
//! - [`LockAdapter`], [`EventStore`], [`ReportSink`] - external collaborators
//!
//! Nothing in this crate talks to a broker or a database; transports and
//! backends implement the traits in [`traits`].

pub mod constants;
mod error;
mod event;
mod map;
mod memory;
mod report;
pub mod traits;
mod types;
mod violation;

pub use error::AdapterError;
pub use error::CollectionError;
pub use error::EventStoreError;
pub use error::ReportSinkError;
pub use event::CallSite;
pub use event::EventCollection;
pub use event::ProfileEvent;
pub use event::RequestIdentity;
pub use map::ProfileMap;
pub use map::UriGroup;
pub use memory::InMemoryEventStore;
pub use report::Report;
pub use traits::EventStore;
pub use traits::LockAdapter;
pub use traits::ReportSink;
pub use types::Action;
pub use types::LockKey;
pub use types::LockPointer;
pub use types::LockTimeout;
pub use violation::Severity;
pub use violation::Violation;
pub use violation::ViolationKind;
