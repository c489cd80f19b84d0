//! Error types for the lock adapter, event store and model collections.

use snafu::Snafu;

/// Errors surfaced by a [`crate::LockAdapter`].
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum AdapterError {
    /// The lock broker is unreachable or the connection was dropped.
    #[snafu(display("lock broker connection failed: {reason}"))]
    Connection {
        /// Description of the transport failure.
        reason: String,
    },

    /// The broker answered with something the adapter cannot interpret.
    #[snafu(display("lock broker protocol error: {reason}"))]
    Protocol {
        /// Description of the malformed exchange.
        reason: String,
    },
}

/// Errors surfaced by an [`crate::EventStore`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EventStoreError {
    /// The backing store cannot be reached.
    #[snafu(display("event store unavailable: {reason}"))]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },

    /// A stored event could not be encoded or decoded.
    #[snafu(display("event store serialization error: {source}"))]
    Serialization {
        /// The underlying error.
        source: serde_json::Error,
    },
}

impl From<serde_json::Error> for EventStoreError {
    fn from(source: serde_json::Error) -> Self {
        EventStoreError::Serialization { source }
    }
}

/// Errors from building an [`crate::EventCollection`].
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum CollectionError {
    /// The event belongs to another request.
    #[snafu(display("event for request '{actual}' appended to collection for request '{expected}'"))]
    IdentityMismatch {
        /// Identity of the collection.
        expected: String,
        /// Identity carried by the rejected event.
        actual: String,
    },

    /// The collection reached its fixed bound.
    #[snafu(display("collection for request '{identity}' is full ({max} events)"))]
    CapacityExceeded {
        /// Identity of the collection.
        identity: String,
        /// Maximum number of events.
        max: usize,
    },

    /// The operation needs at least one event.
    #[snafu(display("collection for request '{identity}' is empty"))]
    Empty {
        /// Identity of the collection.
        identity: String,
    },
}

/// Errors surfaced by a [`crate::ReportSink`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReportSinkError {
    /// Writing the rendered report failed.
    #[snafu(display("report io error at '{path}': {source}"))]
    Io {
        /// Target path.
        path: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The report could not be encoded.
    #[snafu(display("report serialization error: {source}"))]
    Encode {
        /// The underlying error.
        source: serde_json::Error,
    },
}
