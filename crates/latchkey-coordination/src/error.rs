//! Error types for the mutex coordinator and the profiler.

use latchkey_core::AdapterError;
use latchkey_core::EventStoreError;
use latchkey_core::LockKey;
use latchkey_core::ReportSinkError;
use snafu::Snafu;

use crate::mutex::LockState;

/// Errors from lock operations on a [`crate::MutexCoordinator`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MutexError {
    /// Connecting to the broker failed.
    #[snafu(display("failed to connect to lock broker: {source}"))]
    Establish {
        /// The underlying adapter error.
        source: AdapterError,
    },

    /// The broker is unreachable. Not retried here.
    #[snafu(display("connection error on key '{key}': {source}"))]
    Connection {
        /// Key of the failed operation.
        key: LockKey,
        /// The underlying adapter error.
        source: AdapterError,
    },

    /// The lock is held elsewhere. The caller decides whether to retry.
    #[snafu(display("lock '{key}' is busy"))]
    LockBusy {
        /// Contended key.
        key: LockKey,
    },

    /// `release` without a prior successful `acquire` on this coordinator.
    #[snafu(display("lock '{key}' was not acquired by this coordinator"))]
    NotAcquired {
        /// Key passed to `release`.
        key: LockKey,
    },

    /// Out-of-order call on this coordinator.
    #[snafu(display("cannot {action} lock '{key}' in state {state:?}"))]
    InvalidTransition {
        /// Key of the rejected call.
        key: LockKey,
        /// Local state of the key.
        state: LockState,
        /// Attempted operation.
        action: &'static str,
    },

    /// Key is empty or too long to send to the broker.
    #[snafu(display("invalid lock key '{key}'"))]
    InvalidKey {
        /// Rejected key.
        key: LockKey,
    },
}

/// Errors from profiler configuration, map building and reporting.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProfilerError {
    /// Map building needs an event store.
    #[snafu(display("no event store attached to profiler"))]
    NoStorage,

    /// Report generation needs a sink or an output directory.
    #[snafu(display("no report output location configured"))]
    NoOutputLocation,

    /// Configured output location is not an existing directory.
    #[snafu(display("report output location '{path}' is not a directory"))]
    OutputLocationMissing {
        /// Configured path.
        path: String,
    },

    /// Entry URI is empty or too long.
    #[snafu(display("invalid request uri: {reason}"))]
    InvalidRequestUri {
        /// Why the URI was rejected.
        reason: String,
    },

    /// The event store failed while reading or clearing.
    #[snafu(display("event store error: {source}"))]
    Storage {
        /// The underlying error.
        source: EventStoreError,
    },

    /// The report sink failed.
    #[snafu(display("report sink error: {source}"))]
    Sink {
        /// The underlying error.
        source: ReportSinkError,
    },
}

impl From<EventStoreError> for ProfilerError {
    fn from(source: EventStoreError) -> Self {
        ProfilerError::Storage { source }
    }
}

impl From<ReportSinkError> for ProfilerError {
    fn from(source: ReportSinkError) -> Self {
        ProfilerError::Sink { source }
    }
}
