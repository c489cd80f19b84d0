//! External contracts consumed and produced by the lock profiler.
//!
//! Wire encoding, persistence and rendering live behind these traits so the
//! coordinator and the validators never depend on a transport or a backend.

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::error::EventStoreError;
use crate::error::ReportSinkError;
use crate::event::ProfileEvent;
use crate::report::Report;
use crate::types::LockKey;
use crate::types::LockPointer;
use crate::types::LockTimeout;

/// Client side of the remote lock broker.
///
/// Every call is an independent request/response exchange. Mutual exclusion
/// is enforced by the broker; implementations need no client-side locking.
#[async_trait]
pub trait LockAdapter: Send + Sync {
    /// Connect to the broker.
    async fn establish_connection(&self) -> Result<bool, AdapterError>;

    /// Drop the connection. Leases still held expire on the broker's clock.
    async fn close_connection(&self);

    /// Check connection liveness.
    async fn is_alive(&self) -> bool;

    /// Obtain a pointer for `name`, valid until `timeout` elapses unacquired.
    async fn get(&self, name: &LockKey, timeout: LockTimeout) -> Result<LockPointer, AdapterError>;

    /// Claim a pointer. `Ok(false)` means the lock is held elsewhere.
    async fn acquire(&self, pointer: &LockPointer) -> Result<bool, AdapterError>;

    /// Release a claimed pointer.
    async fn release(&self, pointer: &LockPointer) -> Result<bool, AdapterError>;
}

/// Durable sink for profiling events.
///
/// `list` order is authoritative for grouping and validation.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Remove every stored event.
    async fn truncate(&self) -> Result<bool, EventStoreError>;

    /// Append one event.
    async fn insert(&self, event: ProfileEvent) -> Result<bool, EventStoreError>;

    /// Every stored event in store order.
    async fn list(&self) -> Result<Vec<ProfileEvent>, EventStoreError>;
}

/// Renderer for the call map and its validation result.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Render or persist a report.
    async fn publish(&self, report: &Report) -> Result<(), ReportSinkError>;
}

// Blanket implementations for Arc<T>

#[async_trait]
impl<T: LockAdapter + ?Sized> LockAdapter for std::sync::Arc<T> {
    async fn establish_connection(&self) -> Result<bool, AdapterError> {
        (**self).establish_connection().await
    }

    async fn close_connection(&self) {
        (**self).close_connection().await
    }

    async fn is_alive(&self) -> bool {
        (**self).is_alive().await
    }

    async fn get(&self, name: &LockKey, timeout: LockTimeout) -> Result<LockPointer, AdapterError> {
        (**self).get(name, timeout).await
    }

    async fn acquire(&self, pointer: &LockPointer) -> Result<bool, AdapterError> {
        (**self).acquire(pointer).await
    }

    async fn release(&self, pointer: &LockPointer) -> Result<bool, AdapterError> {
        (**self).release(pointer).await
    }
}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for std::sync::Arc<T> {
    async fn truncate(&self) -> Result<bool, EventStoreError> {
        (**self).truncate().await
    }

    async fn insert(&self, event: ProfileEvent) -> Result<bool, EventStoreError> {
        (**self).insert(event).await
    }

    async fn list(&self) -> Result<Vec<ProfileEvent>, EventStoreError> {
        (**self).list().await
    }
}

#[async_trait]
impl<T: ReportSink + ?Sized> ReportSink for std::sync::Arc<T> {
    async fn publish(&self, report: &Report) -> Result<(), ReportSinkError> {
        (**self).publish(report).await
    }
}
