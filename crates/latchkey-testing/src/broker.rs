//! Deterministic in-memory lock broker.

use std::collections::HashMap;

use async_trait::async_trait;
use latchkey_core::AdapterError;
use latchkey_core::LockAdapter;
use latchkey_core::LockKey;
use latchkey_core::LockPointer;
use latchkey_core::LockTimeout;
use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct PointerEntry {
    key: LockKey,
    /// Broker-clock deadline; `None` never expires.
    deadline_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct BrokerState {
    connected: bool,
    refuse_connections: bool,
    now_ms: u64,
    next_pointer: u64,
    pointers: HashMap<LockPointer, PointerEntry>,
    holders: HashMap<LockKey, LockPointer>,
}

impl BrokerState {
    fn is_expired(&self, pointer: &LockPointer) -> bool {
        match self.pointers.get(pointer) {
            Some(entry) => entry.deadline_ms.is_some_and(|deadline| self.now_ms > deadline),
            None => true,
        }
    }

    fn ensure_connected(&self) -> Result<(), AdapterError> {
        if self.connected && !self.refuse_connections {
            Ok(())
        } else {
            Err(AdapterError::Connection {
                reason: "not connected".to_string(),
            })
        }
    }
}

/// In-memory [`LockAdapter`] with a manual clock.
///
/// Share one instance (via `Arc`) between coordinators to simulate
/// contention between clients of the same broker. Leases expire only when
/// the clock is advanced with [`DeterministicLockAdapter::advance_ms`].
#[derive(Debug, Default)]
pub struct DeterministicLockAdapter {
    state: Mutex<BrokerState>,
}

impl DeterministicLockAdapter {
    /// Create a disconnected broker at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the broker clock.
    pub fn advance_ms(&self, ms: u64) {
        let mut state = self.state.lock();
        state.now_ms = state.now_ms.saturating_add(ms);
    }

    /// Make every exchange fail with a connection error until cleared.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Pointer currently holding `key`, if its lease is live.
    pub fn holder(&self, key: &LockKey) -> Option<LockPointer> {
        let state = self.state.lock();
        state.holders.get(key).filter(|p| !state.is_expired(p)).cloned()
    }
}

#[async_trait]
impl LockAdapter for DeterministicLockAdapter {
    async fn establish_connection(&self) -> Result<bool, AdapterError> {
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(AdapterError::Connection {
                reason: "connection refused".to_string(),
            });
        }
        state.connected = true;
        Ok(true)
    }

    async fn close_connection(&self) {
        self.state.lock().connected = false;
    }

    async fn is_alive(&self) -> bool {
        let state = self.state.lock();
        state.connected && !state.refuse_connections
    }

    async fn get(&self, name: &LockKey, timeout: LockTimeout) -> Result<LockPointer, AdapterError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;

        state.next_pointer += 1;
        let pointer = LockPointer::new(format!("{name}#{}", state.next_pointer));
        let deadline_ms = timeout.as_micros().map(|us| state.now_ms.saturating_add(us / 1_000));
        state.pointers.insert(pointer.clone(), PointerEntry {
            key: name.clone(),
            deadline_ms,
        });
        debug!(key = %name, pointer = %pointer, ?deadline_ms, "pointer issued");
        Ok(pointer)
    }

    async fn acquire(&self, pointer: &LockPointer) -> Result<bool, AdapterError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;

        if state.is_expired(pointer) {
            return Ok(false);
        }
        let Some(key) = state.pointers.get(pointer).map(|e| e.key.clone()) else {
            return Ok(false);
        };
        if let Some(current) = state.holders.get(&key)
            && current != pointer
            && !state.is_expired(current)
        {
            debug!(key = %key, holder = %current, "lock busy");
            return Ok(false);
        }
        state.holders.insert(key, pointer.clone());
        Ok(true)
    }

    async fn release(&self, pointer: &LockPointer) -> Result<bool, AdapterError> {
        let mut state = self.state.lock();
        state.ensure_connected()?;

        let Some(key) = state.pointers.get(pointer).map(|e| e.key.clone()) else {
            return Ok(false);
        };
        if state.holders.get(&key) == Some(pointer) {
            state.holders.remove(&key);
            state.pointers.remove(pointer);
            return Ok(true);
        }
        Ok(false)
    }
}
