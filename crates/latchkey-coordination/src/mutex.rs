//! Client-side driver of the per-key GET → ACQUIRE → RELEASE life-cycle.
//!
//! Mutual exclusion is enforced by the remote broker. The coordinator only
//! keeps the local state of the keys it drives, rejects out-of-order calls on
//! itself as programmer errors, and reports each successful transition to an
//! attached [`Profiler`].
//!
//! The local state machine cannot see misuse spread across coordinators or
//! call sites; that is what the profiler's validators are for.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use latchkey_core::Action;
use latchkey_core::AdapterError;
use latchkey_core::CallSite;
use latchkey_core::LockAdapter;
use latchkey_core::LockKey;
use latchkey_core::LockPointer;
use latchkey_core::LockTimeout;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::error::MutexError;
use crate::profiler::Profiler;

/// Coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutexConfig {
    /// Pointer lifetime used by [`MutexCoordinator::get_default`].
    pub default_timeout: LockTimeout,
    /// Check [`LockAdapter::is_alive`] before issuing `get`.
    pub check_alive: bool,
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            default_timeout: LockTimeout::Never,
            check_alive: true,
        }
    }
}

/// Local life-cycle state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockState {
    /// No pointer held.
    None,
    /// Pointer obtained, not yet acquired.
    Got,
    /// Pointer acquired.
    Acquired,
}

#[derive(Debug, Clone)]
struct KeyEntry {
    state: LockState,
    pointer: LockPointer,
}

/// Drives lock operations against a [`LockAdapter`].
///
/// One coordinator per request (or per worker); coordinators share nothing
/// but the adapter. Dropping a coordinator performs no I/O: leases still held
/// expire on the broker's clock.
pub struct MutexCoordinator<A: LockAdapter + ?Sized> {
    adapter: Arc<A>,
    config: MutexConfig,
    profiler: Option<Arc<Profiler>>,
    keys: HashMap<LockKey, KeyEntry>,
}

impl<A: LockAdapter + ?Sized> MutexCoordinator<A> {
    /// Create a coordinator over a shared adapter.
    pub fn new(adapter: Arc<A>, config: MutexConfig) -> Self {
        Self {
            adapter,
            config,
            profiler: None,
            keys: HashMap::new(),
        }
    }

    /// Record every transition in `profiler`.
    pub fn with_profiler(mut self, profiler: Arc<Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Attached profiler, if any.
    pub fn profiler(&self) -> Option<&Arc<Profiler>> {
        self.profiler.as_ref()
    }

    /// Connect the adapter to the broker.
    pub async fn establish_connection(&self) -> Result<bool, MutexError> {
        let connected = self.adapter.establish_connection().await.map_err(|source| MutexError::Establish { source })?;
        info!(connected, "lock broker connection established");
        Ok(connected)
    }

    /// Close the adapter's connection.
    pub async fn close_connection(&self) {
        self.adapter.close_connection().await;
        debug!("lock broker connection closed");
    }

    /// Check the adapter's connection.
    pub async fn is_alive(&self) -> bool {
        self.adapter.is_alive().await
    }

    /// Local state of `key`.
    pub fn state(&self, key: &LockKey) -> LockState {
        self.keys.get(key).map(|e| e.state).unwrap_or(LockState::None)
    }

    /// Obtain a pointer for `key`, valid until `timeout` elapses unacquired.
    ///
    /// The caller's source location is recorded as the event's call site.
    #[track_caller]
    pub fn get(
        &mut self,
        key: LockKey,
        timeout: LockTimeout,
    ) -> impl Future<Output = Result<LockPointer, MutexError>> + '_ {
        let site = CallSite::caller();
        self.get_at(site, key, timeout)
    }

    /// [`Self::get`] with the configured default timeout.
    #[track_caller]
    pub fn get_default(&mut self, key: LockKey) -> impl Future<Output = Result<LockPointer, MutexError>> + '_ {
        let site = CallSite::caller();
        let timeout = self.config.default_timeout;
        self.get_at(site, key, timeout)
    }

    /// Claim the pointer obtained by the prior `get` on `key`.
    #[track_caller]
    pub fn acquire<'a>(&'a mut self, key: &'a LockKey) -> impl Future<Output = Result<(), MutexError>> + 'a {
        let site = CallSite::caller();
        self.acquire_at(site, key)
    }

    /// Release the pointer acquired on `key`.
    ///
    /// Returns `false` if the broker no longer held the lease.
    #[track_caller]
    pub fn release<'a>(&'a mut self, key: &'a LockKey) -> impl Future<Output = Result<bool, MutexError>> + 'a {
        let site = CallSite::caller();
        self.release_at(site, key)
    }

    /// [`Self::get`] with an explicit call site.
    pub async fn get_at(&mut self, site: CallSite, key: LockKey, timeout: LockTimeout) -> Result<LockPointer, MutexError> {
        if !key.is_valid() {
            return Err(MutexError::InvalidKey { key });
        }
        let state = self.state(&key);
        if state != LockState::None {
            return Err(MutexError::InvalidTransition {
                key,
                state,
                action: "get",
            });
        }
        if self.config.check_alive && !self.adapter.is_alive().await {
            return Err(MutexError::Connection {
                key,
                source: AdapterError::Connection {
                    reason: "adapter is not alive".to_string(),
                },
            });
        }

        let pointer = match self.adapter.get(&key, timeout).await {
            Ok(pointer) => pointer,
            Err(source) => return Err(MutexError::Connection { key, source }),
        };
        debug!(key = %key, pointer = %pointer, "lock pointer obtained");

        self.keys.insert(key.clone(), KeyEntry {
            state: LockState::Got,
            pointer: pointer.clone(),
        });
        self.record(site, &key, Action::Get, serde_json::Value::String(pointer.to_string())).await;
        Ok(pointer)
    }

    /// [`Self::acquire`] with an explicit call site.
    pub async fn acquire_at(&mut self, site: CallSite, key: &LockKey) -> Result<(), MutexError> {
        let pointer = match self.keys.get(key) {
            Some(entry) if entry.state == LockState::Got => entry.pointer.clone(),
            other => {
                return Err(MutexError::InvalidTransition {
                    key: key.clone(),
                    state: other.map(|e| e.state).unwrap_or(LockState::None),
                    action: "acquire",
                });
            }
        };

        let acquired = self.adapter.acquire(&pointer).await.map_err(|source| MutexError::Connection {
            key: key.clone(),
            source,
        })?;
        if !acquired {
            debug!(key = %key, "lock busy");
            return Err(MutexError::LockBusy { key: key.clone() });
        }

        if let Some(entry) = self.keys.get_mut(key) {
            entry.state = LockState::Acquired;
        }
        debug!(key = %key, "lock acquired");
        self.record(site, key, Action::Acquire, serde_json::Value::Bool(true)).await;
        Ok(())
    }

    /// [`Self::release`] with an explicit call site.
    pub async fn release_at(&mut self, site: CallSite, key: &LockKey) -> Result<bool, MutexError> {
        let pointer = match self.keys.get(key) {
            Some(entry) if entry.state == LockState::Acquired => entry.pointer.clone(),
            _ => return Err(MutexError::NotAcquired { key: key.clone() }),
        };

        let released = self.adapter.release(&pointer).await.map_err(|source| MutexError::Connection {
            key: key.clone(),
            source,
        })?;

        // The pointer is spent either way; a false answer means the broker
        // already expired the lease.
        self.keys.remove(key);
        debug!(key = %key, released, "lock released");
        self.record(site, key, Action::Release, serde_json::Value::Bool(released)).await;
        Ok(released)
    }

    async fn record(&self, site: CallSite, key: &LockKey, action: Action, response: serde_json::Value) {
        if let Some(profiler) = &self.profiler {
            profiler.log(site, key.clone(), action, response).await;
        }
    }
}
