//! Ordered background persistence of profile events.
//!
//! One writer task per profiler drains an unbounded channel, so recording an
//! event never waits on the store and the store still sees events in call
//! order.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use latchkey_core::EventStore;
use latchkey_core::ProfileEvent;
use latchkey_core::RequestIdentity;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;

enum WriteCommand {
    Insert(ProfileEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task. Dropping it lets the task drain and exit.
pub(crate) struct EventWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl EventWriter {
    /// Spawn the writer task on the current runtime.
    pub(crate) fn spawn(
        storage: Arc<dyn EventStore>,
        persist_timeout: Duration,
        failures: Arc<AtomicU64>,
        request: RequestIdentity,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(rx, storage, persist_timeout, failures, request));
        Self { tx }
    }

    /// Queue an event. Returns `false` if the task is gone.
    pub(crate) fn submit(&self, event: ProfileEvent) -> bool {
        self.tx.send(WriteCommand::Insert(event)).is_ok()
    }

    /// Wait until every event queued so far was stored or given up on.
    pub(crate) async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn write_loop(
    mut rx: mpsc::UnboundedReceiver<WriteCommand>,
    storage: Arc<dyn EventStore>,
    persist_timeout: Duration,
    failures: Arc<AtomicU64>,
    request: RequestIdentity,
) {
    while let Some(command) = rx.recv().await {
        let event = match command {
            WriteCommand::Insert(event) => event,
            WriteCommand::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        let key = event.key().clone();
        let action = event.action();
        let reason = match tokio::time::timeout(persist_timeout, storage.insert(event)).await {
            Ok(Ok(true)) => continue,
            Ok(Ok(false)) => "store rejected event".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "insert timed out".to_string(),
        };
        failures.fetch_add(1, Ordering::Relaxed);
        warn!(key = %key, %action, %request, reason = %reason, "failed to persist profile event");
    }
    debug!(%request, "profile event writer stopped");
}
