//! Request-scoped lock profiler.
//!
//! Records every lock operation of one request, persists it to an optional
//! [`EventStore`], and analyses the whole store on demand:
//!
//! 1. [`Profiler::build_map`] groups stored events by entry URI, then by
//!    request identity, keeping store order inside each group.
//! 2. [`Profiler::validate`] runs the order and nesting validators on every
//!    group independently and surfaces the first finding.
//! 3. [`Profiler::generate_report`] hands the map and the findings to a
//!    [`ReportSink`].
//!
//! Recording never waits on the store and never fails the lock operation it
//! annotates: events are handed to an ordered background writer, and store
//! errors and timeouts are logged and counted, nothing more.

use std::backtrace::Backtrace;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use latchkey_core::Action;
use latchkey_core::CallSite;
use latchkey_core::EventStore;
use latchkey_core::LockKey;
use latchkey_core::ProfileEvent;
use latchkey_core::ProfileMap;
use latchkey_core::Report;
use latchkey_core::ReportSink;
use latchkey_core::Violation;
use latchkey_core::constants::MAX_EVENTS_PER_REQUEST;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::context::RequestContext;
use crate::error::ProfilerError;
use crate::report::JsonFileReportSink;
use crate::verified::ValidationPasses;
use crate::verified::validate_collection;
use crate::writer::EventWriter;

/// Default bound on a single event store insert.
const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_millis(500);

/// Profiler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Directory for [`JsonFileReportSink`] when no sink is attached.
    pub map_output_location: Option<PathBuf>,
    /// Store a rendered backtrace with every event.
    pub capture_backtrace: bool,
    /// Also report locks left held at the end of a request.
    pub check_unreleased: bool,
    /// Upper bound on one event store insert.
    pub persist_timeout: Duration,
    /// Events kept per request, in process and when grouping the store.
    pub max_events_per_request: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            map_output_location: None,
            capture_backtrace: false,
            check_unreleased: false,
            persist_timeout: DEFAULT_PERSIST_TIMEOUT,
            max_events_per_request: MAX_EVENTS_PER_REQUEST,
        }
    }
}

/// Records and validates the lock operations of one request.
pub struct Profiler {
    context: RequestContext,
    config: ProfilerConfig,
    storage: Option<Arc<dyn EventStore>>,
    sink: Option<Arc<dyn ReportSink>>,
    events: Mutex<Vec<ProfileEvent>>,
    dropped_events: AtomicU64,
    persistence_failures: Arc<AtomicU64>,
    writer: OnceLock<EventWriter>,
}

impl Profiler {
    /// Create a profiler for `context` with default configuration.
    pub fn new(context: RequestContext) -> Self {
        Self {
            context,
            config: ProfilerConfig::default(),
            storage: None,
            sink: None,
            events: Mutex::new(Vec::new()),
            dropped_events: AtomicU64::new(0),
            persistence_failures: Arc::new(AtomicU64::new(0)),
            writer: OnceLock::new(),
        }
    }

    /// Apply a configuration.
    ///
    /// Fails if `map_output_location` is set but is not an existing directory.
    pub fn with_config(mut self, config: ProfilerConfig) -> Result<Self, ProfilerError> {
        if let Some(path) = &config.map_output_location
            && !path.is_dir()
        {
            return Err(ProfilerError::OutputLocationMissing {
                path: path.display().to_string(),
            });
        }
        self.config = config;
        Ok(self)
    }

    /// Persist events to `storage` as they are recorded.
    pub fn with_storage(mut self, storage: Arc<dyn EventStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Publish reports to `sink` instead of the configured directory.
    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The request this profiler records.
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Active configuration.
    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Attached event store.
    pub fn storage(&self) -> Option<&Arc<dyn EventStore>> {
        self.storage.as_ref()
    }

    /// Record one lock operation issued at `site`.
    ///
    /// The event is kept in-process, up to `max_events_per_request`, and, if
    /// a store is attached, queued for the background writer. Nothing here
    /// waits on the store; persistence failures are logged and counted only.
    pub async fn log(&self, site: CallSite, key: LockKey, action: Action, response: serde_json::Value) {
        let mut event = ProfileEvent::new(
            self.context.request_uri(),
            self.context.identity().clone(),
            site,
            key,
            action,
            response,
            Utc::now(),
        );
        if self.config.capture_backtrace {
            event = event.with_raw_call_stack(Backtrace::force_capture().to_string());
        }

        self.retain(&event);

        let Some(writer) = self.writer() else {
            return;
        };
        if !writer.submit(event) {
            self.persistence_failures.fetch_add(1, Ordering::Relaxed);
            warn!(request = %self.context.identity(), %action, "profile event writer is gone");
        }
    }

    fn retain(&self, event: &ProfileEvent) {
        let mut events = self.events.lock();
        if events.len() < self.config.max_events_per_request {
            events.push(event.clone());
            return;
        }
        drop(events);
        if self.dropped_events.fetch_add(1, Ordering::Relaxed) == 0 {
            warn!(
                request = %self.context.identity(),
                max = self.config.max_events_per_request,
                "in-process event record full, keeping later events in the store only"
            );
        }
    }

    /// Writer task for the attached store, spawned on first use.
    fn writer(&self) -> Option<&EventWriter> {
        let storage = self.storage.as_ref()?;
        Some(self.writer.get_or_init(|| {
            EventWriter::spawn(
                storage.clone(),
                self.config.persist_timeout,
                self.persistence_failures.clone(),
                self.context.identity().clone(),
            )
        }))
    }

    /// Wait until every event logged so far reached the store or failed.
    pub async fn flush(&self) {
        if let Some(writer) = self.writer.get() {
            writer.flush().await;
        }
    }

    /// Number of events that could not be persisted.
    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures.load(Ordering::Relaxed)
    }

    /// Number of events left out of the in-process record.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Events recorded by this profiler, in order.
    pub fn events(&self) -> Vec<ProfileEvent> {
        self.events.lock().clone()
    }

    /// Log and return one line per recorded event.
    pub fn dump(&self) -> Vec<String> {
        let events = self.events.lock();
        events
            .iter()
            .map(|event| {
                let line = format!(
                    "{} key = {}, action = {}, response = {} on {}",
                    event.call_site(),
                    event.key(),
                    event.action(),
                    event.response(),
                    event.timestamp().format("%H:%M:%S"),
                );
                info!(request = %self.context.identity(), "{line}");
                line
            })
            .collect()
    }

    /// Clear the attached store, after this profiler's pending writes.
    pub async fn truncate(&self) -> Result<bool, ProfilerError> {
        let storage = self.storage.as_ref().ok_or(ProfilerError::NoStorage)?;
        self.flush().await;
        Ok(storage.truncate().await?)
    }

    /// Group the attached store into the call map.
    ///
    /// Waits for this profiler's pending writes first. A request over
    /// `max_events_per_request` is cut, never the whole map.
    pub async fn build_map(&self) -> Result<ProfileMap, ProfilerError> {
        let storage = self.storage.as_ref().ok_or(ProfilerError::NoStorage)?;
        self.flush().await;
        let events = storage.list().await?;
        debug!(events = events.len(), "building profile map");
        Ok(ProfileMap::from_events_bounded(events, self.config.max_events_per_request))
    }

    /// Validate the store and return the first finding, if any.
    pub async fn validate(&self) -> Result<Option<Violation>, ProfilerError> {
        Ok(self.validate_all().await?.into_iter().next())
    }

    /// Validate the store and return every finding in group-iteration order.
    pub async fn validate_all(&self) -> Result<Vec<Violation>, ProfilerError> {
        let map = self.build_map().await?;
        Ok(validate_map(&map, self.passes()))
    }

    /// Build the map, validate it and publish the report.
    ///
    /// Uses the attached sink, or a [`JsonFileReportSink`] in
    /// `map_output_location`; fails with `NoOutputLocation` if neither is set.
    pub async fn generate_report(&self) -> Result<Report, ProfilerError> {
        let sink: Arc<dyn ReportSink> = match (&self.sink, &self.config.map_output_location) {
            (Some(sink), _) => sink.clone(),
            (None, Some(dir)) => Arc::new(JsonFileReportSink::new(dir.clone())),
            (None, None) => return Err(ProfilerError::NoOutputLocation),
        };

        let map = self.build_map().await?;
        let violations = validate_map(&map, self.passes());
        let report = Report::new(map, violations);
        sink.publish(&report).await?;

        match &report.violation {
            Some(violation) => warn!(%violation, total = report.violations.len(), "lock profile has violations"),
            None => info!(requests = report.map.request_count(), "lock profile is clean"),
        }
        Ok(report)
    }

    fn passes(&self) -> ValidationPasses {
        ValidationPasses {
            check_unreleased: self.config.check_unreleased,
        }
    }
}

/// Validate every request group of a map independently.
///
/// A finding in one group never stops analysis of the others.
pub fn validate_map(map: &ProfileMap, passes: ValidationPasses) -> Vec<Violation> {
    map.collections().flat_map(|collection| validate_collection(collection, passes)).collect()
}
