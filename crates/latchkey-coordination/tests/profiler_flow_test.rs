//! End-to-end tests: coordinator → profiler → event store → validators.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use chrono::TimeZone;
use chrono::Utc;
use latchkey_coordination::JsonFileReportSink;
use latchkey_coordination::MutexConfig;
use latchkey_coordination::MutexCoordinator;
use latchkey_coordination::Profiler;
use latchkey_coordination::ProfilerConfig;
use latchkey_coordination::ProfilerError;
use latchkey_coordination::RequestContext;
use latchkey_core::Action;
use latchkey_core::EventStore;
use latchkey_core::EventStoreError;
use latchkey_core::InMemoryEventStore;
use latchkey_core::LockKey;
use latchkey_core::LockTimeout;
use latchkey_core::ProfileEvent;
use latchkey_core::Report;
use latchkey_core::Severity;
use latchkey_core::ViolationKind;
use latchkey_core::constants::REPORT_FILE_NAME;
use latchkey_testing::DeterministicLockAdapter;
use latchkey_testing::EventScript;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    broker: Arc<DeterministicLockAdapter>,
    store: Arc<InMemoryEventStore>,
}

impl Harness {
    async fn new() -> Self {
        init_tracing();
        let broker = Arc::new(DeterministicLockAdapter::new());
        let harness = Self {
            broker,
            store: Arc::new(InMemoryEventStore::new()),
        };
        harness.mutex(None).establish_connection().await.unwrap();
        harness
    }

    fn profiler(&self, uri: &str, offset_ms: i64) -> Arc<Profiler> {
        let started = Utc.timestamp_millis_opt(1_700_000_000_000 + offset_ms).single().unwrap();
        let context = RequestContext::started_at(uri, started).unwrap();
        Arc::new(Profiler::new(context).with_storage(self.store.clone()))
    }

    fn mutex(&self, profiler: Option<&Arc<Profiler>>) -> MutexCoordinator<DeterministicLockAdapter> {
        let mutex = MutexCoordinator::new(self.broker.clone(), MutexConfig::default());
        match profiler {
            Some(p) => mutex.with_profiler(p.clone()),
            None => mutex,
        }
    }
}

#[tokio::test]
async fn test_nested_critical_sections_pass_both_validators() {
    let h = Harness::new().await;
    let profiler = h.profiler("/req1", 0);
    let mut mutex = h.mutex(Some(&profiler));
    let (a, b) = (LockKey::new("A"), LockKey::new("B"));

    mutex.get(a.clone(), LockTimeout::Never).await.unwrap();
    mutex.acquire(&a).await.unwrap();
    mutex.get(b.clone(), LockTimeout::Never).await.unwrap();
    mutex.acquire(&b).await.unwrap();
    mutex.release(&b).await.unwrap();
    mutex.release(&a).await.unwrap();

    assert_eq!(profiler.events().len(), 6);
    assert_eq!(profiler.validate().await.unwrap(), None);
}

#[tokio::test]
async fn test_crossed_critical_sections_fail_at_outer_release() {
    let h = Harness::new().await;
    let profiler = h.profiler("/req1", 0);
    let mut mutex = h.mutex(Some(&profiler));
    let (a, b) = (LockKey::new("A"), LockKey::new("B"));

    mutex.get(a.clone(), LockTimeout::Never).await.unwrap();
    mutex.acquire(&a).await.unwrap();
    mutex.get(b.clone(), LockTimeout::Never).await.unwrap();
    mutex.acquire(&b).await.unwrap();
    let release_line = line!() + 1;
    mutex.release(&a).await.unwrap();
    mutex.release(&b).await.unwrap();

    let violation = profiler.validate().await.unwrap().unwrap();
    assert_eq!(violation.position, 4);
    assert_eq!(violation.key, a);
    assert_eq!(violation.kind, ViolationKind::CrossedRelease { still_held: vec![b] });
    assert_eq!(violation.severity, Severity::Warning);
    assert_eq!(&violation.request_identity, profiler.context().identity());
    assert!(violation.call_site.file.ends_with("profiler_flow_test.rs"));
    assert_eq!(violation.call_site.line, release_line);
}

#[tokio::test]
async fn test_crossing_across_coordinators_is_caught() {
    // Each coordinator is locally consistent; only the shared request trace
    // shows the crossed sections.
    let h = Harness::new().await;
    let profiler = h.profiler("/jobs", 0);
    let mut outer = h.mutex(Some(&profiler));
    let mut inner = h.mutex(Some(&profiler));
    let (a, b) = (LockKey::new("A"), LockKey::new("B"));

    outer.get(a.clone(), LockTimeout::Never).await.unwrap();
    outer.acquire(&a).await.unwrap();
    inner.get(b.clone(), LockTimeout::Never).await.unwrap();
    inner.acquire(&b).await.unwrap();
    outer.release(&a).await.unwrap();
    inner.release(&b).await.unwrap();

    let violation = profiler.validate().await.unwrap().unwrap();
    assert!(matches!(violation.kind, ViolationKind::CrossedRelease { .. }));
}

#[tokio::test]
async fn test_busy_acquire_is_not_recorded() {
    let h = Harness::new().await;
    let profiler = h.profiler("/req", 0);
    let mut holder = h.mutex(None);
    let mut waiter = h.mutex(Some(&profiler));
    let key = LockKey::new("A");

    holder.get(key.clone(), LockTimeout::Never).await.unwrap();
    holder.acquire(&key).await.unwrap();
    waiter.get(key.clone(), LockTimeout::Never).await.unwrap();
    assert!(waiter.acquire(&key).await.is_err());
    holder.release(&key).await.unwrap();
    waiter.acquire(&key).await.unwrap();
    waiter.release(&key).await.unwrap();

    let actions: Vec<Action> = profiler.events().iter().map(|e| e.action()).collect();
    assert_eq!(actions, vec![Action::Get, Action::Acquire, Action::Release]);
    assert_eq!(profiler.validate().await.unwrap(), None);
}

#[tokio::test]
async fn test_groups_are_validated_independently() {
    let h = Harness::new().await;
    for event in EventScript::started_at("/a", 1).get("A").get("A").events() {
        h.store.insert(event).await.unwrap();
    }
    for event in EventScript::started_at("/b", 2).acquire("B").acquire("C").release("B").events() {
        h.store.insert(event).await.unwrap();
    }
    for event in EventScript::started_at("/a", 3).get("A").acquire("A").release("A").events() {
        h.store.insert(event).await.unwrap();
    }

    let profiler = h.profiler("/inspect", 0);
    let map = profiler.build_map().await.unwrap();
    assert_eq!(map.uri_groups().len(), 2);
    assert_eq!(map.request_count(), 3);

    let violations = profiler.validate_all().await.unwrap();
    let kinds: Vec<&ViolationKind> = violations.iter().map(|v| &v.kind).collect();
    // /a#1 duplicate get; /b order (acquire without get, twice), then /b crossed release.
    assert_eq!(kinds, vec![
        &ViolationKind::DuplicateGet,
        &ViolationKind::AcquireWithoutGet,
        &ViolationKind::AcquireWithoutGet,
        &ViolationKind::CrossedRelease {
            still_held: vec![LockKey::new("C")]
        },
    ]);

    let first = profiler.validate().await.unwrap().unwrap();
    assert_eq!(first.kind, ViolationKind::DuplicateGet);
    assert_eq!(first.position, 1);
}

#[tokio::test]
async fn test_validate_is_idempotent() {
    let h = Harness::new().await;
    for event in EventScript::new("/r").get("A").acquire("A").get("B").acquire("B").release("A").release("B").events() {
        h.store.insert(event).await.unwrap();
    }
    let profiler = h.profiler("/inspect", 0);

    let first = profiler.validate_all().await.unwrap();
    let second = profiler.validate_all().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
}

#[tokio::test]
async fn test_truncate_clears_store() {
    let h = Harness::new().await;
    let profiler = h.profiler("/r", 0);
    let mut mutex = h.mutex(Some(&profiler));
    let key = LockKey::new("A");

    mutex.get(key.clone(), LockTimeout::After(Duration::from_secs(1))).await.unwrap();
    mutex.acquire(&key).await.unwrap();
    mutex.release(&key).await.unwrap();
    profiler.flush().await;
    assert_eq!(h.store.len().await, 3);

    assert!(profiler.truncate().await.unwrap());
    assert!(profiler.build_map().await.unwrap().is_empty());
    // The in-process record outlives the store contents.
    assert_eq!(profiler.events().len(), 3);
}

#[tokio::test]
async fn test_generate_report_to_directory() {
    let h = Harness::new().await;
    let dir = tempfile::tempdir().unwrap();
    for event in EventScript::new("/r").get("A").acquire("A").get("B").acquire("B").release("A").release("B").events() {
        h.store.insert(event).await.unwrap();
    }
    let config = ProfilerConfig {
        map_output_location: Some(dir.path().to_path_buf()),
        ..ProfilerConfig::default()
    };
    let context = RequestContext::new("/inspect").unwrap();
    let profiler = Profiler::new(context).with_config(config).unwrap().with_storage(h.store.clone());

    let report = profiler.generate_report().await.unwrap();
    assert!(!report.is_clean());

    let written: Report =
        serde_json::from_slice(&std::fs::read(dir.path().join(REPORT_FILE_NAME)).unwrap()).unwrap();
    assert_eq!(written.violation, report.violation);
    assert_eq!(written.map.event_count(), 6);
}

#[tokio::test]
async fn test_generate_report_to_explicit_sink() {
    let h = Harness::new().await;
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(JsonFileReportSink::new(dir.path().to_path_buf()));
    let profiler = Profiler::new(RequestContext::new("/inspect").unwrap())
        .with_storage(h.store.clone())
        .with_report_sink(sink.clone());

    let report = profiler.generate_report().await.unwrap();
    assert!(report.is_clean());
    assert!(sink.path().exists());
}

#[tokio::test]
async fn test_report_without_storage_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = ProfilerConfig {
        map_output_location: Some(dir.path().to_path_buf()),
        ..ProfilerConfig::default()
    };
    let profiler = Profiler::new(RequestContext::new("/inspect").unwrap()).with_config(config).unwrap();
    assert!(matches!(profiler.generate_report().await, Err(ProfilerError::NoStorage)));
}

#[tokio::test]
async fn test_full_request_does_not_hide_other_findings() {
    let h = Harness::new().await;
    for event in EventScript::started_at("/crossed", 1).get("A").acquire("A").get("B").acquire("B").release("A").events() {
        h.store.insert(event).await.unwrap();
    }
    let mut big = EventScript::started_at("/big", 2);
    for _ in 0..6 {
        big = big.get("K").acquire("K").release("K");
    }
    for event in big.events() {
        h.store.insert(event).await.unwrap();
    }

    let config = ProfilerConfig {
        max_events_per_request: 10,
        ..ProfilerConfig::default()
    };
    let context = RequestContext::new("/inspect").unwrap();
    let profiler = Profiler::new(context).with_config(config).unwrap().with_storage(h.store.clone());

    let violations = profiler.validate_all().await.unwrap();
    assert_eq!(violations.len(), 2);
    assert_eq!(violations[0].kind, ViolationKind::CrossedRelease {
        still_held: vec![LockKey::new("B")]
    });
    assert_eq!(violations[1].kind, ViolationKind::Truncated { dropped: 8 });
    assert_eq!(violations[1].severity, Severity::Notice);
    assert_eq!(violations[1].position, 9);
}

struct StalledStore;

#[async_trait]
impl EventStore for StalledStore {
    async fn truncate(&self) -> Result<bool, EventStoreError> {
        Ok(true)
    }

    async fn insert(&self, _event: ProfileEvent) -> Result<bool, EventStoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<ProfileEvent>, EventStoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_stalled_store_does_not_delay_lock_operations() {
    init_tracing();
    let broker = Arc::new(DeterministicLockAdapter::new());
    let profiler = Arc::new(Profiler::new(RequestContext::new("/slow").unwrap()).with_storage(Arc::new(StalledStore)));
    let mut mutex = MutexCoordinator::new(broker, MutexConfig::default()).with_profiler(profiler.clone());
    mutex.establish_connection().await.unwrap();
    let key = LockKey::new("A");

    let started = Instant::now();
    mutex.get(key.clone(), LockTimeout::Never).await.unwrap();
    mutex.acquire(&key).await.unwrap();
    mutex.release(&key).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(profiler.events().len(), 3);
}
