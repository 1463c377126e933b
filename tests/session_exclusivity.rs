//! Session pool behavior under concurrent load
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use statsheet_harvester_lib::crawling::{AuditRecorder, CrawlingOrchestrator, ExecutorPolicy, SessionPool, TaskExecutor};
use statsheet_harvester_lib::domain::{AuditStatus, ExtractionSpecTable, TemplateParams};
use statsheet_harvester_lib::infrastructure::TableNormalizer;
use statsheet_harvester_lib::test_utils::{MockSessionFactory, MockSite, RecordingLedger, RecordingStore, work_units};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_session_is_held_twice_and_never_more_than_capacity() {
    const CAPACITY: usize = 3;
    let pool = SessionPool::initialize(CAPACITY, &MockSessionFactory::new(MockSite::new()))
        .await
        .unwrap();
    let held = Arc::new(Mutex::new(HashSet::new()));
    let violations = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for task in 0..24 {
        let pool = pool.clone();
        let held = Arc::clone(&held);
        let violations = Arc::clone(&violations);
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                let lease = pool.lease().await.unwrap();
                let id = lease.session_id();
                {
                    let mut held = held.lock().unwrap();
                    if !held.insert(id) || held.len() > CAPACITY {
                        violations.lock().unwrap().push((task, id));
                    }
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
                held.lock().unwrap().remove(&id);
                drop(lease);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(violations.lock().unwrap().is_empty());
    let stats = pool.stats();
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.available, CAPACITY);
    assert!(stats.peak_leased <= CAPACITY);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn orchestrated_run_never_exceeds_concurrency() {
    let site = MockSite::new();
    site.set_latency(Duration::from_millis(2));
    let store = RecordingStore::new();
    let executor = TaskExecutor::new(
        Arc::new(ExtractionSpecTable::baseball_reference()),
        TemplateParams { season: 2021 },
        TableNormalizer::default(),
        store.clone(),
        AuditRecorder::new(RecordingLedger::new(), Duration::from_secs(1)),
        ExecutorPolicy::immediate(),
    );
    let pool = SessionPool::initialize(4, &MockSessionFactory::new(Arc::clone(&site)))
        .await
        .unwrap();

    let keys = [
        "ARI", "ATL", "BAL", "BOS", "CHC", "CHW", "CIN", "CLE", "COL", "DET", "HOU", "KCR", "LAA", "LAD", "MIA",
    ];
    let report = CrawlingOrchestrator::new(pool, Arc::new(executor))
        .run(work_units(&keys))
        .await;

    assert_eq!(report.units_completed, keys.len());
    assert_eq!(report.count(AuditStatus::Success), keys.len() * 8);
    assert_eq!(site.overlap_violations(), 0);
    assert!(site.peak_in_flight() <= 4);
    assert_eq!(site.close_count(), 4);
}
