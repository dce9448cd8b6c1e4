//! Reconciliation and fetch cycle tests against in-memory providers
//!
//! Each test works in its own temp directory holding the three JSON files.

mod helpers;

use helpers::{driver, expect_ready, pipeline, FakeCatalog, FakeDetails, Reply};
use std::sync::Arc;
use tagteam_gd::config::PipelineConfig;
use tagteam_gd::fetcher::{FetchSettings, MetadataFetcher, StopReason};
use tagteam_gd::models::MetadataRecord;
use tagteam_gd::reconcile::{BlockReason, ReconcileOutcome, ReconcileState, ReconciliationDriver};
use tagteam_gd::store::{DataFiles, MetadataStore, NameIndex, SkipSet};
use tempfile::TempDir;

const CATALOG: &[(u32, &str)] = &[
    (440, "Team Fortress 2"),
    (10, "Counter-Strike"),
    (999, "Mystery Game"),
];

fn five_games() -> FakeCatalog {
    FakeCatalog::new(&[
        (70, "Half-Life"),
        (220, "Half-Life 2"),
        (400, "Portal"),
        (620, "Portal 2"),
        (440, "Team Fortress 2"),
    ])
}

fn five_found() -> FakeDetails {
    FakeDetails::new(&[
        (70, Reply::Found("Half-Life")),
        (220, Reply::Found("Half-Life 2")),
        (400, Reply::Found("Portal")),
        (620, Reply::Found("Portal 2")),
        (440, Reply::Found("Team Fortress 2")),
    ])
}

fn record(name: &str) -> MetadataRecord {
    MetadataRecord {
        name: name.to_string(),
        developers: vec![],
        publishers: vec![],
        tag_ids: vec![],
        has_release_date: false,
        release_state: None,
        release_timestamp: None,
        review_score: 0,
        review_percentage: 0,
    }
}

// ============================================================================
// Full reconciliation
// ============================================================================

#[tokio::test]
async fn test_reconcile_from_scratch() {
    let temp_dir = TempDir::new().unwrap();
    let details = FakeDetails::new(&[
        (440, Reply::Found("Team Fortress 2")),
        (10, Reply::Found("Counter-Strike")),
        (999, Reply::Unknown),
    ]);

    let mut driver = driver(temp_dir.path(), FakeCatalog::new(CATALOG), &details, pipeline(100, 0));
    let context = expect_ready(driver.reconcile().await);

    assert_eq!(driver.state(), ReconcileState::Ready);
    assert_eq!(context.expected, 3);
    assert_eq!(context.shortfall, 0);
    assert_eq!(context.store.get(440).unwrap().name, "Team Fortress 2");
    assert_eq!(context.store.get(10).unwrap().name, "Counter-Strike");
    assert!(context.skip_set.contains(999));
    assert_eq!(details.requests(), vec![440, 10, 999]);
    assert_eq!(details.disconnects(), 1);

    let files = DataFiles::in_dir(temp_dir.path());
    let index_json = std::fs::read_to_string(&files.index_path).unwrap();
    assert_eq!(
        index_json,
        r#"{"teamfortress2":[440],"counterstrike":[10],"mysterygame":[999]}"#
    );
    assert_eq!(files.load_store().unwrap(), context.store);
    assert_eq!(files.load_skip_set().unwrap(), context.skip_set);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let details = FakeDetails::new(&[
        (440, Reply::Found("Team Fortress 2")),
        (10, Reply::Found("Counter-Strike")),
    ]);
    let first = expect_ready(
        driver(temp_dir.path(), FakeCatalog::new(CATALOG), &details, pipeline(100, 0))
            .reconcile()
            .await,
    );

    // Index is on disk: the catalog is not consulted and nothing is refetched
    let rerun = FakeDetails::new(&[]);
    let second = expect_ready(
        driver(temp_dir.path(), FakeCatalog::failing(), &rerun, pipeline(100, 0))
            .reconcile()
            .await,
    );

    assert!(rerun.requests().is_empty());
    assert_eq!(rerun.disconnects(), 0);
    assert_eq!(second.store, first.store);
    assert_eq!(second.skip_set, first.skip_set);
}

#[tokio::test]
async fn test_unknown_id_is_never_refetched() {
    let temp_dir = TempDir::new().unwrap();
    let details = FakeDetails::new(&[(440, Reply::Found("Team Fortress 2"))]);

    let catalog = FakeCatalog::new(&[(440, "Team Fortress 2"), (999, "Mystery Game")]);
    expect_ready(driver(temp_dir.path(), catalog, &details, pipeline(100, 0)).reconcile().await);
    assert_eq!(details.requests(), vec![440, 999]);

    let rerun = FakeDetails::new(&[]);
    let context = expect_ready(
        driver(temp_dir.path(), FakeCatalog::failing(), &rerun, pipeline(100, 0))
            .reconcile()
            .await,
    );
    assert!(rerun.requests().is_empty());
    assert!(context.skip_set.contains(999));
    assert!(!context.store.contains(999));
}

// ============================================================================
// Checkpoints and budget
// ============================================================================

#[tokio::test]
async fn test_checkpoints_reach_disk_during_the_cycle() {
    let temp_dir = TempDir::new().unwrap();
    let files = DataFiles::in_dir(temp_dir.path());
    let details = FakeDetails::observing(
        &[
            (70, Reply::Found("Half-Life")),
            (220, Reply::Found("Half-Life 2")),
            (400, Reply::Found("Portal")),
            (620, Reply::Found("Portal 2")),
            (440, Reply::Found("Team Fortress 2")),
        ],
        files.clone(),
    );

    let context = expect_ready(
        driver(temp_dir.path(), five_games(), &details, pipeline(2, 0))
            .reconcile()
            .await,
    );

    // Store on disk before each request: flushed after every second outcome
    assert_eq!(details.observed(), vec![0, 0, 2, 2, 4]);
    assert_eq!(files.load_store().unwrap().len(), 5);
    assert_eq!(context.store.len(), 5);
}

#[tokio::test]
async fn test_skipped_ids_count_toward_checkpoint_period() {
    let temp_dir = TempDir::new().unwrap();
    let files = DataFiles::in_dir(temp_dir.path());
    let details = FakeDetails::observing(
        &[
            (70, Reply::Unknown),
            (220, Reply::Found("Half-Life 2")),
            (400, Reply::Unknown),
            (620, Reply::Found("Portal 2")),
            (440, Reply::Unknown),
        ],
        files.clone(),
    );

    expect_ready(
        driver(temp_dir.path(), five_games(), &details, pipeline(2, 0))
            .reconcile()
            .await,
    );

    assert_eq!(details.observed(), vec![0, 0, 1, 1, 2]);
    assert_eq!(files.load_skip_set().unwrap().len(), 3);
}

#[tokio::test]
async fn test_run_budget_spreads_work_over_runs() {
    let temp_dir = TempDir::new().unwrap();
    let details = five_found();

    let first = expect_ready(
        driver(temp_dir.path(), five_games(), &details, pipeline(100, 2))
            .reconcile()
            .await,
    );
    assert_eq!(first.store.len(), 2);
    assert_eq!(first.shortfall, 3);
    assert_eq!(details.requests(), vec![70, 220]);

    let second = expect_ready(
        driver(temp_dir.path(), FakeCatalog::failing(), &details, pipeline(100, 2))
            .reconcile()
            .await,
    );
    assert_eq!(second.store.len(), 4);
    assert_eq!(second.shortfall, 1);

    let third = expect_ready(
        driver(temp_dir.path(), FakeCatalog::failing(), &details, pipeline(100, 2))
            .reconcile()
            .await,
    );
    assert_eq!(third.store.len(), 5);
    assert_eq!(third.shortfall, 0);

    // Every earlier record survives each later run unchanged
    for id in first.store.ids() {
        assert_eq!(third.store.get(id), first.store.get(id));
    }
    assert_eq!(details.requests(), vec![70, 220, 400, 620, 440]);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_transient_failure_is_retried_next_run() {
    let temp_dir = TempDir::new().unwrap();
    let details = FakeDetails::new(&[
        (440, Reply::Found("Team Fortress 2")),
        (10, Reply::Fail),
        (10, Reply::Found("Counter-Strike")),
    ]);
    let catalog = FakeCatalog::new(&[(440, "Team Fortress 2"), (10, "Counter-Strike")]);

    let first = expect_ready(driver(temp_dir.path(), catalog, &details, pipeline(100, 0)).reconcile().await);
    assert!(!first.store.contains(10));
    assert!(!first.skip_set.contains(10));
    assert_eq!(first.shortfall, 1);

    let second = expect_ready(
        driver(temp_dir.path(), FakeCatalog::failing(), &details, pipeline(100, 0))
            .reconcile()
            .await,
    );
    assert_eq!(second.store.get(10).unwrap().name, "Counter-Strike");
    assert_eq!(second.shortfall, 0);
    assert_eq!(details.requests(), vec![440, 10, 10]);
}

#[tokio::test]
async fn test_consecutive_failures_end_the_cycle() {
    let temp_dir = TempDir::new().unwrap();
    let files = DataFiles::in_dir(temp_dir.path());
    let details = FakeDetails::new(&[
        (1, Reply::Found("First")),
        (2, Reply::Fail),
        (3, Reply::Fail),
        (4, Reply::Found("Fourth")),
    ]);

    let mut index = NameIndex::new();
    for (id, name) in [(1, "first"), (2, "second"), (3, "third"), (4, "fourth")] {
        index.push(name.to_string(), id);
    }
    let mut store = MetadataStore::new();
    let mut skip_set = SkipSet::new();

    let settings = FetchSettings {
        checkpoint_period: 100,
        run_budget: None,
        max_consecutive_failures: Some(2),
    };
    let report = MetadataFetcher::new(&details, &files, settings)
        .fetch_all(&index, &mut store, &mut skip_set)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::ProviderUnavailable);
    assert_eq!(report.attempted, 3);
    assert_eq!(report.failed, 2);
    assert_eq!(report.shortfall, 3);
    assert_eq!(details.requests(), vec![1, 2, 3]);

    // The final merge still lands on disk
    assert!(files.load_store().unwrap().contains(1));
}

#[tokio::test]
async fn test_malformed_answers_do_not_stall_later_runs() {
    let temp_dir = TempDir::new().unwrap();
    let files = DataFiles::in_dir(temp_dir.path());
    // 2 and 3 are throttled on the first run, then come back malformed for good
    let details = FakeDetails::new(&[
        (1, Reply::Found("First")),
        (2, Reply::Fail),
        (2, Reply::Malformed),
        (3, Reply::Fail),
        (3, Reply::Malformed),
        (4, Reply::Found("Fourth")),
    ]);

    let mut index = NameIndex::new();
    for (id, name) in [(1, "first"), (2, "second"), (3, "third"), (4, "fourth")] {
        index.push(name.to_string(), id);
    }
    let settings = FetchSettings {
        checkpoint_period: 100,
        run_budget: None,
        max_consecutive_failures: Some(2),
    };
    let mut store = MetadataStore::new();
    let mut skip_set = SkipSet::new();

    let first = MetadataFetcher::new(&details, &files, settings.clone())
        .fetch_all(&index, &mut store, &mut skip_set)
        .await
        .unwrap();
    assert_eq!(first.stop_reason, StopReason::ProviderUnavailable);
    assert_eq!(details.requests(), vec![1, 2, 3]);

    let mut store = files.load_store().unwrap();
    let mut skip_set = files.load_skip_set().unwrap();
    let second = MetadataFetcher::new(&details, &files, settings)
        .fetch_all(&index, &mut store, &mut skip_set)
        .await
        .unwrap();

    assert_eq!(second.stop_reason, StopReason::Exhausted);
    assert_eq!(second.failed, 2);
    assert_eq!(details.requests(), vec![1, 2, 3, 2, 3, 4]);
    assert_eq!(store.get(4).unwrap().name, "Fourth");
    // Malformed ids stay eligible, never skipped
    assert!(!skip_set.contains(2));
    assert!(!skip_set.contains(3));
    assert_eq!(second.shortfall, 2);
}

#[tokio::test]
async fn test_connect_failure_still_reaches_ready() {
    let temp_dir = TempDir::new().unwrap();
    let details = FakeDetails::refusing();

    let mut driver = driver(temp_dir.path(), FakeCatalog::new(CATALOG), &details, pipeline(100, 0));
    let context = expect_ready(driver.reconcile().await);

    assert_eq!(driver.state(), ReconcileState::Ready);
    assert!(context.store.is_empty());
    assert_eq!(context.shortfall, 3);
    assert!(DataFiles::in_dir(temp_dir.path()).index_path.exists());
}

#[tokio::test]
async fn test_catalog_failure_blocks_without_index() {
    let temp_dir = TempDir::new().unwrap();
    let details = FakeDetails::new(&[]);

    let mut driver = driver(temp_dir.path(), FakeCatalog::failing(), &details, pipeline(100, 0));
    let outcome = driver.reconcile().await;

    assert!(matches!(outcome, ReconcileOutcome::Blocked(BlockReason::RateLimited(_))));
    assert_eq!(driver.state(), ReconcileState::BlockedRateLimited);
    assert!(!DataFiles::in_dir(temp_dir.path()).index_path.exists());
    assert!(details.requests().is_empty());
}

#[tokio::test]
async fn test_corrupt_store_blocks_and_is_left_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let files = DataFiles::in_dir(temp_dir.path());
    let mut index = NameIndex::new();
    index.push("teamfortress2".to_string(), 440);
    files.save_index(&index).unwrap();
    std::fs::write(&files.store_path, "{\"440\": {\"name\": ").unwrap();

    let details = FakeDetails::new(&[]);
    let mut driver = driver(temp_dir.path(), FakeCatalog::failing(), &details, pipeline(100, 0));
    let outcome = driver.reconcile().await;

    assert!(matches!(outcome, ReconcileOutcome::Blocked(BlockReason::Storage(_))));
    assert_eq!(driver.state(), ReconcileState::BlockedStorage);
    assert_eq!(
        std::fs::read_to_string(&files.store_path).unwrap(),
        "{\"440\": {\"name\": "
    );
}

// ============================================================================
// Persisted state repair
// ============================================================================

#[tokio::test]
async fn test_legacy_records_are_refetched() {
    let temp_dir = TempDir::new().unwrap();
    let files = DataFiles::in_dir(temp_dir.path());
    let mut index = NameIndex::new();
    index.push("teamfortress2".to_string(), 440);
    index.push("counterstrike".to_string(), 10);
    files.save_index(&index).unwrap();

    // 440 predates has_release_date; 10 is current
    std::fs::write(
        &files.store_path,
        r#"{
            "440": {"name": "Team Fortress 2", "developers": ["Valve"], "publishers": ["Valve"], "tag_ids": []},
            "10": {"name": "Counter-Strike", "developers": [], "publishers": [], "tag_ids": [], "has_release_date": false}
        }"#,
    )
    .unwrap();

    let details = FakeDetails::new(&[(440, Reply::Found("Team Fortress 2"))]);
    let context = expect_ready(
        driver(temp_dir.path(), FakeCatalog::failing(), &details, pipeline(100, 0))
            .reconcile()
            .await,
    );

    assert_eq!(details.requests(), vec![440]);
    assert_eq!(context.store.len(), 2);
    assert_eq!(context.shortfall, 0);
}

#[tokio::test]
async fn test_overlap_between_store_and_skip_set_is_repaired() {
    let temp_dir = TempDir::new().unwrap();
    let files = DataFiles::in_dir(temp_dir.path());
    let mut index = NameIndex::new();
    index.push("teamfortress2".to_string(), 440);
    index.push("mysterygame".to_string(), 999);
    files.save_index(&index).unwrap();

    let mut store = MetadataStore::new();
    store.insert_new(440, record("Team Fortress 2"));
    files.save_store(&store).unwrap();
    let mut skip_set = SkipSet::new();
    skip_set.insert(440);
    skip_set.insert(999);
    files.save_skip_set(&skip_set).unwrap();

    let details = FakeDetails::new(&[]);
    let context = expect_ready(
        driver(temp_dir.path(), FakeCatalog::failing(), &details, pipeline(100, 0))
            .reconcile()
            .await,
    );

    assert!(context.store.contains(440));
    assert!(!context.skip_set.contains(440));
    assert!(context.skip_set.contains(999));
    assert!(details.requests().is_empty());

    // The repair is persisted even though no fetch ran
    let on_disk = files.load_skip_set().unwrap();
    assert!(!on_disk.contains(440));
    assert!(on_disk.contains(999));
}

#[tokio::test]
async fn test_status_handle_tracks_progress() {
    let temp_dir = TempDir::new().unwrap();
    let details = five_found();
    let status = Arc::new(tokio::sync::RwLock::new(Default::default()));

    let mut driver = ReconciliationDriver::new(
        Arc::new(five_games()),
        Arc::new(details.clone()),
        DataFiles::in_dir(temp_dir.path()),
        PipelineConfig {
            run_budget: 3,
            ..pipeline(100, 0)
        },
    )
    .with_status(Arc::clone(&status));
    expect_ready(driver.reconcile().await);

    let status = status.read().await;
    assert_eq!(status.state, ReconcileState::Ready);
    assert_eq!(status.expected, 5);
    assert_eq!(status.resolved, 3);
    assert_eq!(status.shortfall, 2);
}
