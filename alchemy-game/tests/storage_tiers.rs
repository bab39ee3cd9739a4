use std::sync::Arc;

use alchemy_game::{
    AlchemyEngine, EngineContext, EngineEvent, FileStore, IndexedStore, KeyValueStore,
    ManualClock, MemoryStore, RuleTableSource, StaticPuzzleSource, TieredStorage,
};
use chrono::NaiveDate;
use tempfile::TempDir;

fn offline_ctx(storage: Arc<TieredStorage>) -> EngineContext {
    let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    EngineContext::new(
        storage,
        Arc::new(RuleTableSource::bundled()),
        Arc::new(StaticPuzzleSource::bundled()),
        Arc::new(ManualClock::at_date(today)),
    )
}

#[tokio::test]
async fn standard_tiers_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    {
        let storage = TieredStorage::standard(dir.path());
        storage.set("alchemy_probe", "{\"n\":1}").await.unwrap();
        assert_eq!(storage.active_tier(), Some("file"));
    }
    let reopened = TieredStorage::standard(dir.path());
    assert_eq!(
        reopened.get("alchemy_probe").await.unwrap().as_deref(),
        Some("{\"n\":1}")
    );
    assert!(reopened.take_degraded_warning().is_none());
}

#[tokio::test]
async fn full_file_tier_falls_back_to_the_index() {
    let dir = TempDir::new().unwrap();
    let storage = TieredStorage::new(vec![
        Arc::new(FileStore::new(dir.path().join("kv")).with_quota(8)),
        Arc::new(IndexedStore::open(dir.path().join("index.json"))),
        Arc::new(MemoryStore::new()),
    ]);

    storage.set("alchemy_small", "1").await.unwrap();
    assert_eq!(storage.active_tier(), Some("file"));

    storage
        .set("alchemy_large", "a value well past the file quota")
        .await
        .unwrap();
    assert_eq!(storage.active_tier(), Some("indexed"));
    assert!(!storage.is_memory_only());
    assert!(storage.take_degraded_warning().is_none());

    // Reads still find what the first tier kept.
    assert_eq!(storage.get("alchemy_small").await.unwrap().as_deref(), Some("1"));
    assert!(storage.get("alchemy_large").await.unwrap().is_some());
}

#[tokio::test]
async fn exhausted_durable_tiers_warn_once() {
    let dir = TempDir::new().unwrap();
    let storage = TieredStorage::new(vec![
        Arc::new(FileStore::new(dir.path().join("kv")).with_quota(4)),
        Arc::new(IndexedStore::open(dir.path().join("index.json")).with_quota(4)),
        Arc::new(MemoryStore::new()),
    ]);

    storage.set("alchemy_blob", "too big for either disk tier").await.unwrap();
    assert_eq!(storage.active_tier(), Some("memory"));
    assert!(storage.is_memory_only());
    assert!(storage.take_degraded_warning().is_some());
    assert!(storage.take_degraded_warning().is_none());
}

#[tokio::test]
async fn engine_reports_degraded_storage_as_an_event() {
    let storage = Arc::new(TieredStorage::new(vec![
        Arc::new(MemoryStore::new().with_quota(4)),
        Arc::new(MemoryStore::new()),
    ]));
    let engine = AlchemyEngine::load(offline_ctx(Arc::clone(&storage))).await;
    engine.open_today().await.unwrap();
    assert!(storage.is_memory_only());

    assert!(engine.storage_warning().is_some());
    assert!(
        engine
            .drain_events()
            .iter()
            .any(|e| matches!(e, EngineEvent::StorageDegraded(_)))
    );
    assert!(engine.storage_warning().is_none());
}

#[tokio::test]
async fn corrupt_stats_are_quarantined_and_recovered() {
    let storage = Arc::new(TieredStorage::in_memory());
    // Top-level shape is wrong but the per-day map is intact.
    let raw = r#"{
        "totalCompleted": "lots",
        "completedPuzzles": {
            "2024-12-30": {"completed": true, "timeSeconds": 80, "moves": 4, "hintsUsed": 0,
                "firstDiscoveries": 1, "perfectSolve": true, "isArchive": false,
                "timestamp": "2024-12-30T10:00:00Z"},
            "2024-12-31": {"completed": true, "timeSeconds": 40, "moves": 6, "hintsUsed": 1,
                "firstDiscoveries": 0, "perfectSolve": false, "isArchive": false,
                "timestamp": "2024-12-31T10:00:00Z"},
            "bogus": {"completed": "yes"}
        }
    }"#;
    storage.set("alchemy_stats", raw).await.unwrap();

    let engine = AlchemyEngine::load(offline_ctx(Arc::clone(&storage))).await;
    let stats = engine.stats().await;
    assert_eq!(stats.total_completed, 2);
    assert_eq!(stats.best_time, Some(40));
    assert_eq!(stats.current_streak, 2);
    assert_eq!(stats.longest_streak, 2);
    assert_eq!(stats.perfect_solves, 1);

    let keys = storage.keys().await.unwrap();
    let aside: Vec<_> = keys
        .iter()
        .filter(|k| k.starts_with("alchemy_stats.corrupt-"))
        .collect();
    assert_eq!(aside.len(), 1);
    assert_eq!(storage.get(aside[0]).await.unwrap().as_deref(), Some(raw));
    assert!(storage.get("alchemy_stats").await.unwrap().is_none());
}

#[tokio::test]
async fn unreadable_stats_start_fresh() {
    let storage = Arc::new(TieredStorage::in_memory());
    storage.set("alchemy_stats", "{not json").await.unwrap();

    let engine = AlchemyEngine::load(offline_ctx(Arc::clone(&storage))).await;
    assert_eq!(engine.stats().await.total_completed, 0);
    assert!(
        storage
            .keys()
            .await
            .unwrap()
            .iter()
            .any(|k| k.starts_with("alchemy_stats.corrupt-"))
    );
}
