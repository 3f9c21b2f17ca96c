//! Specscan Core Integration Tests
//!
//! These run against file-backed databases to cover what the in-memory unit
//! tests cannot: reopening, reset, and migration state on disk.

use chrono::Duration;
use specscan_core::{
    CleanupReport, Store,
    config::Config,
    domain::components::ComponentCacheRepository,
    domain::datasheets::DatasheetRecord,
    domain::history::{BoundingBox, Claim, ScanComponent, ScanVerdict, VerdictKind},
    domain::{ComponentCategory, ComponentSpecs, SourceType, SpecSource, SpecValue},
    hash::content_hash,
    storage::{CURRENT_VERSION, Database, DatabaseConfig},
};
use tempfile::TempDir;

fn file_db(dir: &TempDir) -> Database {
    Database::new(DatabaseConfig::with_path(dir.path().join("specscan.db")))
}

fn lm2596() -> ComponentSpecs {
    ComponentSpecs::new(
        "LM2596",
        "TI",
        ComponentCategory::DcDcConverter,
        SpecSource::new(SourceType::Datasheet, 0.95).with_url("https://www.ti.com/lit/ds/lm2596.pdf"),
    )
    .with_spec("max_output_current", SpecValue::nominal(3.0, "A"))
    .with_spec("input_voltage", SpecValue::range(Some(4.5), Some(40.0), "V"))
    .with_datasheet_url("https://www.ti.com/lit/ds/lm2596.pdf")
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = Config::default();

    {
        let store = Store::new(file_db(&dir), &config);
        store.components().cache(&lm2596()).await.unwrap();
        store
            .saved()
            .save(&lm2596(), Some("bench supply"), Some(["buck".to_string()].as_slice()))
            .await
            .unwrap();
        store.database().close().await;
    }

    let store = Store::new(file_db(&dir), &config);
    let cached = store
        .components()
        .get_by_part_number("LM2596")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.specs.len(), 2);
    assert!(store.saved().is_saved("LM2596", "TI").await.unwrap());

    let status = store.database().migration_status().await.unwrap();
    assert_eq!(status.current_version, CURRENT_VERSION);
    assert!(!status.needs_migration);
}

#[tokio::test]
async fn test_ttl_expiry_scenario() {
    let dir = TempDir::new().unwrap();
    let repo = ComponentCacheRepository::new(file_db(&dir)).with_ttl(Duration::milliseconds(200));

    repo.cache(&lm2596()).await.unwrap();
    assert!(repo.get_by_part_number("LM2596").await.unwrap().is_some());

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;

    assert!(repo.get_by_part_number("LM2596").await.unwrap().is_none());
    assert_eq!(repo.clean_expired().await.unwrap(), 1);
    assert_eq!(repo.get_stats().await.unwrap().total_count, 0);
}

#[tokio::test]
async fn test_history_retention_on_disk() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.history.retention_limit = 50;
    let store = Store::new(file_db(&dir), &config);

    let mut ids = Vec::new();
    for n in 1..=60 {
        let id = store
            .history()
            .save(
                &Claim::new(format!("{}mAh", n * 1000)).with_value((n * 1000) as f64, "mAh"),
                &ScanVerdict::new(VerdictKind::Questionable),
                &[ScanComponent::new("18650", "Generic", ComponentCategory::Battery, 0.6)
                    .with_bounding_box(BoundingBox {
                        x: 0.0,
                        y: 0.0,
                        width: 1.0,
                        height: 1.0,
                    })],
            )
            .await
            .unwrap();
        ids.push(id);
    }

    assert_eq!(store.history().get_count().await.unwrap(), 50);

    let recent = store.history().get_recent(50, 0).await.unwrap();
    let eleventh = store.history().get_by_id(ids[10]).await.unwrap().unwrap();
    assert!(recent[49].created_at >= eleventh.created_at);
    assert!(store.history().get_by_id(ids[9]).await.unwrap().is_none());

    let children: i64 = store
        .database()
        .query_scalar(sqlx::query_scalar("SELECT COUNT(*) FROM scan_components"))
        .await
        .unwrap();
    assert_eq!(children, 50);
}

#[tokio::test]
async fn test_datasheet_change_detection_workflow() {
    let dir = TempDir::new().unwrap();
    let store = Store::new(file_db(&dir), &Config::default());
    let url = "https://www.ti.com/lit/ds/lm2596.pdf";
    let document = b"%PDF-1.4 LM2596 rev C";

    assert!(
        store
            .datasheets()
            .has_content_changed(url, &content_hash(document))
            .await
            .unwrap()
    );

    store
        .datasheets()
        .cache(&DatasheetRecord::from_content(url, "LM2596", document).with_page_count(38))
        .await
        .unwrap();

    // Re-fetch of the same bytes: nothing to re-parse
    assert!(
        !store
            .datasheets()
            .has_content_changed(url, &content_hash(document))
            .await
            .unwrap()
    );
    assert!(
        store
            .datasheets()
            .has_content_changed(url, &content_hash(b"%PDF-1.4 LM2596 rev D"))
            .await
            .unwrap()
    );

    let cached = store
        .datasheets()
        .get_by_part_number("LM2596")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.url, url);
    assert_eq!(cached.page_count, Some(38));
}

#[tokio::test]
async fn test_reset_recreates_empty_store() {
    let dir = TempDir::new().unwrap();
    let store = Store::new(file_db(&dir), &Config::default());

    store.components().cache(&lm2596()).await.unwrap();
    store.saved().save(&lm2596(), None, None).await.unwrap();

    store.database().reset().await.unwrap();

    let stats = store.stats().await;
    assert_eq!(stats.components.unwrap().total_count, 0);
    assert_eq!(stats.saved_count, Some(0));
    assert_eq!(
        store.database().migration_status().await.unwrap().current_version,
        CURRENT_VERSION
    );
}

#[tokio::test]
async fn test_clean_expired_on_fresh_store() {
    let dir = TempDir::new().unwrap();
    let store = Store::new(file_db(&dir), &Config::default());
    assert_eq!(store.clean_expired().await.unwrap(), CleanupReport::default());
}

#[tokio::test]
async fn test_concurrent_repositories_share_one_handle() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir);
    let store = Store::new(db.clone(), &Config::default());

    let components = store.components().clone();
    let saved = store.saved().clone();
    let history = store.history().clone();

    let part = lm2596();
    let claim = Claim::new("3A");
    let verdict = ScanVerdict::new(VerdictKind::Plausible);

    let (r1, r2, r3) = tokio::join!(
        components.cache(&part),
        saved.save(&part, None, None),
        history.save(&claim, &verdict, &[]),
    );
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();

    assert_eq!(db.connect_count(), 1);
}

#[tokio::test]
async fn test_repository_calls_run_on_spawned_tasks() {
    let dir = TempDir::new().unwrap();
    let db = file_db(&dir);
    let store = Store::new(db.clone(), &Config::default());

    let mut handles = Vec::new();
    for n in 0..8 {
        let components = store.components().clone();
        let history = store.history().clone();
        handles.push(tokio::spawn(async move {
            let part = ComponentSpecs::new(
                format!("PART-{n}"),
                "Acme",
                ComponentCategory::Other,
                SpecSource::new(SourceType::Manual, 1.0),
            );
            components.cache(&part).await?;
            history
                .save(&Claim::new(format!("{n}V")), &ScanVerdict::new(VerdictKind::Unknown), &[])
                .await?;
            components.get_by_part_number(&format!("PART-{n}")).await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_some());
    }

    assert_eq!(store.components().get_stats().await.unwrap().total_count, 8);
    assert_eq!(store.history().get_count().await.unwrap(), 8);
    assert_eq!(db.connect_count(), 1);
}
