use anyhow::Result;
use animeflix_model::{ImportReport, StorageStats, SweepReport, routes::v1};
use axum::http::StatusCode;
use serde_json::{Value, json};

#[path = "support/mod.rs"]
mod support;

use support::{
    TestOptions, build_test_app, build_test_app_with, sample_bytes, stream_path, upload,
    wait_for_cache_entries,
};

#[tokio::test]
async fn storage_stats_reflect_uploads_and_accesses() -> Result<()> {
    let app = build_test_app().await?;
    let receipt = upload(&app.server, "a.mp4", &sample_bytes(100)).await;
    upload(&app.server, "b.mp4", &sample_bytes(250)).await;
    app.server.get(&stream_path(receipt.id)).await.assert_status_ok();

    let stats: StorageStats = app.server.get(v1::storage::STATS).await.json();
    assert_eq!(stats.video_count, 2);
    assert_eq!(stats.total_size, 350);
    assert_eq!(stats.total_access_count, 1);
    assert_eq!(stats.max_size, None);
    Ok(())
}

#[tokio::test]
async fn sweep_uses_configured_policy_or_request_overrides() -> Result<()> {
    let app = build_test_app_with(TestOptions {
        cache_enabled: false,
        ..TestOptions::default()
    })
    .await?;
    let watched = upload(&app.server, "watched.mp4", &sample_bytes(100)).await;
    let unwatched = upload(&app.server, "unwatched.mp4", &sample_bytes(40)).await;
    app.server.get(&stream_path(watched.id)).await.assert_status_ok();

    let report: SweepReport = app.server.post(v1::storage::SWEEP).await.json();
    assert_eq!(report, SweepReport::default());

    let response = app
        .server
        .post(v1::storage::SWEEP)
        .json(&json!({ "maxAgeDays": 0, "minAccessCount": 1 }))
        .await;
    response.assert_status_ok();
    let report: SweepReport = response.json();
    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.freed_bytes, 40);

    assert!(app.state.store.lookup_by_id(&unwatched.id).await.is_none());
    assert!(app.state.store.lookup_by_id(&watched.id).await.is_some());
    app.server
        .get(&stream_path(unwatched.id))
        .await
        .assert_status_not_found();

    app.server
        .post(v1::storage::SWEEP)
        .json(&json!({ "maxAge": "yesterday" }))
        .await
        .assert_status_bad_request();
    Ok(())
}

#[tokio::test]
async fn import_ingests_video_files_from_a_directory() -> Result<()> {
    let app = build_test_app().await?;
    let source = tempfile::tempdir()?;
    std::fs::write(source.path().join("01.mp4"), sample_bytes(300))?;
    std::fs::write(source.path().join("02.MKV"), sample_bytes(301))?;
    std::fs::write(source.path().join("01-copy.mp4"), sample_bytes(300))?;
    std::fs::write(source.path().join("notes.txt"), b"not a video")?;

    let response = app
        .server
        .post(v1::storage::IMPORT)
        .json(&json!({ "path": source.path() }))
        .await;
    response.assert_status_ok();
    let report: ImportReport = response.json();

    assert_eq!(report.total_files, 3);
    assert_eq!(report.imported, 3);
    assert!(report.failed.is_empty());
    let deduplicated = report.videos.iter().filter(|v| v.deduplicated).count();
    assert_eq!(deduplicated, 1);
    assert_eq!(app.state.store.storage_stats().await.video_count, 2);

    app.server
        .post(v1::storage::IMPORT)
        .json(&json!({ "path": source.path().join("missing") }))
        .await
        .assert_status_not_found();
    Ok(())
}

#[tokio::test]
async fn cache_can_be_inspected_warmed_and_cleared() -> Result<()> {
    let app = build_test_app().await?;
    let receipt = upload(&app.server, "clip.mp4", &sample_bytes(400)).await;
    app.server.get(&stream_path(receipt.id)).await.assert_status_ok();
    wait_for_cache_entries(&app.state, 1).await;

    let stats: Value = app.server.get(v1::cache::STATS).await.json();
    assert_eq!(stats["entryCount"], 1);
    assert_eq!(stats["totalSize"], 400);
    assert_eq!(stats["maxSize"], 1024 * 1024);
    assert_eq!(stats["entries"][0]["videoId"], receipt.id.to_string());

    let cleared: Value = app.server.delete(v1::cache::ROOT).await.json();
    assert_eq!(cleared["removedEntries"], 1);
    assert_eq!(cleared["freedBytes"], 400);

    let warmed: Value = app
        .server
        .post(v1::cache::WARM)
        .add_query_param("limit", 10)
        .await
        .json();
    assert_eq!(warmed["considered"], 1);
    assert_eq!(warmed["populated"], 1);

    let stats: Value = app.server.get(v1::cache::STATS).await.json();
    assert_eq!(stats["entryCount"], 1);

    let record = app.state.store.lookup_by_id(&receipt.id).await.unwrap();
    assert_eq!(record.access_count, 1, "warm-up reads are not accesses");
    Ok(())
}

#[tokio::test]
async fn cache_endpoints_report_disabled_cache() -> Result<()> {
    let app = build_test_app_with(TestOptions {
        cache_enabled: false,
        ..TestOptions::default()
    })
    .await?;

    app.server
        .get(v1::cache::STATS)
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    app.server
        .delete(v1::cache::ROOT)
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let health: Value = app.server.get(v1::HEALTH).await.json();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["checks"]["cache"]["status"], "disabled");
    Ok(())
}

#[tokio::test]
async fn health_reports_store_and_cache() -> Result<()> {
    let app = build_test_app().await?;
    upload(&app.server, "a.mp4", &sample_bytes(8)).await;

    let response = app.server.get(v1::HEALTH).await;
    response.assert_status_ok();
    let health: Value = response.json();
    assert_eq!(health["checks"]["store"]["videos"], 1);
    assert_eq!(health["checks"]["cache"]["status"], "healthy");
    assert_eq!(health["checks"]["cache"]["maxBytes"], 1024 * 1024);
    Ok(())
}
