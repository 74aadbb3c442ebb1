//! Integration tests for patch manifest sync: TTL gating, forced sync, and
//! patch file download, against a mockito HTTP server.

use chrono::{Duration, Utc};

use smol_builder::context::BuildContext;
use smol_builder::sync::{self, SyncCacheRecord};

const MANIFEST_BODY: &str = r#"{
    "22.12.0": ["22.12.0/backport.patch"]
}"#;

const PATCH_BODY: &str = "\
--- a/src/env.cc
+++ b/src/env.cc
@@ -1 +1 @@
-old
+new
";

fn context_for(server_url: &str) -> (tempfile::TempDir, BuildContext) {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = BuildContext::new(dir.path(), "22.12.0");
    ctx.manifest_base_url = server_url.to_string();
    ctx.ensure_dirs().unwrap();
    (dir, ctx)
}

fn fresh_record(ctx: &BuildContext, source: &str) {
    SyncCacheRecord {
        last_sync: Utc::now(),
        synced_versions: vec!["22.12.0".to_string()],
        source: source.to_string(),
    }
    .save(&ctx.sync_record_path)
    .unwrap();
}

// ============================================================================
// TTL GATING
// ============================================================================

#[tokio::test]
async fn fresh_record_skips_the_network_entirely() {
    let mut server = mockito::Server::new_async().await;
    let manifest_mock = server
        .mock("GET", "/manifest.json")
        .expect(0)
        .create_async()
        .await;

    let (_tmp, ctx) = context_for(&server.url());
    fresh_record(&ctx, &server.url());
    // Cache hit also requires the manifest file to be present locally.
    std::fs::write(ctx.manifest_path(), MANIFEST_BODY).unwrap();

    let fetched = sync::sync_if_needed(&ctx, Duration::hours(24), false)
        .await
        .unwrap();

    assert!(!fetched);
    manifest_mock.assert_async().await;
}

#[tokio::test]
async fn force_always_fetches_regardless_of_record_age() {
    let mut server = mockito::Server::new_async().await;
    let manifest_mock = server
        .mock("GET", "/manifest.json")
        .with_header("content-type", "application/json")
        .with_body(MANIFEST_BODY)
        .expect(1)
        .create_async()
        .await;
    let patch_mock = server
        .mock("GET", "/22.12.0/backport.patch")
        .with_body(PATCH_BODY)
        .expect(1)
        .create_async()
        .await;

    let (_tmp, ctx) = context_for(&server.url());
    fresh_record(&ctx, &server.url());
    std::fs::write(ctx.manifest_path(), MANIFEST_BODY).unwrap();

    let fetched = sync::sync_if_needed(&ctx, Duration::hours(24), true)
        .await
        .unwrap();

    assert!(fetched);
    manifest_mock.assert_async().await;
    patch_mock.assert_async().await;
}

#[tokio::test]
async fn stale_record_triggers_a_fetch() {
    let mut server = mockito::Server::new_async().await;
    let manifest_mock = server
        .mock("GET", "/manifest.json")
        .with_body(MANIFEST_BODY)
        .expect(1)
        .create_async()
        .await;
    let _patch_mock = server
        .mock("GET", "/22.12.0/backport.patch")
        .with_body(PATCH_BODY)
        .create_async()
        .await;

    let (_tmp, ctx) = context_for(&server.url());
    SyncCacheRecord {
        last_sync: Utc::now() - Duration::hours(48),
        synced_versions: vec![],
        source: server.url(),
    }
    .save(&ctx.sync_record_path)
    .unwrap();

    let fetched = sync::sync_if_needed(&ctx, Duration::hours(24), false)
        .await
        .unwrap();

    assert!(fetched);
    manifest_mock.assert_async().await;
}

#[tokio::test]
async fn missing_local_manifest_invalidates_a_fresh_record() {
    let mut server = mockito::Server::new_async().await;
    let manifest_mock = server
        .mock("GET", "/manifest.json")
        .with_body(MANIFEST_BODY)
        .expect(1)
        .create_async()
        .await;
    let _patch_mock = server
        .mock("GET", "/22.12.0/backport.patch")
        .with_body(PATCH_BODY)
        .create_async()
        .await;

    let (_tmp, ctx) = context_for(&server.url());
    fresh_record(&ctx, &server.url());
    // No manifest.json on disk: the record alone must not produce a hit.

    let fetched = sync::sync_if_needed(&ctx, Duration::hours(24), false)
        .await
        .unwrap();
    assert!(fetched);
    manifest_mock.assert_async().await;
}

// ============================================================================
// SYNC RESULTS ON DISK
// ============================================================================

#[tokio::test]
async fn sync_writes_patches_manifest_and_record() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/manifest.json")
        .with_body(MANIFEST_BODY)
        .create_async()
        .await;
    server
        .mock("GET", "/22.12.0/backport.patch")
        .with_body(PATCH_BODY)
        .create_async()
        .await;

    let (_tmp, ctx) = context_for(&server.url());
    let fetched = sync::sync_if_needed(&ctx, Duration::hours(24), false)
        .await
        .unwrap();
    assert!(fetched);

    // Patch file landed where the manifest said.
    let patch = ctx.patches_dir.join("22.12.0/backport.patch");
    assert_eq!(std::fs::read_to_string(patch).unwrap(), PATCH_BODY);

    // Local manifest copy is readable through the context memoization.
    let manifest = ctx.manifest().expect("manifest should load");
    assert_eq!(
        manifest.files_for("22.12.0").unwrap(),
        ["22.12.0/backport.patch"]
    );

    // Record was rewritten with the synced versions.
    let record = SyncCacheRecord::load(&ctx.sync_record_path).unwrap();
    assert_eq!(record.synced_versions, ["22.12.0"]);
    assert_eq!(record.source, server.url());
}

#[tokio::test]
async fn server_error_surfaces_as_sync_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/manifest.json")
        .with_status(500)
        .create_async()
        .await;

    let (_tmp, ctx) = context_for(&server.url());
    let result = sync::sync_if_needed(&ctx, Duration::hours(24), false).await;
    assert!(result.is_err());

    // A failed sync must not rewrite the record.
    assert!(SyncCacheRecord::load(&ctx.sync_record_path).is_none());
}

#[tokio::test]
async fn unsafe_manifest_paths_are_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/manifest.json")
        .with_body(r#"{"22.12.0": ["../../escape.patch"]}"#)
        .create_async()
        .await;

    let (_tmp, ctx) = context_for(&server.url());
    let result = sync::sync_if_needed(&ctx, Duration::hours(24), false).await;
    assert!(result.is_err());
}
