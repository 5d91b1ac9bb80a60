//! Job lifecycle integration tests.
//!
//! Drives download jobs end to end over HTTP: creation, background
//! execution on the worker pool, artifact streaming and failure recording.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{start_download, test_config, TestHarness};
use mg_core::JobStatus;
use mg_engine::testing::ScriptedEngine;
use serde_json::json;

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mp3_job_completes_and_artifact_is_fetchable() {
    let (harness, addr) = TestHarness::with_server().await;

    let task_id = start_download(addr, json!({"url": "https://example.com/v", "format_type": "mp3"})).await;
    let snapshot = harness.wait_terminal(&task_id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.progress, 100.0);
    assert_eq!(snapshot.filename, "Scripted Clip.mp3");

    let resp = reqwest::get(format!("http://{addr}/api/download/{task_id}")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/octet-stream");
    let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("Scripted%20Clip.mp3"));
    assert_eq!(resp.headers()["content-length"], "14");

    let bytes = resp.bytes().await.unwrap();
    assert_eq!(&bytes[..], b"scripted media");

    // The artifact lives in the job's own directory.
    assert!(harness
        .downloads_dir()
        .join(&task_id)
        .join("Scripted Clip.mp3")
        .exists());
}

#[tokio::test]
async fn job_snapshot_and_listing() {
    let (harness, addr) = TestHarness::with_server().await;

    let first = start_download(addr, json!({"url": "https://example.com/a", "format_type": "video", "quality": "720p"})).await;
    harness.wait_terminal(&first).await;
    let second = start_download(addr, json!({"url": "https://example.com/b", "format_type": "mp3"})).await;
    harness.wait_terminal(&second).await;

    let resp = reqwest::get(format!("http://{addr}/api/jobs/{first}")).await.unwrap();
    let snap: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(snap["status"], "completed");
    assert_eq!(snap["filename"], "Scripted Clip.mp4");
    assert!(snap["error"].is_null());

    let resp = reqwest::get(format!("http://{addr}/api/jobs")).await.unwrap();
    let jobs: serde_json::Value = resp.json().await.unwrap();
    let ids: Vec<&str> = jobs.as_array().unwrap().iter().map(|j| j["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);
    assert_eq!(jobs[1]["quality"], "720p");

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    let health: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(health["jobs"]["completed"], 2);
}

#[tokio::test]
async fn quality_defaults_to_best() {
    let (harness, addr) = TestHarness::with_server().await;

    let task_id = start_download(addr, json!({"url": "https://example.com/v", "format_type": "video"})).await;
    harness.wait_terminal(&task_id).await;

    let jobs = harness.ctx.registry.list_jobs();
    assert_eq!(jobs[0].quality, "best");
}

// ---------------------------------------------------------------------------
// Fetch errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_before_completion_is_400() {
    let (engine, gate) = ScriptedEngine::new().gated();
    let (harness, addr) = TestHarness::with_engine(engine).serve().await;

    let task_id = start_download(addr, json!({"url": "https://example.com/v", "format_type": "mp3"})).await;

    let resp = reqwest::get(format!("http://{addr}/api/download/{task_id}")).await.unwrap();
    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["code"], "not_ready");

    gate.open();
    let snapshot = harness.wait_terminal(&task_id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);

    let resp = reqwest::get(format!("http://{addr}/api/download/{task_id}")).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn fetch_unknown_job_is_404() {
    let (_harness, addr) = TestHarness::with_server().await;

    let resp = reqwest::get(format!("http://{addr}/api/download/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn fetch_with_missing_file_is_404() {
    let (harness, addr) = TestHarness::with_server().await;

    let task_id = start_download(addr, json!({"url": "https://example.com/v", "format_type": "mp3"})).await;
    harness.wait_terminal(&task_id).await;
    std::fs::remove_file(harness.downloads_dir().join(&task_id).join("Scripted Clip.mp3")).unwrap();

    let resp = reqwest::get(format!("http://{addr}/api/download/{task_id}")).await.unwrap();
    assert_eq!(resp.status(), 404);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_failure_is_recorded_on_the_job() {
    let engine = ScriptedEngine::new().with_retrieve_error("ERROR: Video unavailable");
    let (harness, addr) = TestHarness::with_engine(engine).serve().await;

    let task_id = start_download(addr, json!({"url": "https://example.com/gone", "format_type": "video"})).await;
    let snapshot = harness.wait_terminal(&task_id).await;
    assert_eq!(snapshot.status, JobStatus::Error);
    assert_eq!(snapshot.error.as_deref(), Some("ERROR: Video unavailable"));

    let resp = reqwest::get(format!("http://{addr}/api/download/{task_id}")).await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn missing_artifact_fails_the_job() {
    let (harness, addr) = TestHarness::with_engine(ScriptedEngine::new().without_artifact())
        .serve()
        .await;

    let task_id = start_download(addr, json!({"url": "https://example.com/v", "format_type": "mp3"})).await;
    let snapshot = harness.wait_terminal(&task_id).await;
    assert_eq!(snapshot.status, JobStatus::Error);
    assert_eq!(snapshot.error.as_deref(), Some("artifact not found"));
}

// ---------------------------------------------------------------------------
// Bounded execution
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_jobs_respect_capacity() {
    let mut config = test_config();
    config.workers.capacity = 2;
    let engine = ScriptedEngine::new().with_step_delay(Duration::from_millis(20));
    let (harness, addr) = TestHarness::build(config, engine).serve().await;

    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(start_download(addr, json!({"url": format!("https://example.com/{i}"), "format_type": "mp3"})).await);
    }

    for id in &ids {
        let snapshot = harness.wait_terminal(id).await;
        assert_eq!(snapshot.status, JobStatus::Completed);
    }

    let engine: &Arc<ScriptedEngine> = &harness.engine;
    assert_eq!(engine.retrieve_calls(), 6);
    assert!(engine.max_in_flight() <= 2);
    assert_eq!(harness.ctx.registry.counts().completed, 6);

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 6);
}
