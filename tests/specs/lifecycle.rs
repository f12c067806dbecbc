//! End-to-end lifecycle scenarios: spawner writes, operator checks,
//! waits, and kills.

use crate::prelude::World;
use dh_core::{Clock, JobPatch, JobStatus, Provider};
use dh_manager::{JobFilter, SignalError};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn full_lifecycle_check_then_kill_then_conflict() {
    let world = World::new();
    world.spawn_job(Provider::Codex, "ab12cd34", "refactor-parser", 4321);
    let manager = world.manager();

    // Operator checks on the fresh job.
    let status = manager.check_job_status(Provider::Codex, "ab12cd34").unwrap();
    assert!(status.contains("status: spawned"));

    // Spawner's poller observes it working.
    world
        .store
        .update_job(
            Provider::Codex,
            "ab12cd34",
            &JobPatch {
                status: Some(JobStatus::Running),
                ..Default::default()
            },
        )
        .unwrap();

    // User kills it; the signal lands.
    let out = manager.kill_job(Provider::Codex, "ab12cd34", "SIGTERM").unwrap();
    assert!(out.contains("Sent SIGTERM"));
    assert_eq!(world.signals.calls().len(), 1);

    // Spawner records the resulting death.
    world
        .store
        .update_job(
            Provider::Codex,
            "ab12cd34",
            &JobPatch {
                status: Some(JobStatus::Failed),
                error: Some("terminated by signal".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    // A second kill is a conflict, with no further OS call.
    let err = manager
        .kill_job(Provider::Codex, "ab12cd34", "SIGTERM")
        .unwrap_err();
    assert!(err.to_string().contains("terminal state"));
    assert_eq!(world.signals.calls().len(), 1);
}

#[test]
fn esrch_race_resolves_to_failed_when_job_stayed_active() {
    let world = World::new();
    world.spawn_job(Provider::Codex, "ab12cd34", "long-task", 12345);
    world
        .store
        .update_job(
            Provider::Codex,
            "ab12cd34",
            &JobPatch {
                status: Some(JobStatus::Running),
                ..Default::default()
            },
        )
        .unwrap();
    world.signals.queue_outcome(Err(SignalError::NoSuchProcess));

    world
        .manager()
        .kill_job(Provider::Codex, "ab12cd34", "SIGTERM")
        .unwrap();

    let job = world.store.get_job(Provider::Codex, "ab12cd34").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.killed_by_user);
    assert!(job.error.as_deref().is_some_and(|e| !e.is_empty()));
}

#[test]
fn permission_error_surfaces_without_touching_status() {
    let world = World::new();
    world.spawn_job(Provider::Gemini, "00ff00ff", "summarize", 999);
    world
        .signals
        .queue_outcome(Err(SignalError::Os("Operation not permitted".to_string())));

    let err = world
        .manager()
        .kill_job(Provider::Gemini, "00ff00ff", "SIGINT")
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to signal"));

    let job = world.store.get_job(Provider::Gemini, "00ff00ff").unwrap();
    assert_eq!(job.status, JobStatus::Spawned);
    assert_eq!(job.error, None);
}

#[tokio::test]
async fn wait_sees_the_spawner_finish_and_returns_the_response() {
    let world = World::new();
    let job = world.spawn_job(Provider::Codex, "ab12cd34", "write-tests", 777);
    let response_path = job.response_file.clone().unwrap();

    let store = Arc::clone(&world.store);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&response_path, "all tests written").unwrap();
        store
            .update_job(
                Provider::Codex,
                "ab12cd34",
                &JobPatch {
                    status: Some(JobStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();
    });

    let out = world
        .manager()
        .wait_for_job(Provider::Codex, "ab12cd34", 10_000)
        .await
        .unwrap();
    assert_eq!(out, "all tests written");
}

#[tokio::test]
async fn wait_timeout_is_clamped_and_side_effect_free() {
    let world = World::new();
    world.spawn_job(Provider::Codex, "ab12cd34", "never-ends", 777);

    let start = std::time::Instant::now();
    let err = world
        .manager()
        .wait_for_job(Provider::Codex, "ab12cd34", 0)
        .await
        .unwrap_err();
    assert!(start.elapsed() >= Duration::from_millis(1000));
    assert!(err.to_string().starts_with("Timed out waiting"));

    let job = world.store.get_job(Provider::Codex, "ab12cd34").unwrap();
    assert_eq!(job.status, JobStatus::Spawned);
}

#[test]
fn listing_spans_both_backends() {
    let world = World::new();
    world.spawn_job(Provider::Codex, "00000001", "in-store", 1);
    world.write_legacy(
        "gemini",
        "in-legacy",
        "00000002",
        r#"{"provider":"gemini","jobId":"00000002","slug":"in-legacy","status":"running","promptFile":"/p/x.md"}"#,
    );

    let out = world
        .manager()
        .list_jobs(None, JobFilter::Active, None)
        .unwrap();
    assert!(out.contains("in-store"));
    assert!(out.contains("in-legacy"));
}

#[test]
fn summary_reflects_live_state_for_compaction() {
    let world = World::new();
    world.spawn_job(Provider::Codex, "00000001", "active-one", 1);
    let done = world.spawn_job(Provider::Gemini, "00000002", "done-one", 2);
    world.clock.advance(5 * 60 * 1000);
    world
        .store
        .update_job(
            done.provider,
            &done.job_id,
            &JobPatch {
                status: Some(JobStatus::Completed),
                completed_at: chrono::DateTime::from_timestamp_millis(
                    world.clock.epoch_ms() as i64
                ),
                ..Default::default()
            },
        )
        .unwrap();

    let summary = world.store.pre_compact_summary();
    assert!(summary.contains("Active delegated jobs:"));
    assert!(summary.contains("active-one"));
    assert!(summary.contains("done-one"));
    assert!(summary.contains("Job stats: 2 total, 1 active, 1 completed, 0 failed"));
}
