//! Legacy-to-store migration scenarios.

use crate::prelude::World;
use dh_core::{JobStatus, Provider};

#[test]
fn migration_backfills_the_store_and_tolerates_bad_files() {
    let world = World::new();
    world.write_legacy(
        "codex",
        "old-one",
        "aaaa0001",
        r#"{"provider":"codex","jobId":"aaaa0001","slug":"old-one","status":"completed","promptFile":"/p/a.md","responseFile":"/r/a.md","spawnedAt":"2026-02-01T08:00:00Z"}"#,
    );
    world.write_legacy(
        "gemini",
        "old-two",
        "aaaa0002",
        r#"{"provider":"gemini","jobId":"aaaa0002","slug":"old-two","status":"failed","error":"exit status 2","promptFile":"/p/b.md"}"#,
    );
    world.write_legacy("codex", "torn-write", "aaaa0003", r#"{"provider":"codex","job"#);

    let report = world
        .store
        .migrate_from_json_files(world.prompts.path())
        .unwrap();
    assert_eq!(report.imported, 2);
    assert_eq!(report.errors, 1);

    let one = world.store.get_job(Provider::Codex, "aaaa0001").unwrap();
    assert_eq!(one.status, JobStatus::Completed);
    assert_eq!(one.spawned_at.to_rfc3339(), "2026-02-01T08:00:00+00:00");
    let two = world.store.get_job(Provider::Gemini, "aaaa0002").unwrap();
    assert_eq!(two.error.as_deref(), Some("exit status 2"));
}

#[test]
fn migrated_jobs_persist_across_reopen() {
    let world = World::new();
    world.write_legacy(
        "codex",
        "durable",
        "aaaa0001",
        r#"{"provider":"codex","jobId":"aaaa0001","slug":"durable","status":"completed","promptFile":"/p/a.md"}"#,
    );
    world
        .store
        .migrate_from_json_files(world.prompts.path())
        .unwrap();

    world.store.close();
    world.store.open(world.state.path()).unwrap();
    assert!(world.store.get_job(Provider::Codex, "aaaa0001").is_some());
}

#[test]
fn rerunning_migration_does_not_duplicate() {
    let world = World::new();
    world.write_legacy(
        "codex",
        "once",
        "aaaa0001",
        r#"{"provider":"codex","jobId":"aaaa0001","slug":"once","promptFile":"/p/a.md"}"#,
    );

    world.store.migrate_from_json_files(world.prompts.path()).unwrap();
    world.store.migrate_from_json_files(world.prompts.path()).unwrap();
    assert_eq!(world.store.all_jobs().len(), 1);
}

#[test]
fn store_beats_legacy_after_migration_updates() {
    // After migration the store owns the record; a later legacy read of the
    // same id must not shadow newer store state.
    let world = World::new();
    world.write_legacy(
        "codex",
        "drift",
        "aaaa0001",
        r#"{"provider":"codex","jobId":"aaaa0001","slug":"drift","status":"running","pid":10,"promptFile":"/p/a.md"}"#,
    );
    world.store.migrate_from_json_files(world.prompts.path()).unwrap();

    world
        .store
        .update_job(
            Provider::Codex,
            "aaaa0001",
            &dh_core::JobPatch {
                status: Some(JobStatus::Completed),
                ..Default::default()
            },
        )
        .unwrap();

    let status = world
        .manager()
        .check_job_status(Provider::Codex, "aaaa0001")
        .unwrap();
    assert!(status.contains("status: completed"));
}
