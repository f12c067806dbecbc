// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn minimal_job() -> Job {
    Job {
        provider: Provider::Codex,
        job_id: "ab12cd34".to_string(),
        slug: "review-auth".to_string(),
        status: JobStatus::Spawned,
        pid: Some(4242),
        prompt_file: PathBuf::from("/tmp/prompts/ab12cd34.md"),
        response_file: None,
        model: None,
        agent_role: None,
        spawned_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        completed_at: None,
        error: None,
        used_fallback: false,
        fallback_model: None,
        killed_by_user: false,
    }
}

#[yare::parameterized(
    lowercase      = { "ab12cd34", true },
    uppercase      = { "AB12CD34", true },
    mixed_case     = { "Ab12Cd34", true },
    all_digits     = { "01234567", true },
    too_short      = { "ab12cd3", false },
    too_long       = { "ab12cd345", false },
    non_hex        = { "ab12cdzz", false },
    empty          = { "", false },
    traversal      = { "../../ab", false },
    embedded_slash = { "ab/2cd34", false },
    unicode        = { "ab12cd3é", false },
)]
fn job_id_validation(id: &str, valid: bool) {
    assert_eq!(is_valid_job_id(id), valid);
}

#[test]
fn provider_round_trips_through_str() {
    for p in [Provider::Codex, Provider::Gemini] {
        assert_eq!(p.as_str().parse::<Provider>().unwrap(), p);
    }
    assert!("claude".parse::<Provider>().is_err());
}

#[yare::parameterized(
    spawned   = { JobStatus::Spawned,   true },
    running   = { JobStatus::Running,   true },
    completed = { JobStatus::Completed, false },
    failed    = { JobStatus::Failed,    false },
    timeout   = { JobStatus::Timeout,   false },
)]
fn active_and_terminal_partition(status: JobStatus, active: bool) {
    assert_eq!(status.is_active(), active);
    assert_eq!(status.is_terminal(), !active);
}

#[test]
fn id_key_normalizes_case() {
    let mut job = minimal_job();
    job.job_id = "AB12cd34".to_string();
    assert_eq!(job.id_key(), "ab12cd34");
}

#[test]
fn serde_skips_unset_optionals() {
    let mut job = minimal_job();
    job.pid = None;
    let json = serde_json::to_value(&job).unwrap();
    let obj = json.as_object().unwrap();

    assert!(!obj.contains_key("pid"));
    assert!(!obj.contains_key("responseFile"));
    assert!(!obj.contains_key("model"));
    assert!(!obj.contains_key("error"));
    assert!(!obj.contains_key("completedAt"));
    assert!(!obj.contains_key("usedFallback"));
    assert!(!obj.contains_key("killedByUser"));
    assert_eq!(obj["jobId"], "ab12cd34");
    assert_eq!(obj["promptFile"], "/tmp/prompts/ab12cd34.md");
}

#[test]
fn serde_round_trip_preserves_every_field() {
    let mut job = minimal_job();
    job.status = JobStatus::Failed;
    job.response_file = Some(PathBuf::from("/tmp/responses/ab12cd34.md"));
    job.model = Some("o3".to_string());
    job.agent_role = Some("reviewer".to_string());
    job.completed_at = Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap());
    job.error = Some("exit status 1".to_string());
    job.used_fallback = true;
    job.fallback_model = Some("o4-mini".to_string());
    job.killed_by_user = true;

    let json = serde_json::to_string(&job).unwrap();
    let back: Job = serde_json::from_str(&json).unwrap();
    assert_eq!(back, job);
}

#[test]
fn deserialize_fills_documented_defaults() {
    // The three required legacy fields only.
    let json = r#"{
        "provider": "gemini",
        "jobId": "00ff00ff",
        "promptFile": "/p/x.md"
    }"#;
    let job: Job = serde_json::from_str(json).unwrap();

    assert_eq!(job.status, JobStatus::Spawned);
    assert_eq!(job.slug, "");
    assert_eq!(job.spawned_at, chrono::DateTime::<Utc>::UNIX_EPOCH);
    assert_eq!(job.pid, None);
    assert!(!job.used_fallback);
    assert!(!job.killed_by_user);
}

#[test]
fn deserialize_rejects_missing_required_fields() {
    let missing_prompt = r#"{"provider": "codex", "jobId": "ab12cd34"}"#;
    assert!(serde_json::from_str::<Job>(missing_prompt).is_err());

    let missing_id = r#"{"provider": "codex", "promptFile": "/p/x.md"}"#;
    assert!(serde_json::from_str::<Job>(missing_id).is_err());
}

#[test]
fn empty_patch_is_noop() {
    let before = minimal_job();
    let mut after = before.clone();
    let patch = JobPatch::default();
    assert!(patch.is_empty());

    after.apply_patch(&patch);
    assert_eq!(after, before);
}

#[test]
fn patch_merges_only_provided_fields() {
    let mut job = minimal_job();
    job.model = Some("o3".to_string());

    let patch = JobPatch {
        status: Some(JobStatus::Failed),
        error: Some("killed".to_string()),
        killed_by_user: Some(true),
        ..Default::default()
    };
    assert!(!patch.is_empty());
    job.apply_patch(&patch);

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("killed"));
    assert!(job.killed_by_user);
    // Untouched fields keep their values.
    assert_eq!(job.model.as_deref(), Some("o3"));
    assert_eq!(job.pid, Some(4242));
    assert_eq!(job.slug, "review-auth");
}
