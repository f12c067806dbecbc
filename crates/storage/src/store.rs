// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transactional job store backed by a single atomically-replaced file.
//!
//! The full job table lives in memory behind a mutex and every mutation
//! rewrites `jobs.json` via write-tmp + fsync + rename, so a crash mid-write
//! never leaves a torn file behind. On flush failure the in-memory change is
//! rolled back, keeping memory and disk consistent. A corrupt file found at
//! open is rotated to `.bak` and the store starts empty.
//!
//! The handle is explicit: callers receive a [`JobStore`] from construction,
//! `open` binds it to a directory, and after `close` every operation
//! degrades to a no-op or empty result instead of erroring.

use crate::legacy;
use chrono::{DateTime, Utc};
use dh_core::{format_elapsed_ms, Clock, Job, JobPatch, JobStatus, Provider, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the store file inside the state directory.
pub const STORE_FILE: &str = "jobs.json";

/// Current store file format version.
const STORE_VERSION: u32 = 1;

/// Default window for [`JobStore::recent_jobs`].
pub const DEFAULT_RECENT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Default retention for [`JobStore::cleanup_old_jobs`].
pub const DEFAULT_CLEANUP_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Cap on completed jobs listed in the pre-compact digest.
const SUMMARY_COMPLETED_CAP: usize = 10;

/// Cap on error text carried into rendered digests.
const SUMMARY_ERROR_CHARS: usize = 80;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot determine state directory (HOME unset)")]
    NoStateDir,
}

/// Outcome of a legacy-file migration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Valid files imported (or re-imported) into the store.
    pub imported: usize,
    /// Files skipped for malformed JSON or missing required fields.
    pub errors: usize,
}

/// Aggregate job counts. `failed` covers both `failed` and `timeout`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

type JobKey = (Provider, String);

fn job_key(provider: Provider, job_id: &str) -> JobKey {
    (provider, job_id.to_ascii_lowercase())
}

/// Versioned on-disk envelope.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFileIn {
    v: u32,
    jobs: Vec<Job>,
}

#[derive(Serialize)]
struct StoreFileOut<'a> {
    v: u32,
    jobs: Vec<&'a Job>,
}

struct Inner {
    path: PathBuf,
    jobs: HashMap<JobKey, Job>,
}

/// Persistent table of delegated jobs keyed by `(provider, job_id)`.
pub struct JobStore {
    inner: Mutex<Option<Inner>>,
    clock: Arc<dyn Clock>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    /// Create an unopened handle on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an unopened handle with an explicit clock (tests).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(None),
            clock,
        }
    }

    /// Bind the store to `base_dir`, creating the directory and loading the
    /// store file if one exists. Idempotent: reopening an open store is a
    /// successful no-op.
    pub fn open(&self, base_dir: &Path) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock();
        if guard.is_some() {
            return Ok(true);
        }

        fs::create_dir_all(base_dir)?;
        let path = base_dir.join(STORE_FILE);
        let jobs = load_jobs(&path)?;
        info!(path = %path.display(), jobs = jobs.len(), "job store opened");
        *guard = Some(Inner { path, jobs });
        Ok(true)
    }

    /// Release the store. Safe to call when already closed; subsequent
    /// operations degrade to no-ops and empty results.
    pub fn close(&self) {
        let mut guard = self.inner.lock();
        if guard.take().is_some() {
            debug!("job store closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Insert or overwrite the record for `(provider, job_id)`.
    ///
    /// Whole-record-wins: every field of an existing record is replaced.
    /// Returns `Ok(false)` when the store is closed.
    pub fn upsert_job(&self, job: Job) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock();
        let Some(inner) = guard.as_mut() else {
            return Ok(false);
        };

        let key = job_key(job.provider, &job.job_id);
        let prev = inner.jobs.insert(key.clone(), job);
        if let Err(err) = flush(inner) {
            restore(inner, key, prev);
            return Err(err);
        }
        Ok(true)
    }

    pub fn get_job(&self, provider: Provider, job_id: &str) -> Option<Job> {
        let guard = self.inner.lock();
        let inner = guard.as_ref()?;
        inner.jobs.get(&job_key(provider, job_id)).cloned()
    }

    /// Every stored job, in unspecified order.
    pub fn all_jobs(&self) -> Vec<Job> {
        let guard = self.inner.lock();
        match guard.as_ref() {
            Some(inner) => inner.jobs.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Jobs with exactly `status`; `provider` of `None` means either.
    pub fn jobs_by_status(&self, provider: Option<Provider>, status: JobStatus) -> Vec<Job> {
        self.filtered(|job| job.status == status && provider_matches(provider, job))
    }

    /// Jobs with status in {spawned, running}.
    pub fn active_jobs(&self, provider: Option<Provider>) -> Vec<Job> {
        self.filtered(|job| job.is_active() && provider_matches(provider, job))
    }

    /// Jobs whose `spawned_at` falls within `now - window`.
    pub fn recent_jobs(&self, provider: Option<Provider>, window: Duration) -> Vec<Job> {
        let cutoff_ms = self.clock.epoch_ms().saturating_sub(window.as_millis() as u64);
        self.filtered(|job| {
            provider_matches(provider, job) && job.spawned_at.timestamp_millis() >= cutoff_ms as i64
        })
    }

    /// Merge the provided patch fields into an existing record.
    ///
    /// Unspecified fields are untouched; an empty patch is a valid no-op
    /// success. Returns `Ok(false)` when the job is absent or the store is
    /// closed.
    pub fn update_job(
        &self,
        provider: Provider,
        job_id: &str,
        patch: &JobPatch,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock();
        let Some(inner) = guard.as_mut() else {
            return Ok(false);
        };

        let key = job_key(provider, job_id);
        let Some(job) = inner.jobs.get_mut(&key) else {
            return Ok(false);
        };
        if patch.is_empty() {
            return Ok(true);
        }

        let prev = job.clone();
        job.apply_patch(patch);
        if let Err(err) = flush(inner) {
            restore(inner, key, Some(prev));
            return Err(err);
        }
        Ok(true)
    }

    /// Remove a record. Absence is not an error: `Ok(false)`.
    pub fn delete_job(&self, provider: Provider, job_id: &str) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock();
        let Some(inner) = guard.as_mut() else {
            return Ok(false);
        };

        let key = job_key(provider, job_id);
        let Some(prev) = inner.jobs.remove(&key) else {
            return Ok(false);
        };
        if let Err(err) = flush(inner) {
            restore(inner, key, Some(prev));
            return Err(err);
        }
        Ok(true)
    }

    /// Import legacy status files from `dir`.
    ///
    /// Each malformed file (unparseable JSON, missing required fields)
    /// increments `errors` and is skipped; it never aborts the batch. All
    /// valid rows are staged and committed with a single flush, so on an
    /// unexpected write failure the whole batch rolls back. Re-running over
    /// the same directory overwrites via upsert semantics.
    pub fn migrate_from_json_files(&self, dir: &Path) -> Result<MigrationReport, StoreError> {
        let mut guard = self.inner.lock();
        let Some(inner) = guard.as_mut() else {
            return Ok(MigrationReport::default());
        };

        let mut report = MigrationReport::default();
        let mut staged = Vec::new();
        for path in legacy::scan_status_files(dir) {
            match legacy::read_status_file(&path) {
                Ok(job) => staged.push(job),
                Err(err) => {
                    warn!(error = %err, "skipping invalid legacy status file");
                    report.errors += 1;
                }
            }
        }

        let backup = inner.jobs.clone();
        for job in staged {
            inner.jobs.insert(job_key(job.provider, &job.job_id), job);
            report.imported += 1;
        }
        if let Err(err) = flush(inner) {
            inner.jobs = backup;
            return Err(err);
        }

        info!(
            imported = report.imported,
            errors = report.errors,
            dir = %dir.display(),
            "migrated legacy status files"
        );
        Ok(report)
    }

    /// Delete terminal jobs spawned before `now - max_age`.
    ///
    /// Active jobs are never deleted by age alone, however old. Returns the
    /// number of jobs removed.
    pub fn cleanup_old_jobs(&self, max_age: Duration) -> Result<usize, StoreError> {
        let mut guard = self.inner.lock();
        let Some(inner) = guard.as_mut() else {
            return Ok(0);
        };

        let cutoff_ms = self.clock.epoch_ms().saturating_sub(max_age.as_millis() as u64) as i64;
        let expired: Vec<JobKey> = inner
            .jobs
            .iter()
            .filter(|(_, job)| job.is_terminal() && job.spawned_at.timestamp_millis() < cutoff_ms)
            .map(|(key, _)| key.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let mut removed = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(job) = inner.jobs.remove(&key) {
                removed.push((key, job));
            }
        }
        if let Err(err) = flush(inner) {
            for (key, job) in removed {
                inner.jobs.insert(key, job);
            }
            return Err(err);
        }

        debug!(removed = removed.len(), "cleaned up old terminal jobs");
        Ok(removed.len())
    }

    /// Aggregate counts; `failed` covers `failed` and `timeout`.
    pub fn job_stats(&self) -> JobStats {
        let guard = self.inner.lock();
        let Some(inner) = guard.as_ref() else {
            return JobStats::default();
        };

        let mut stats = JobStats {
            total: inner.jobs.len(),
            ..Default::default()
        };
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Spawned | JobStatus::Running => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed | JobStatus::Timeout => stats.failed += 1,
            }
        }
        stats
    }

    /// Human-readable digest of job state for injection into a
    /// context-compaction step.
    ///
    /// Lists all active jobs with elapsed running time, then up to
    /// [`SUMMARY_COMPLETED_CAP`] of the most recently spawned jobs from the
    /// last hour that completed (with an `and N more` tail), then the
    /// aggregate stats line. Empty string when the store is closed or holds
    /// no jobs.
    pub fn pre_compact_summary(&self) -> String {
        let stats = self.job_stats();
        if stats.total == 0 {
            return String::new();
        }
        let now_ms = self.clock.epoch_ms();

        let mut active = self.active_jobs(None);
        active.sort_by_key(|job| std::cmp::Reverse(job.spawned_at));

        let mut completed: Vec<Job> = self
            .recent_jobs(None, DEFAULT_RECENT_WINDOW)
            .into_iter()
            .filter(|job| job.status == JobStatus::Completed)
            .collect();
        completed.sort_by_key(|job| std::cmp::Reverse(job.spawned_at));

        let mut out = String::new();
        if !active.is_empty() {
            out.push_str("Active delegated jobs:\n");
            for job in &active {
                out.push_str(&summary_line(job, now_ms));
                out.push('\n');
            }
        }
        if !completed.is_empty() {
            out.push_str("Completed in the last hour:\n");
            for job in completed.iter().take(SUMMARY_COMPLETED_CAP) {
                out.push_str(&summary_line(job, now_ms));
                out.push('\n');
            }
            if completed.len() > SUMMARY_COMPLETED_CAP {
                out.push_str(&format!(
                    "  ...and {} more\n",
                    completed.len() - SUMMARY_COMPLETED_CAP
                ));
            }
        }
        out.push_str(&format!(
            "Job stats: {} total, {} active, {} completed, {} failed\n",
            stats.total, stats.active, stats.completed, stats.failed
        ));
        out
    }

    fn filtered(&self, keep: impl Fn(&Job) -> bool) -> Vec<Job> {
        let guard = self.inner.lock();
        match guard.as_ref() {
            Some(inner) => inner.jobs.values().filter(|j| keep(j)).cloned().collect(),
            None => Vec::new(),
        }
    }
}

fn provider_matches(wanted: Option<Provider>, job: &Job) -> bool {
    wanted.is_none_or(|p| job.provider == p)
}

/// One digest line for a job: id, slug, state, timing, annotations.
fn summary_line(job: &Job, now_ms: u64) -> String {
    let mut line = format!("  - [{} {}]", job.provider, job.job_id);
    if !job.slug.is_empty() {
        line.push_str(&format!(" {}", job.slug));
    }
    line.push_str(&format!(": {}", job.status));

    match (job.status.is_active(), job.completed_at) {
        (true, _) => {
            if let Some(elapsed) = elapsed_ms_since(job.spawned_at, now_ms) {
                line.push_str(&format!(" for {}", format_elapsed_ms(elapsed)));
            }
        }
        (false, Some(done)) => {
            let took = done.timestamp_millis() - job.spawned_at.timestamp_millis();
            if took >= 0 && job.spawned_at != DateTime::<Utc>::UNIX_EPOCH {
                line.push_str(&format!(" in {}", format_elapsed_ms(took as u64)));
            }
        }
        (false, None) => {}
    }

    if let Some(fallback) = &job.fallback_model {
        line.push_str(&format!(" (fallback: {})", fallback));
    }
    if let Some(error) = &job.error {
        line.push_str(&format!(" error: {}", truncate_chars(error, SUMMARY_ERROR_CHARS)));
    }
    line
}

/// Milliseconds since `spawned_at`, or `None` for undated legacy records.
fn elapsed_ms_since(spawned_at: DateTime<Utc>, now_ms: u64) -> Option<u64> {
    if spawned_at == DateTime::<Utc>::UNIX_EPOCH {
        return None;
    }
    let spawned_ms = spawned_at.timestamp_millis();
    (now_ms as i64).checked_sub(spawned_ms).map(|d| d.max(0) as u64)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

fn restore(inner: &mut Inner, key: JobKey, prev: Option<Job>) {
    match prev {
        Some(job) => {
            inner.jobs.insert(key, job);
        }
        None => {
            inner.jobs.remove(&key);
        }
    }
}

/// Rewrite the store file atomically: write `.tmp`, fsync, rename.
fn flush(inner: &Inner) -> Result<(), StoreError> {
    let mut jobs: Vec<&Job> = inner.jobs.values().collect();
    jobs.sort_by(|a, b| {
        (a.provider.as_str(), a.id_key()).cmp(&(b.provider.as_str(), b.id_key()))
    });
    let envelope = StoreFileOut {
        v: STORE_VERSION,
        jobs,
    };

    let tmp_path = inner.path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &envelope)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, &inner.path)?;
    Ok(())
}

/// Load the job table, rotating a corrupt file to `.bak` and starting
/// empty so the caller can recover via legacy migration.
fn load_jobs(path: &Path) -> Result<HashMap<JobKey, Job>, StoreError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    match serde_json::from_reader::<_, StoreFileIn>(reader) {
        Ok(envelope) => {
            let mut jobs = HashMap::with_capacity(envelope.jobs.len());
            for job in envelope.jobs {
                jobs.insert(job_key(job.provider, &job.job_id), job);
            }
            Ok(jobs)
        }
        Err(err) => {
            let bak_path = rotate_bak_path(path);
            warn!(
                error = %err,
                path = %path.display(),
                bak = %bak_path.display(),
                "corrupt store file, moving to .bak and starting empty",
            );
            fs::rename(path, &bak_path)?;
            Ok(HashMap::new())
        }
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
