// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle commands over the job store, legacy files, and live processes.
//!
//! Every command validates its inputs before touching the store or the OS.
//! Reads go through the source chain (store, then legacy files); mutations
//! always land in the store, upserting a legacy-resolved record first when
//! needed. Legacy files are never written.

use crate::env;
use crate::error::CommandError;
use crate::poll::{Poller, Tick};
use crate::signal::{KillSignal, ProcessSignal, SignalError, UnixProcessSignal};
use crate::sources::{LegacySource, SourceChain, StoreSource};
use chrono::{DateTime, Utc};
use dh_core::{
    format_elapsed_ms, is_valid_job_id, Clock, Job, JobPatch, JobStatus, Provider, SystemClock,
};
use dh_storage::{legacy, JobStore, StatusFileRef};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Floor for `wait_for_job` timeouts. Zero and negative inputs clamp here
/// so a wait always makes forward progress.
pub const MIN_WAIT_TIMEOUT_MS: i64 = 1000;

/// Status predicate for `list_jobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFilter {
    Active,
    Completed,
    /// Includes `timeout` as well as `failed`.
    Failed,
    All,
}

impl JobFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(JobFilter::Active),
            "completed" => Some(JobFilter::Completed),
            "failed" => Some(JobFilter::Failed),
            "all" => Some(JobFilter::All),
            _ => None,
        }
    }

    pub fn matches(&self, status: JobStatus) -> bool {
        match self {
            JobFilter::Active => status.is_active(),
            JobFilter::Completed => status == JobStatus::Completed,
            JobFilter::Failed => matches!(status, JobStatus::Failed | JobStatus::Timeout),
            JobFilter::All => true,
        }
    }
}

impl fmt::Display for JobFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFilter::Active => write!(f, "active"),
            JobFilter::Completed => write!(f, "completed"),
            JobFilter::Failed => write!(f, "failed"),
            JobFilter::All => write!(f, "all"),
        }
    }
}

/// Operational command surface: check, list, wait, kill.
pub struct JobManager<S: ProcessSignal = UnixProcessSignal> {
    store: Arc<JobStore>,
    legacy_dir: PathBuf,
    signaler: S,
    clock: Arc<dyn Clock>,
}

impl JobManager<UnixProcessSignal> {
    pub fn new(store: Arc<JobStore>, legacy_dir: PathBuf) -> Self {
        Self::with_signaler(store, legacy_dir, UnixProcessSignal)
    }
}

impl<S: ProcessSignal> JobManager<S> {
    pub fn with_signaler(store: Arc<JobStore>, legacy_dir: PathBuf, signaler: S) -> Self {
        Self {
            store,
            legacy_dir,
            signaler,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock (tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn chain(&self) -> SourceChain {
        SourceChain::new(vec![
            Box::new(StoreSource::new(Arc::clone(&self.store))),
            Box::new(LegacySource::new(self.legacy_dir.clone())),
        ])
    }

    /// Locate the legacy status file for a job, if one exists.
    ///
    /// Malformed ids are "not found" without a filesystem call.
    pub fn find_job_status_file(
        &self,
        provider: Provider,
        job_id: &str,
    ) -> Option<StatusFileRef> {
        legacy::find_status_file(&self.legacy_dir, provider, job_id)
    }

    /// Render the current state of one job.
    pub fn check_job_status(
        &self,
        provider: Provider,
        job_id: &str,
    ) -> Result<String, CommandError> {
        if !is_valid_job_id(job_id) {
            return Err(CommandError::InvalidJobId(job_id.to_string()));
        }
        let job = self.chain().get(provider, job_id).ok_or_else(|| {
            CommandError::NoJobFound {
                provider,
                job_id: job_id.to_string(),
            }
        })?;
        Ok(self.render_status(&job))
    }

    /// List jobs from both backends, filtered, newest first.
    pub fn list_jobs(
        &self,
        provider: Option<Provider>,
        filter: JobFilter,
        limit: Option<usize>,
    ) -> Result<String, CommandError> {
        let mut jobs: Vec<Job> = self
            .chain()
            .list_merged()
            .into_iter()
            .filter(|j| provider.is_none_or(|p| j.provider == p))
            .filter(|j| filter.matches(j.status))
            .collect();
        jobs.sort_by_key(|j| std::cmp::Reverse(j.spawned_at));
        if let Some(limit) = limit {
            jobs.truncate(limit);
        }

        if jobs.is_empty() {
            return Ok(match filter {
                JobFilter::All => "No jobs found".to_string(),
                f => format!("No {f} jobs found"),
            });
        }

        let now_ms = self.clock.epoch_ms();
        let lines: Vec<String> = jobs.iter().map(|j| list_line(j, now_ms)).collect();
        Ok(lines.join("\n"))
    }

    /// Poll until the job reaches a terminal state or the (clamped)
    /// timeout elapses.
    ///
    /// On completion the response-file content is returned. An expired
    /// wait leaves the job record untouched.
    pub async fn wait_for_job(
        &self,
        provider: Provider,
        job_id: &str,
        timeout_ms: i64,
    ) -> Result<String, CommandError> {
        if !is_valid_job_id(job_id) {
            return Err(CommandError::InvalidJobId(job_id.to_string()));
        }
        let timeout_ms = timeout_ms.max(MIN_WAIT_TIMEOUT_MS) as u64;
        let mut poller = Poller::new(env::wait_poll_interval(), Duration::from_millis(timeout_ms));

        loop {
            let Some(job) = self.chain().get(provider, job_id) else {
                return Err(CommandError::NoJobFound {
                    provider,
                    job_id: job_id.to_string(),
                });
            };
            if job.is_terminal() {
                return Ok(render_wait_outcome(&job));
            }
            if let Tick::Timeout = poller.tick().await {
                return Err(CommandError::WaitTimeout {
                    provider,
                    job_id: job_id.to_string(),
                    waited_ms: timeout_ms,
                });
            }
        }
    }

    /// Deliver a termination signal to a job's process.
    ///
    /// Validation order: signal allow-list, id shape, job existence,
    /// terminal-state conflict, pid presence. Nothing is mutated and no OS
    /// call is made until all of those pass. `killed_by_user` is persisted
    /// before delivery as audit intent. An ESRCH from delivery is resolved
    /// by re-reading the job: a completed outcome is preserved, an active
    /// one becomes `failed`. Any other delivery error is surfaced verbatim
    /// with no state change, since the true process state is unknown.
    pub fn kill_job(
        &self,
        provider: Provider,
        job_id: &str,
        signal: &str,
    ) -> Result<String, CommandError> {
        let Some(sig) = KillSignal::parse(signal) else {
            return Err(CommandError::InvalidSignal(signal.to_string()));
        };
        if !is_valid_job_id(job_id) {
            return Err(CommandError::InvalidJobId(job_id.to_string()));
        }

        let job = self.chain().get(provider, job_id).ok_or_else(|| {
            CommandError::NoJobFound {
                provider,
                job_id: job_id.to_string(),
            }
        })?;
        if job.is_terminal() {
            return Err(CommandError::AlreadyTerminal {
                provider,
                job_id: job_id.to_string(),
                status: job.status,
            });
        }
        let pid = match job.pid {
            Some(pid) if pid > 0 => pid,
            _ => {
                return Err(CommandError::NoValidPid {
                    provider,
                    job_id: job_id.to_string(),
                })
            }
        };

        // Audit intent before delivery. A legacy-only record is promoted
        // into the store first; legacy files stay read-only.
        if self.store.get_job(provider, job_id).is_none() {
            self.store.upsert_job(job.clone())?;
        }
        self.store.update_job(
            provider,
            job_id,
            &JobPatch {
                killed_by_user: Some(true),
                ..Default::default()
            },
        )?;

        match self.signaler.signal(pid, sig) {
            Ok(()) => {
                debug!(%provider, job_id, pid, signal = %sig, "signal delivered");
                Ok(format!(
                    "Sent {sig} to {provider} job {job_id} (pid {pid})"
                ))
            }
            Err(SignalError::NoSuchProcess) => self.resolve_esrch(provider, job_id, pid, sig),
            Err(SignalError::Os(message)) => {
                warn!(%provider, job_id, pid, %message, "signal delivery failed; job state preserved");
                Err(CommandError::SignalFailed { pid, message })
            }
        }
    }

    /// The process vanished between resolution and delivery. Re-read the
    /// job and decide: a completed job stays completed (never demote a
    /// finished result over a stale process handle); a still-active job is
    /// marked failed, since its process is gone and nothing else will
    /// finalize it.
    fn resolve_esrch(
        &self,
        provider: Provider,
        job_id: &str,
        pid: u32,
        sig: KillSignal,
    ) -> Result<String, CommandError> {
        let current_status = self
            .chain()
            .get(provider, job_id)
            .map(|j| j.status)
            .unwrap_or(JobStatus::Spawned);

        if current_status.is_terminal() {
            debug!(%provider, job_id, pid, status = %current_status, "process gone, job already finalized");
            return Ok(format!(
                "Process {pid} already exited; {provider} job {job_id} is {current_status}"
            ));
        }

        let error = format!("process {pid} not found when delivering {sig} (already exited)");
        self.store.update_job(
            provider,
            job_id,
            &JobPatch {
                status: Some(JobStatus::Failed),
                error: Some(error),
                completed_at: Some(self.clock.now()),
                killed_by_user: Some(true),
                ..Default::default()
            },
        )?;
        warn!(%provider, job_id, pid, "process gone while still active; job marked failed");
        Ok(format!(
            "Process {pid} already exited; {provider} job {job_id} marked failed"
        ))
    }

    fn render_status(&self, job: &Job) -> String {
        let mut out = format!("{} job {}", job.provider, job.job_id);
        if !job.slug.is_empty() {
            out.push_str(&format!(" ({})", job.slug));
        }
        out.push_str(&format!("\n  status: {}", job.status));
        if let Some(model) = &job.model {
            out.push_str(&format!("\n  model: {model}"));
            if let (true, Some(fallback)) = (job.used_fallback, &job.fallback_model) {
                out.push_str(&format!(" (fell back to {fallback})"));
            }
        } else if let Some(fallback) = &job.fallback_model {
            out.push_str(&format!("\n  model: {fallback} (fallback)"));
        }
        match job_timing(job, self.clock.epoch_ms()) {
            Some(Timing::Elapsed(ms)) => {
                out.push_str(&format!("\n  elapsed: {}", format_elapsed_ms(ms)));
            }
            Some(Timing::Duration(ms)) => {
                out.push_str(&format!("\n  duration: {}", format_elapsed_ms(ms)));
            }
            None => {}
        }
        if let Some(error) = &job.error {
            out.push_str(&format!("\n  error: {error}"));
        }
        if job.killed_by_user {
            out.push_str("\n  killed by user");
        }
        out
    }
}

enum Timing {
    /// Still running: time since spawn.
    Elapsed(u64),
    /// Finished: spawn-to-completion.
    Duration(u64),
}

/// Timing annotation for a job, `None` when the record is undated (legacy
/// files without `spawnedAt` deserialize to the Unix epoch).
fn job_timing(job: &Job, now_ms: u64) -> Option<Timing> {
    if job.spawned_at == DateTime::<Utc>::UNIX_EPOCH {
        return None;
    }
    let spawned_ms = job.spawned_at.timestamp_millis();
    if job.status.is_active() {
        let elapsed = (now_ms as i64).saturating_sub(spawned_ms).max(0);
        return Some(Timing::Elapsed(elapsed as u64));
    }
    let done = job.completed_at?;
    let took = done.timestamp_millis().saturating_sub(spawned_ms).max(0);
    Some(Timing::Duration(took as u64))
}

fn render_wait_outcome(job: &Job) -> String {
    match job.status {
        JobStatus::Completed => {
            let Some(path) = &job.response_file else {
                return format!(
                    "Job {}/{} completed (no response file recorded)",
                    job.provider, job.job_id
                );
            };
            match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => format!(
                    "Job {}/{} completed, but response file {} could not be read: {}",
                    job.provider,
                    job.job_id,
                    path.display(),
                    err
                ),
            }
        }
        status => {
            let mut out = format!("Job {}/{} finished as {}", job.provider, job.job_id, status);
            if let Some(error) = &job.error {
                out.push_str(&format!(": {error}"));
            }
            out
        }
    }
}

fn list_line(job: &Job, now_ms: u64) -> String {
    let slug = if job.slug.is_empty() {
        "(no slug)"
    } else {
        job.slug.as_str()
    };
    let mut line = format!("[{} {}] {} {}", job.provider, job.job_id, slug, job.status);
    match job_timing(job, now_ms) {
        Some(Timing::Elapsed(ms)) => line.push_str(&format!(" (for {})", format_elapsed_ms(ms))),
        Some(Timing::Duration(ms)) => line.push_str(&format!(" (in {})", format_elapsed_ms(ms))),
        None => {}
    }
    if job.killed_by_user {
        line.push_str(" (killed by user)");
    }
    line
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
