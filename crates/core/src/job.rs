// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and status state machine.
//!
//! A [`Job`] is one unit of work delegated to an external provider CLI.
//! The spawner creates the record (status `spawned`, pid set) and owns the
//! natural progression to `running` and a terminal state; this crate only
//! defines the shape shared by the store, the legacy file format, and the
//! lifecycle commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Length of a spawner-issued job identifier (hex characters).
pub const JOB_ID_LEN: usize = 8;

/// Check a job id against the spawner's shape: exactly eight hex digits,
/// case-insensitive. Anything else (wrong length, stray separators,
/// path-traversal sequences) must be rejected before the id is embedded in
/// a filename or store key.
pub fn is_valid_job_id(id: &str) -> bool {
    id.len() == JOB_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// The external CLI integration a job was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Codex,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Codex => "codex",
            Provider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known provider.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown provider: {0}")]
pub struct ParseProviderError(pub String);

impl FromStr for Provider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "codex" => Ok(Provider::Codex),
            "gemini" => Ok(Provider::Gemini),
            other => Err(ParseProviderError(other.to_string())),
        }
    }
}

/// Lifecycle status of a delegated job.
///
/// `Spawned` and `Running` are active; the rest are terminal. A terminal
/// job never transitions again except through the audited kill-on-ESRCH
/// override in the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Process launched, not yet confirmed working
    #[default]
    Spawned,
    /// Provider CLI is doing work
    Running,
    /// Finished and wrote a response
    Completed,
    /// Exited without a usable response
    Failed,
    /// Exceeded its deadline and was cut off
    Timeout,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Spawned | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Spawned => write!(f, "spawned"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Timeout => write!(f, "timeout"),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn epoch_start() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// One unit of delegated work, keyed by `(provider, job_id)`.
///
/// Field names serialize in camelCase so the same struct round-trips both
/// the store file and legacy per-job status files. Optional fields are
/// skipped when absent; deserializing must never invent an empty string or
/// zero for a field the source JSON did not carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub provider: Provider,
    /// Spawner-issued 8-hex-char identifier; case-insensitive, immutable.
    pub job_id: String,
    /// Human-readable label; mutable, may be empty for legacy records.
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub status: JobStatus,
    /// OS process id, present only while the process is meaningfully
    /// trackable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Input artifact handed to the provider CLI.
    pub prompt_file: PathBuf,
    /// Output artifact the provider writes on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,
    /// Set once at creation, never mutated. Legacy files that omit it
    /// deserialize to the Unix epoch so they sort oldest.
    #[serde(default = "epoch_start")]
    pub spawned_at: DateTime<Utc>,
    /// Set exactly once on transition into a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Present only on `failed` / `timeout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when the spawner substituted a different model after an
    /// initial failure.
    #[serde(default, skip_serializing_if = "is_false")]
    pub used_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
    /// Distinguishes user-initiated termination from natural failure.
    #[serde(default, skip_serializing_if = "is_false")]
    pub killed_by_user: bool,
}

impl Job {
    /// Canonical store key for the case-insensitive job id.
    pub fn id_key(&self) -> String {
        self.job_id.to_ascii_lowercase()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge only the fields the patch provides; everything else is
    /// untouched. An empty patch is a valid no-op.
    pub fn apply_patch(&mut self, patch: &JobPatch) {
        if let Some(slug) = &patch.slug {
            self.slug = slug.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(pid) = patch.pid {
            self.pid = Some(pid);
        }
        if let Some(model) = &patch.model {
            self.model = Some(model.clone());
        }
        if let Some(agent_role) = &patch.agent_role {
            self.agent_role = Some(agent_role.clone());
        }
        if let Some(response_file) = &patch.response_file {
            self.response_file = Some(response_file.clone());
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        if let Some(used_fallback) = patch.used_fallback {
            self.used_fallback = used_fallback;
        }
        if let Some(fallback_model) = &patch.fallback_model {
            self.fallback_model = Some(fallback_model.clone());
        }
        if let Some(killed_by_user) = patch.killed_by_user {
            self.killed_by_user = killed_by_user;
        }
    }
}

/// Field-level merge payload for `JobStore::update_job`.
///
/// Only `Some` fields are written; last writer wins per field.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub slug: Option<String>,
    pub status: Option<JobStatus>,
    pub pid: Option<u32>,
    pub model: Option<String>,
    pub agent_role: Option<String>,
    pub response_file: Option<PathBuf>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub used_fallback: Option<bool>,
    pub fallback_model: Option<String>,
    pub killed_by_user: Option<bool>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        self.slug.is_none()
            && self.status.is_none()
            && self.pid.is_none()
            && self.model.is_none()
            && self.agent_role.is_none()
            && self.response_file.is_none()
            && self.completed_at.is_none()
            && self.error.is_none()
            && self.used_fallback.is_none()
            && self.fallback_model.is_none()
            && self.killed_by_user.is_none()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
