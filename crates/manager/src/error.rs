// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for lifecycle commands.
//!
//! Message prefixes are stable: callers (and their tests) grep for
//! "Invalid signal", "Invalid job id", "No job found", "terminal state",
//! "No valid PID", "Failed to signal", and "Timed out waiting".

use dh_core::{JobStatus, Provider};
use dh_storage::StoreError;
use thiserror::Error;

/// Errors returned by the lifecycle command surface.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Signal not in the allow-list; rejected before any store or OS call.
    #[error("Invalid signal: {0} (expected SIGTERM or SIGINT)")]
    InvalidSignal(String),
    /// Job id does not match the 8-hex-char shape; rejected before any
    /// store or filesystem access.
    #[error("Invalid job id: {0} (expected 8 hex characters)")]
    InvalidJobId(String),
    /// Job absent from both the store and the legacy fallback.
    #[error("No job found for {provider} job {job_id}")]
    NoJobFound { provider: Provider, job_id: String },
    /// Killing a finished job is an error, not a no-op success.
    #[error("Job {provider}/{job_id} is already in terminal state: {status}")]
    AlreadyTerminal {
        provider: Provider,
        job_id: String,
        status: JobStatus,
    },
    #[error("No valid PID recorded for {provider}/{job_id}")]
    NoValidPid { provider: Provider, job_id: String },
    /// Signal delivery failed for a reason other than ESRCH; the true
    /// process state is unknown, so no job state was mutated.
    #[error("Failed to signal process {pid}: {message}")]
    SignalFailed { pid: u32, message: String },
    #[error("Timed out waiting for {provider}/{job_id} after {waited_ms}ms")]
    WaitTimeout {
        provider: Provider,
        job_id: String,
        waited_ms: u64,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}
