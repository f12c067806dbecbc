// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only adapter over the legacy one-file-per-job status format.
//!
//! Before the transactional store existed, the spawner persisted each job as
//! `{provider}-status-{slug}-{jobId}.json` inside the prompts directory.
//! This module locates and parses those files; it never writes them. The
//! store's migration and the lifecycle manager's fallback path are the only
//! consumers.

use dh_core::{is_valid_job_id, Job, Provider};
use serde_json::Error as JsonError;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from reading a legacy status file.
#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid status file {path}: {source}")]
    Parse { path: PathBuf, source: JsonError },
}

/// A located legacy status file: the slug recovered from the filename and
/// the path to the JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFileRef {
    pub slug: String,
    pub path: PathBuf,
}

/// Canonical filename for a legacy status file.
pub fn status_file_name(provider: Provider, slug: &str, job_id: &str) -> String {
    format!("{}-status-{}-{}.json", provider, slug, job_id)
}

/// Locate the legacy status file for `(provider, job_id)`.
///
/// The id is validated before anything touches the filesystem: a malformed
/// id (wrong length, non-hex, traversal sequences) is "not found" with zero
/// directory reads. Slugs may contain `-`, so the filename is matched by
/// prefix and suffix and the slug is whatever sits between them.
pub fn find_status_file(dir: &Path, provider: Provider, job_id: &str) -> Option<StatusFileRef> {
    if !is_valid_job_id(job_id) {
        return None;
    }

    let prefix = format!("{}-status-", provider);
    let suffix = format!("-{}.json", job_id.to_ascii_lowercase());

    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        // The id in the filename is case-insensitive, like the id itself.
        let rest_lower = rest.to_ascii_lowercase();
        let Some(slug_len) = rest_lower.len().checked_sub(suffix.len()) else {
            continue;
        };
        if !rest_lower.ends_with(&suffix) {
            continue;
        }
        return Some(StatusFileRef {
            slug: rest[..slug_len].to_string(),
            path: entry.path(),
        });
    }
    None
}

/// Parse a legacy status file into a [`Job`].
///
/// Strict about the three required fields (`provider`, `jobId`,
/// `promptFile`); everything else falls back to the documented defaults.
pub fn read_status_file(path: &Path) -> Result<Job, LegacyError> {
    let raw = fs::read_to_string(path).map_err(|source| LegacyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LegacyError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Find and parse the legacy record for `(provider, job_id)`.
///
/// A file that exists but fails to parse is treated as absent.
pub fn read_job(dir: &Path, provider: Provider, job_id: &str) -> Option<Job> {
    let found = find_status_file(dir, provider, job_id)?;
    match read_status_file(&found.path) {
        Ok(job) => Some(job),
        Err(err) => {
            debug!(error = %err, "skipping unreadable legacy status file");
            None
        }
    }
}

/// Every path in `dir` that looks like a legacy status file.
///
/// Returns an empty list when the directory does not exist.
pub fn scan_status_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(is_status_file_name)
        })
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

/// Parse every legacy record in `dir`, skipping unreadable files.
pub fn read_all(dir: &Path) -> Vec<Job> {
    scan_status_files(dir)
        .iter()
        .filter_map(|path| match read_status_file(path) {
            Ok(job) => Some(job),
            Err(err) => {
                debug!(error = %err, "skipping unreadable legacy status file");
                None
            }
        })
        .collect()
}

/// Filename shape check: `{provider}-status-{slug}-{8 hex}.json`.
fn is_status_file_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".json") else {
        return false;
    };
    let known_provider = ["codex-status-", "gemini-status-"]
        .iter()
        .any(|p| stem.starts_with(p));
    if !known_provider {
        return false;
    }
    match stem.rsplit_once('-') {
        Some((_, id)) => is_valid_job_id(id),
        None => false,
    }
}

#[cfg(test)]
#[path = "legacy_tests.rs"]
mod tests;
