// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered read-source chain: store first, legacy files as fallback.
//!
//! Callers see one lookup interface instead of branching on which backend
//! holds a job. The store is authoritative; a legacy record only surfaces
//! when the store is closed or has no row for the id.

use dh_core::{Job, Provider};
use dh_storage::{legacy, JobStore};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// A read-only place jobs can be found.
pub trait JobSource: Send + Sync {
    fn get(&self, provider: Provider, job_id: &str) -> Option<Job>;
    fn list(&self) -> Vec<Job>;
}

/// The transactional store as a read source. Empty when closed.
pub struct StoreSource {
    store: Arc<JobStore>,
}

impl StoreSource {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }
}

impl JobSource for StoreSource {
    fn get(&self, provider: Provider, job_id: &str) -> Option<Job> {
        self.store.get_job(provider, job_id)
    }

    fn list(&self) -> Vec<Job> {
        self.store.all_jobs()
    }
}

/// Legacy per-job status files as a read source.
pub struct LegacySource {
    dir: PathBuf,
}

impl LegacySource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl JobSource for LegacySource {
    fn get(&self, provider: Provider, job_id: &str) -> Option<Job> {
        legacy::read_job(&self.dir, provider, job_id)
    }

    fn list(&self) -> Vec<Job> {
        legacy::read_all(&self.dir)
    }
}

/// Sources in priority order; earlier entries win on conflicts.
pub struct SourceChain {
    sources: Vec<Box<dyn JobSource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Box<dyn JobSource>>) -> Self {
        Self { sources }
    }

    /// First hit across the chain.
    pub fn get(&self, provider: Provider, job_id: &str) -> Option<Job> {
        self.sources.iter().find_map(|s| s.get(provider, job_id))
    }

    /// Union of all sources, de-duplicated by `(provider, job_id)` with
    /// earlier sources winning.
    pub fn list_merged(&self) -> Vec<Job> {
        let mut seen: HashSet<(Provider, String)> = HashSet::new();
        let mut merged = Vec::new();
        for source in &self.sources {
            for job in source.list() {
                if seen.insert((job.provider, job.id_key())) {
                    merged.push(job);
                }
            }
        }
        merged
    }
}

#[cfg(test)]
#[path = "sources_tests.rs"]
mod tests;
