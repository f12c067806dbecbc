//! Shared fixtures for the workspace specs.

use chrono::DateTime;
use dh_core::{Clock, FakeClock, Job, JobStatus, Provider};
use dh_manager::{FakeProcessSignal, JobManager};
use dh_storage::JobStore;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const BASE_MS: u64 = 1_700_000_000_000;

pub struct World {
    pub state: TempDir,
    pub prompts: TempDir,
    pub store: Arc<JobStore>,
    pub clock: FakeClock,
    pub signals: FakeProcessSignal,
}

impl World {
    pub fn new() -> Self {
        let state = TempDir::new().unwrap();
        let prompts = TempDir::new().unwrap();
        let clock = FakeClock::new(BASE_MS);
        let store = Arc::new(JobStore::with_clock(Arc::new(clock.clone())));
        store.open(state.path()).unwrap();
        Self {
            state,
            prompts,
            store,
            clock,
            signals: FakeProcessSignal::new(),
        }
    }

    pub fn manager(&self) -> JobManager<FakeProcessSignal> {
        JobManager::with_signaler(
            Arc::clone(&self.store),
            self.prompts.path().to_path_buf(),
            self.signals.clone(),
        )
        .with_clock(Arc::new(self.clock.clone()))
    }

    /// Create the record the external spawner would write.
    pub fn spawn_job(&self, provider: Provider, id: &str, slug: &str, pid: u32) -> Job {
        let job = Job {
            provider,
            job_id: id.to_string(),
            slug: slug.to_string(),
            status: JobStatus::Spawned,
            pid: Some(pid),
            prompt_file: self.prompts.path().join(format!("{id}.md")),
            response_file: Some(self.prompts.path().join(format!("{id}-response.md"))),
            model: None,
            agent_role: None,
            spawned_at: DateTime::from_timestamp_millis(self.clock.epoch_ms() as i64).unwrap(),
            completed_at: None,
            error: None,
            used_fallback: false,
            fallback_model: None,
            killed_by_user: false,
        };
        self.store.upsert_job(job.clone()).unwrap();
        job
    }

    pub fn write_legacy(&self, provider: &str, slug: &str, id: &str, body: &str) {
        std::fs::write(
            self.prompts
                .path()
                .join(format!("{provider}-status-{slug}-{id}.json")),
            body,
        )
        .unwrap();
    }
}
