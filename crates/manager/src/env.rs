// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the manager crate.

use std::time::Duration;

/// Default interval between wait-for-job status probes.
pub const DEFAULT_WAIT_POLL_MS: u64 = 500;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Poll interval for `wait_for_job`: `DH_WAIT_POLL_MS` or the default.
pub fn wait_poll_interval() -> Duration {
    parse_duration_ms("DH_WAIT_POLL_MS").unwrap_or(Duration::from_millis(DEFAULT_WAIT_POLL_MS))
}
