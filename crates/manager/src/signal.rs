// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS signal delivery behind an adapter seam.
//!
//! Only SIGTERM and SIGINT are deliverable: both give the provider CLI a
//! chance to flush its response file. SIGKILL is deliberately not
//! representable here.

use std::fmt;
use thiserror::Error;

/// A signal the kill command is allowed to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    Term,
    Int,
}

impl KillSignal {
    /// Parse the wire form. Exact match only: anything outside the
    /// allow-list (including `SIGKILL`) is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SIGTERM" => Some(KillSignal::Term),
            "SIGINT" => Some(KillSignal::Int),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KillSignal::Term => "SIGTERM",
            KillSignal::Int => "SIGINT",
        }
    }
}

impl fmt::Display for KillSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from signal delivery. ESRCH gets its own variant because the
/// kill path resolves it into a definitive job outcome instead of
/// propagating it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("no such process")]
    NoSuchProcess,
    #[error("{0}")]
    Os(String),
}

/// Adapter for delivering a signal to a PID.
pub trait ProcessSignal: Send + Sync {
    fn signal(&self, pid: u32, signal: KillSignal) -> Result<(), SignalError>;
}

/// Real delivery via `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixProcessSignal;

#[cfg(unix)]
impl ProcessSignal for UnixProcessSignal {
    fn signal(&self, pid: u32, signal: KillSignal) -> Result<(), SignalError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| SignalError::Os(format!("pid {pid} out of range")))?;
        let sig = match signal {
            KillSignal::Term => Signal::SIGTERM,
            KillSignal::Int => Signal::SIGINT,
        };
        match kill(Pid::from_raw(raw), sig) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(SignalError::NoSuchProcess),
            Err(errno) => Err(SignalError::Os(errno.desc().to_string())),
        }
    }
}

#[cfg(not(unix))]
impl ProcessSignal for UnixProcessSignal {
    fn signal(&self, _pid: u32, _signal: KillSignal) -> Result<(), SignalError> {
        Err(SignalError::Os("signaling is not supported on this platform".to_string()))
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{KillSignal, ProcessSignal, SignalError};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Recorded delivery attempt.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SignalCall {
        pub pid: u32,
        pub signal: KillSignal,
    }

    #[derive(Default)]
    struct FakeSignalState {
        calls: Vec<SignalCall>,
        outcomes: VecDeque<Result<(), SignalError>>,
    }

    /// Fake signal adapter for testing: records calls, replays scripted
    /// outcomes (defaulting to success when the script runs dry).
    #[derive(Clone, Default)]
    pub struct FakeProcessSignal {
        inner: Arc<Mutex<FakeSignalState>>,
    }

    impl FakeProcessSignal {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the outcome for the next delivery.
        pub fn queue_outcome(&self, outcome: Result<(), SignalError>) {
            self.inner.lock().outcomes.push_back(outcome);
        }

        /// All recorded delivery attempts.
        pub fn calls(&self) -> Vec<SignalCall> {
            self.inner.lock().calls.clone()
        }
    }

    impl ProcessSignal for FakeProcessSignal {
        fn signal(&self, pid: u32, signal: KillSignal) -> Result<(), SignalError> {
            let mut state = self.inner.lock();
            state.calls.push(SignalCall { pid, signal });
            state.outcomes.pop_front().unwrap_or(Ok(()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcessSignal, SignalCall};

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
