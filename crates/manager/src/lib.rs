// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Job lifecycle commands for Deckhand: check, list, wait, kill.
//!
//! Reads consult the store first and fall back to legacy status files;
//! mutations always land in the store. Kill composes input validation,
//! the read chain, and real OS signaling with ESRCH race resolution.

mod env;
mod error;
mod manager;
mod poll;
mod signal;
mod sources;

pub use error::CommandError;
pub use manager::{JobFilter, JobManager, MIN_WAIT_TIMEOUT_MS};
pub use poll::{Poller, Tick};
pub use signal::{KillSignal, ProcessSignal, SignalError, UnixProcessSignal};
pub use sources::{JobSource, LegacySource, SourceChain, StoreSource};

#[cfg(any(test, feature = "test-support"))]
pub use signal::{FakeProcessSignal, SignalCall};
