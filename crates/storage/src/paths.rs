// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Well-known filesystem locations for the store and legacy files.

use crate::store::StoreError;
use std::path::PathBuf;

/// Resolve the state directory: `DH_STATE_DIR` > `$XDG_STATE_HOME/deckhand`
/// > `~/.local/state/deckhand`.
pub fn state_dir() -> Result<PathBuf, StoreError> {
    if let Ok(dir) = std::env::var("DH_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("deckhand"));
    }
    let home = std::env::var("HOME").map_err(|_| StoreError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/deckhand"))
}

/// Default prompts directory, where the spawner drops prompt artifacts and
/// where legacy per-job status files live.
pub fn prompts_dir() -> Result<PathBuf, StoreError> {
    Ok(state_dir()?.join("prompts"))
}
