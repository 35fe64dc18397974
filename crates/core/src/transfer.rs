// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File transfer records: a mapping from a client-named remote path to a
//! locally generated staging path.

use crate::job::{TransferId, UserId, WorkflowId};
use crate::status::TransferStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub owner: UserId,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub expiration_epoch_ms: u64,
    pub status: TransferStatus,
    pub workflow_id: Option<WorkflowId>,
}

impl Transfer {
    pub fn new(
        id: TransferId,
        owner: UserId,
        remote_path: impl Into<String>,
        local_path: PathBuf,
        disposal_timeout_hours: u32,
        now_epoch_ms: u64,
    ) -> Self {
        Self {
            id,
            owner,
            remote_path: remote_path.into(),
            local_path,
            expiration_epoch_ms: now_epoch_ms + u64::from(disposal_timeout_hours) * 3_600_000,
            status: TransferStatus::TransferNotReady,
            workflow_id: None,
        }
    }
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
