// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status vocabularies shared by the cluster scheduler, local scheduler, and
//! the workflow dispatcher.

use serde::{Deserialize, Serialize};

/// Job status as seen through the shared vocabulary (the cluster scheduler
/// translates DRMAA's native symbols into this set at the adapter boundary;
/// the local scheduler produces it directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    NotSubmitted,
    QueuedActive,
    Running,
    UserSuspended,
    UserOnHold,
    UserSystemSuspended,
    UserSystemOnHold,
    Done,
    Failed,
}

crate::simple_display! {
    JobStatus {
        NotSubmitted => "not_submitted",
        QueuedActive => "queued_active",
        Running => "running",
        UserSuspended => "user_suspended",
        UserOnHold => "user_on_hold",
        UserSystemSuspended => "user_system_suspended",
        UserSystemOnHold => "user_system_on_hold",
        Done => "done",
        Failed => "failed",
    }
}

impl JobStatus {
    /// A terminal status is one the scheduler will never advance from.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn is_submitted(self) -> bool {
        !matches!(self, JobStatus::NotSubmitted)
    }
}

/// Outcome recorded once a job reaches a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitStatusKind {
    FinishedRegularly,
    UserKilled,
    ExitAborted,
}

crate::simple_display! {
    ExitStatusKind {
        FinishedRegularly => "finished_regularly",
        UserKilled => "user_killed",
        ExitAborted => "exit_aborted",
    }
}

/// Exit information harvested once, then retained for the caller to read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitInfo {
    pub kind: ExitStatusKind,
    pub exit_value: Option<i32>,
    pub term_signal: Option<String>,
    pub resource_usage: String,
}

impl ExitInfo {
    pub fn finished(exit_value: i32) -> Self {
        Self {
            kind: ExitStatusKind::FinishedRegularly,
            exit_value: Some(exit_value),
            term_signal: None,
            resource_usage: String::new(),
        }
    }

    pub fn killed() -> Self {
        Self {
            kind: ExitStatusKind::UserKilled,
            exit_value: None,
            term_signal: Some("SIGKILL".to_string()),
            resource_usage: String::new(),
        }
    }

    pub fn aborted() -> Self {
        Self {
            kind: ExitStatusKind::ExitAborted,
            exit_value: None,
            term_signal: None,
            resource_usage: String::new(),
        }
    }
}

/// Transfer lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    TransferNotReady,
    ReadyToTransfer,
    Transfered,
}

crate::simple_display! {
    TransferStatus {
        TransferNotReady => "transfer_not_ready",
        ReadyToTransfer => "ready_to_transfer",
        Transfered => "transfered",
    }
}

impl TransferStatus {
    pub fn is_complete(self) -> bool {
        matches!(self, TransferStatus::Transfered)
    }

    /// Completion as observed by a node that *reads* from this transfer
    /// (a file-retrieving node only needs the local copy to exist).
    pub fn is_ready_for_retrieval(self) -> bool {
        matches!(self, TransferStatus::ReadyToTransfer)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
