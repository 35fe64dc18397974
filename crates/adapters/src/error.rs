// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DrmaaError {
    #[error("drmaa returned no job id for submission")]
    EmptySubmission,
    #[error("drmaa operation failed: {0}")]
    OperationFailed(String),
    #[error("job has not reached a terminal state")]
    WouldBlock,
    #[error("unknown drmaa job id: {0}")]
    UnknownJob(String),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to open {path}: {source}")]
    OpenFile { path: String, source: std::io::Error },
    #[error("failed to spawn process: {0}")]
    Spawn(std::io::Error),
    #[error("failed to signal process: {0}")]
    Signal(std::io::Error),
}
