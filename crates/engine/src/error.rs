// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds for the schedulers and the client-facing facade.

use thiserror::Error;
use wfs_core::JobId;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job command is empty")]
    EmptyCommand,
    #[error("unknown parallel configuration: {0}")]
    UnknownParallelConfiguration(String),
    #[error("no parallel job configuration available")]
    MissingParallelConfiguration,
    #[error("drmaa returned no job id for submission")]
    EmptySubmission,
    #[error("launch failed: {0}")]
    LaunchFailed(String),
    #[error("unknown job id: {0}")]
    UnknownJob(JobId),
    #[error("refresh thread appears to be dead: no status update for {0} intervals")]
    RefreshThreadDead(u32),
    #[error(transparent)]
    Drmaa(#[from] wfs_adapters::DrmaaError),
}

/// The facade's authorization refusal is deliberately silent (no error
/// variant carries information back to an unauthorized caller); this error
/// type covers only the failures a legitimate owner can still hit.
#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("not authorized for this operation")]
    Refused,
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("io error streaming a job or transfer file: {0}")]
    Io(#[from] std::io::Error),
}
