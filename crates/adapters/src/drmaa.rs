// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The DRMAA binding capability contract. A real implementation wraps an
//! external cluster's DRMAA C library (typically blocking FFI); the `async`
//! boundary here lets the cluster scheduler drive it from `spawn_blocking`
//! without redesigning the trait. `allocateJobTemplate` / `setAttribute` /
//! `runJob` / `deleteJobTemplate` from the capability contract are bundled
//! into a single [`DrmaaAdapter::submit`] call — the template handle is
//! binding-internal plumbing the scheduler never needs to see.

use std::path::PathBuf;

use async_trait::async_trait;
use wfs_core::{ExitInfo, JobStatus};

use crate::error::DrmaaError;

/// Fully-resolved submission: every path is concrete, every parallel
/// attribute has already been expanded by the caller (the cluster
/// scheduler owns the parallel-job attribute templates; the binding only
/// ever sees finished key/value pairs).
#[derive(Debug, Clone)]
pub struct DrmaaSubmission {
    pub command: Vec<String>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub join_files: bool,
    pub stdin_path: Option<PathBuf>,
    pub working_directory: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub attributes: Vec<(String, String)>,
}

#[async_trait]
pub trait DrmaaAdapter: Send + Sync + 'static {
    async fn submit(&self, submission: DrmaaSubmission) -> Result<String, DrmaaError>;
    async fn status(&self, drmaa_id: &str) -> Result<JobStatus, DrmaaError>;
    /// Non-blocking harvest (`wait(drmaa_id, 0)` in the capability contract);
    /// returns [`DrmaaError::WouldBlock`] if the job has not yet finished.
    async fn wait(&self, drmaa_id: &str) -> Result<ExitInfo, DrmaaError>;
    async fn suspend(&self, drmaa_id: &str) -> Result<(), DrmaaError>;
    async fn resume(&self, drmaa_id: &str) -> Result<(), DrmaaError>;
    async fn hold(&self, drmaa_id: &str) -> Result<(), DrmaaError>;
    async fn release(&self, drmaa_id: &str) -> Result<(), DrmaaError>;
    async fn terminate(&self, drmaa_id: &str) -> Result<(), DrmaaError>;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Hold {
        None,
        User,
    }

    struct FakeJob {
        status: JobStatus,
        hold: Hold,
        exit_info: Option<ExitInfo>,
    }

    /// Deterministic test double for [`DrmaaAdapter`]. Jobs start
    /// `QueuedActive` on submit; tests drive them to completion with
    /// [`FakeDrmaa::complete`] / [`FakeDrmaa::fail`].
    #[derive(Clone)]
    pub struct FakeDrmaa {
        jobs: Arc<Mutex<HashMap<String, FakeJob>>>,
        next_id: Arc<AtomicU64>,
        fail_next_submission: Arc<Mutex<bool>>,
    }

    impl Default for FakeDrmaa {
        fn default() -> Self {
            Self {
                jobs: Arc::new(Mutex::new(HashMap::new())),
                next_id: Arc::new(AtomicU64::new(1)),
                fail_next_submission: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl FakeDrmaa {
        pub fn new() -> Self {
            Self::default()
        }

        /// Causes the next [`DrmaaAdapter::submit`] call to fail as if the
        /// binding returned an empty job id.
        pub fn fail_next_submission(&self) {
            *self.fail_next_submission.lock() = true;
        }

        pub fn mark_running(&self, drmaa_id: &str) {
            if let Some(j) = self.jobs.lock().get_mut(drmaa_id) {
                j.status = JobStatus::Running;
            }
        }

        pub fn complete(&self, drmaa_id: &str, exit_value: i32) {
            let mut jobs = self.jobs.lock();
            if let Some(j) = jobs.get_mut(drmaa_id) {
                j.status = JobStatus::Done;
                j.exit_info = Some(ExitInfo::finished(exit_value));
            }
        }

        pub fn fail(&self, drmaa_id: &str) {
            let mut jobs = self.jobs.lock();
            if let Some(j) = jobs.get_mut(drmaa_id) {
                j.status = JobStatus::Failed;
                j.exit_info = Some(ExitInfo::aborted());
            }
        }

        pub fn is_known(&self, drmaa_id: &str) -> bool {
            self.jobs.lock().contains_key(drmaa_id)
        }
    }

    #[async_trait]
    impl DrmaaAdapter for FakeDrmaa {
        async fn submit(&self, _submission: DrmaaSubmission) -> Result<String, DrmaaError> {
            let mut should_fail = self.fail_next_submission.lock();
            if *should_fail {
                *should_fail = false;
                return Err(DrmaaError::EmptySubmission);
            }
            drop(should_fail);
            let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
            self.jobs.lock().insert(
                id.clone(),
                FakeJob { status: JobStatus::QueuedActive, hold: Hold::None, exit_info: None },
            );
            Ok(id)
        }

        async fn status(&self, drmaa_id: &str) -> Result<JobStatus, DrmaaError> {
            self.jobs
                .lock()
                .get(drmaa_id)
                .map(|j| j.status)
                .ok_or_else(|| DrmaaError::UnknownJob(drmaa_id.to_string()))
        }

        async fn wait(&self, drmaa_id: &str) -> Result<ExitInfo, DrmaaError> {
            let jobs = self.jobs.lock();
            let job = jobs.get(drmaa_id).ok_or_else(|| DrmaaError::UnknownJob(drmaa_id.to_string()))?;
            job.exit_info.clone().ok_or(DrmaaError::WouldBlock)
        }

        async fn suspend(&self, drmaa_id: &str) -> Result<(), DrmaaError> {
            let mut jobs = self.jobs.lock();
            let job = jobs.get_mut(drmaa_id).ok_or_else(|| DrmaaError::UnknownJob(drmaa_id.to_string()))?;
            job.status = JobStatus::UserSuspended;
            Ok(())
        }

        async fn resume(&self, drmaa_id: &str) -> Result<(), DrmaaError> {
            let mut jobs = self.jobs.lock();
            let job = jobs.get_mut(drmaa_id).ok_or_else(|| DrmaaError::UnknownJob(drmaa_id.to_string()))?;
            job.status = JobStatus::Running;
            Ok(())
        }

        async fn hold(&self, drmaa_id: &str) -> Result<(), DrmaaError> {
            let mut jobs = self.jobs.lock();
            let job = jobs.get_mut(drmaa_id).ok_or_else(|| DrmaaError::UnknownJob(drmaa_id.to_string()))?;
            job.hold = Hold::User;
            job.status = JobStatus::UserOnHold;
            Ok(())
        }

        async fn release(&self, drmaa_id: &str) -> Result<(), DrmaaError> {
            let mut jobs = self.jobs.lock();
            let job = jobs.get_mut(drmaa_id).ok_or_else(|| DrmaaError::UnknownJob(drmaa_id.to_string()))?;
            job.hold = Hold::None;
            job.status = JobStatus::QueuedActive;
            Ok(())
        }

        async fn terminate(&self, drmaa_id: &str) -> Result<(), DrmaaError> {
            let mut jobs = self.jobs.lock();
            let job = jobs.get_mut(drmaa_id).ok_or_else(|| DrmaaError::UnknownJob(drmaa_id.to_string()))?;
            job.status = JobStatus::Failed;
            job.exit_info = Some(ExitInfo::killed());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeDrmaa;

#[cfg(test)]
#[path = "drmaa_tests.rs"]
mod tests;
