// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Job Server capability contract: a persisted store of users, jobs,
//! transfers, and workflows. Implementations own their own interior
//! locking; every method here is atomic with respect to the caller.

use std::path::{Path, PathBuf};

use wfs_core::{ExitInfo, Job, JobId, JobStatus, Transfer, TransferId, UserId, Workflow, WorkflowId};

use crate::error::JobServerError;

/// Information recoverable about a transfer from its local staging path.
#[derive(Debug, Clone)]
pub struct TransferLookup {
    pub id: TransferId,
    pub owner: UserId,
    pub workflow_id: Option<WorkflowId>,
}

/// Capability contract consumed by both schedulers and the client facade.
/// `InMemoryJobServer` is the shipped reference implementation; production
/// deployments are expected to back this trait with a real database.
pub trait JobServer: Send + Sync {
    fn register_user(&self, login: &str) -> UserId;

    fn add_job(&self, job: Job);
    fn get_job(&self, id: JobId) -> Option<Job>;
    fn delete_job(&self, id: JobId);
    fn get_jobs(&self, user: UserId) -> Vec<JobId>;

    /// Record the logical input/output file paths a job references, for
    /// workflow-rewrite auditing and future staging/cleanup passes.
    fn register_inputs(&self, job_id: JobId, paths: Vec<String>);
    fn register_outputs(&self, job_id: JobId, paths: Vec<String>);

    /// Allocate a fresh, unique local staging path for this user. When
    /// `remote` is provided it is used only to shape a readable file name;
    /// uniqueness is guaranteed regardless.
    fn generate_local_file_path(&self, user: UserId, remote: Option<&str>) -> PathBuf;

    fn add_transfer(&self, transfer: Transfer);
    fn remove_transfer(&self, id: TransferId);
    fn set_transfer_status(&self, id: TransferId, status: wfs_core::TransferStatus);
    fn get_transfer_status(&self, id: TransferId) -> Option<wfs_core::TransferStatus>;
    fn get_transfer(&self, id: TransferId) -> Option<Transfer>;
    fn get_transfer_information(&self, local_path: &Path) -> Option<TransferLookup>;
    fn get_transfers(&self, user: UserId) -> Vec<TransferId>;

    fn add_workflow(&self, workflow: Workflow, owner: UserId);
    fn set_workflow(&self, workflow: Workflow);
    fn delete_workflow(&self, id: WorkflowId);
    fn get_workflow(&self, id: WorkflowId) -> Option<Workflow>;
    fn get_workflows(&self, user: UserId) -> Vec<WorkflowId>;

    fn set_submission_information(&self, job_id: JobId, drmaa_id: &str, now_epoch_ms: u64);
    fn set_job_status(&self, job_id: JobId, status: JobStatus, now_epoch_ms: u64);
    fn get_job_status(&self, job_id: JobId) -> Option<JobStatus>;
    fn get_job_status_with_update(&self, job_id: JobId) -> Option<(JobStatus, u64)>;
    fn set_job_exit_info(&self, job_id: JobId, exit_info: ExitInfo);
    fn get_drmaa_job_id(&self, job_id: JobId) -> Option<String>;

    fn is_user_job(&self, user: UserId, job_id: JobId) -> bool;
    fn is_user_transfer(&self, user: UserId, transfer_id: TransferId) -> bool;
    fn is_user_workflow(&self, user: UserId, workflow_id: WorkflowId) -> bool;

    fn get_std_out_err_file_path(&self, job_id: JobId) -> Option<(PathBuf, PathBuf)>;
}

/// Convenience for the common "refuse if not owner" pattern used throughout
/// the facade: returns [`JobServerError::UnknownJob`] both when the job is
/// missing and when it belongs to someone else, so a caller can't
/// distinguish "doesn't exist" from "not yours".
pub fn require_owned_job(
    server: &dyn JobServer,
    user: UserId,
    job_id: JobId,
) -> Result<(), JobServerError> {
    if server.is_user_job(user, job_id) {
        Ok(())
    } else {
        Err(JobServerError::UnknownJob)
    }
}

pub fn require_owned_transfer(
    server: &dyn JobServer,
    user: UserId,
    transfer_id: TransferId,
) -> Result<(), JobServerError> {
    if server.is_user_transfer(user, transfer_id) {
        Ok(())
    } else {
        Err(JobServerError::UnknownTransfer)
    }
}

pub fn require_owned_workflow(
    server: &dyn JobServer,
    user: UserId,
    workflow_id: WorkflowId,
) -> Result<(), JobServerError> {
    if server.is_user_workflow(user, workflow_id) {
        Ok(())
    } else {
        Err(JobServerError::UnknownWorkflow)
    }
}
