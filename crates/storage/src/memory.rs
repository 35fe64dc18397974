// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference Job Server: a single in-process table behind one
//! `parking_lot::Mutex`, good enough for single-process deployments and the
//! test suite. Production deployments back [`crate::JobServer`] with a real
//! database at this same seam.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use wfs_core::{
    ExitInfo, Job, JobId, JobStatus, Transfer, TransferId, TransferStatus, UserId, Workflow,
    WorkflowId,
};

use crate::job_server::{JobServer, TransferLookup};

#[derive(Default)]
struct Store {
    users: HashMap<String, UserId>,
    jobs: HashMap<JobId, Job>,
    transfers: HashMap<TransferId, Transfer>,
    transfer_by_path: HashMap<PathBuf, TransferId>,
    workflows: HashMap<WorkflowId, (Workflow, UserId)>,
    next_staging_seq: u64,
    staging_root: PathBuf,
}

pub struct InMemoryJobServer {
    inner: Mutex<Store>,
}

impl InMemoryJobServer {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Store { staging_root: staging_root.into(), ..Store::default() }),
        }
    }
}

impl Default for InMemoryJobServer {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("wfs-staging"))
    }
}

impl JobServer for InMemoryJobServer {
    fn register_user(&self, login: &str) -> UserId {
        let mut store = self.inner.lock();
        if let Some(id) = store.users.get(login) {
            return *id;
        }
        let id = UserId::new();
        store.users.insert(login.to_string(), id);
        tracing::info!(%login, user_id = %id, "registered user");
        id
    }

    fn add_job(&self, job: Job) {
        self.inner.lock().jobs.insert(job.id, job);
    }

    fn get_job(&self, id: JobId) -> Option<Job> {
        self.inner.lock().jobs.get(&id).cloned()
    }

    fn delete_job(&self, id: JobId) {
        self.inner.lock().jobs.remove(&id);
    }

    fn get_jobs(&self, user: UserId) -> Vec<JobId> {
        self.inner.lock().jobs.values().filter(|j| j.owner == user).map(|j| j.id).collect()
    }

    fn register_inputs(&self, job_id: JobId, paths: Vec<String>) {
        if let Some(job) = self.inner.lock().jobs.get_mut(&job_id) {
            job.referenced_input_files = paths;
        }
    }

    fn register_outputs(&self, job_id: JobId, paths: Vec<String>) {
        if let Some(job) = self.inner.lock().jobs.get_mut(&job_id) {
            job.referenced_output_files = paths;
        }
    }

    fn generate_local_file_path(&self, user: UserId, remote: Option<&str>) -> PathBuf {
        let mut store = self.inner.lock();
        store.next_staging_seq += 1;
        let seq = store.next_staging_seq;
        let name = remote
            .and_then(|r| r.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("transfer");
        store.staging_root.join(format!("{}-{}-{}", user.suffix(), seq, name))
    }

    fn add_transfer(&self, transfer: Transfer) {
        let mut store = self.inner.lock();
        store.transfer_by_path.insert(transfer.local_path.clone(), transfer.id);
        store.transfers.insert(transfer.id, transfer);
    }

    fn remove_transfer(&self, id: TransferId) {
        let mut store = self.inner.lock();
        if let Some(t) = store.transfers.remove(&id) {
            store.transfer_by_path.remove(&t.local_path);
        }
    }

    fn set_transfer_status(&self, id: TransferId, status: TransferStatus) {
        if let Some(t) = self.inner.lock().transfers.get_mut(&id) {
            t.status = status;
        }
    }

    fn get_transfer_status(&self, id: TransferId) -> Option<TransferStatus> {
        self.inner.lock().transfers.get(&id).map(|t| t.status)
    }

    fn get_transfer(&self, id: TransferId) -> Option<Transfer> {
        self.inner.lock().transfers.get(&id).cloned()
    }

    fn get_transfer_information(&self, local_path: &Path) -> Option<TransferLookup> {
        let store = self.inner.lock();
        let id = *store.transfer_by_path.get(local_path)?;
        let t = store.transfers.get(&id)?;
        Some(TransferLookup { id, owner: t.owner, workflow_id: t.workflow_id })
    }

    fn get_transfers(&self, user: UserId) -> Vec<TransferId> {
        self.inner.lock().transfers.values().filter(|t| t.owner == user).map(|t| t.id).collect()
    }

    fn add_workflow(&self, workflow: Workflow, owner: UserId) {
        self.inner.lock().workflows.insert(workflow.id, (workflow, owner));
    }

    fn set_workflow(&self, workflow: Workflow) {
        let mut store = self.inner.lock();
        if let Some(entry) = store.workflows.get_mut(&workflow.id) {
            entry.0 = workflow;
        }
    }

    fn delete_workflow(&self, id: WorkflowId) {
        self.inner.lock().workflows.remove(&id);
    }

    fn get_workflow(&self, id: WorkflowId) -> Option<Workflow> {
        self.inner.lock().workflows.get(&id).map(|(w, _)| w.clone())
    }

    fn get_workflows(&self, user: UserId) -> Vec<WorkflowId> {
        self.inner
            .lock()
            .workflows
            .values()
            .filter(|(_, owner)| *owner == user)
            .map(|(w, _)| w.id)
            .collect()
    }

    fn set_submission_information(&self, job_id: JobId, drmaa_id: &str, now_epoch_ms: u64) {
        if let Some(job) = self.inner.lock().jobs.get_mut(&job_id) {
            job.mark_submitted(drmaa_id, now_epoch_ms);
        }
    }

    fn set_job_status(&self, job_id: JobId, status: JobStatus, now_epoch_ms: u64) {
        if let Some(job) = self.inner.lock().jobs.get_mut(&job_id) {
            job.set_status(status, now_epoch_ms);
        }
    }

    fn get_job_status(&self, job_id: JobId) -> Option<JobStatus> {
        self.inner.lock().jobs.get(&job_id).map(|j| j.status)
    }

    fn get_job_status_with_update(&self, job_id: JobId) -> Option<(JobStatus, u64)> {
        self.inner.lock().jobs.get(&job_id).map(|j| (j.status, j.last_status_update_epoch_ms))
    }

    fn set_job_exit_info(&self, job_id: JobId, exit_info: ExitInfo) {
        if let Some(job) = self.inner.lock().jobs.get_mut(&job_id) {
            job.exit_info = Some(exit_info);
        }
    }

    fn get_drmaa_job_id(&self, job_id: JobId) -> Option<String> {
        self.inner.lock().jobs.get(&job_id).and_then(|j| j.drmaa_id.clone())
    }

    fn is_user_job(&self, user: UserId, job_id: JobId) -> bool {
        self.inner.lock().jobs.get(&job_id).is_some_and(|j| j.owner == user)
    }

    fn is_user_transfer(&self, user: UserId, transfer_id: TransferId) -> bool {
        self.inner.lock().transfers.get(&transfer_id).is_some_and(|t| t.owner == user)
    }

    fn is_user_workflow(&self, user: UserId, workflow_id: WorkflowId) -> bool {
        self.inner.lock().workflows.get(&workflow_id).is_some_and(|(_, owner)| *owner == user)
    }

    fn get_std_out_err_file_path(&self, job_id: JobId) -> Option<(PathBuf, PathBuf)> {
        self.inner.lock().jobs.get(&job_id).map(|j| (j.stdout_path.clone(), j.stderr_path.clone()))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
