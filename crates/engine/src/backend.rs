// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unifies [`crate::cluster::ClusterScheduler`] and
//! [`crate::local::LocalScheduler`] behind one trait so the facade can be
//! built against either without knowing which backend it was given.
//! Construction-time injection only — there is no global scheduler
//! singleton anywhere in this crate.

use std::time::Duration;

use async_trait::async_trait;
use wfs_core::{JobId, JobStatus, JobTemplate, UserId, Workflow, WorkflowId};

use wfs_storage::JobServer;

use crate::error::SchedulerError;

#[async_trait]
pub trait SchedulerBackend: Send + Sync {
    async fn submit(&self, owner: UserId, template: JobTemplate) -> Result<JobId, SchedulerError>;
    async fn submit_workflow(&self, owner: UserId, workflow: Workflow) -> Result<WorkflowId, SchedulerError>;
    async fn stop(&self, job_id: JobId) -> Result<(), SchedulerError>;
    async fn restart(&self, job_id: JobId) -> Result<(), SchedulerError>;
    async fn kill(&self, job_id: JobId) -> Result<(), SchedulerError>;
    async fn dispose(&self, job_id: JobId) -> Result<(), SchedulerError>;
    async fn wait_for_status_update(&self, job_id: JobId, issued_at_epoch_ms: u64) -> Result<JobStatus, SchedulerError>;
    /// Re-evaluate a workflow's dependency graph now, rather than waiting
    /// for the next scheduled refresh tick. Used to react to an externally
    /// signalled transfer completion.
    async fn dispatch_workflow(&self, workflow_id: WorkflowId);
    fn refresh_interval(&self) -> Duration;
    fn job_server(&self) -> &dyn JobServer;
}

#[async_trait]
impl<D: wfs_adapters::DrmaaAdapter, C: wfs_core::Clock> SchedulerBackend for crate::cluster::ClusterScheduler<D, C> {
    async fn submit(&self, owner: UserId, template: JobTemplate) -> Result<JobId, SchedulerError> {
        self.submit(owner, template).await
    }

    async fn submit_workflow(&self, owner: UserId, workflow: Workflow) -> Result<WorkflowId, SchedulerError> {
        self.submit_workflow(owner, workflow).await
    }

    async fn stop(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.stop(job_id).await
    }

    async fn restart(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.restart(job_id).await
    }

    async fn kill(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.kill(job_id).await
    }

    async fn dispose(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.dispose(job_id).await
    }

    async fn wait_for_status_update(&self, job_id: JobId, issued_at_epoch_ms: u64) -> Result<JobStatus, SchedulerError> {
        self.wait_for_status_update(job_id, issued_at_epoch_ms).await
    }

    async fn dispatch_workflow(&self, workflow_id: WorkflowId) {
        self.dispatch_workflow(workflow_id).await
    }

    fn refresh_interval(&self) -> Duration {
        self.config().refresh_interval()
    }

    fn job_server(&self) -> &dyn JobServer {
        self.job_server()
    }
}

#[async_trait]
impl<M: wfs_adapters::CpuMonitor, C: wfs_core::Clock> SchedulerBackend for crate::local::LocalScheduler<M, C> {
    async fn submit(&self, owner: UserId, template: JobTemplate) -> Result<JobId, SchedulerError> {
        self.submit(owner, template)
    }

    async fn submit_workflow(&self, owner: UserId, workflow: Workflow) -> Result<WorkflowId, SchedulerError> {
        self.submit_workflow(owner, workflow)
    }

    async fn stop(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.stop(job_id).await
    }

    async fn restart(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.restart(job_id).await
    }

    async fn kill(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.kill(job_id).await
    }

    async fn dispose(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.dispose(job_id).await
    }

    async fn wait_for_status_update(&self, job_id: JobId, issued_at_epoch_ms: u64) -> Result<JobStatus, SchedulerError> {
        self.wait_for_status_update(job_id, issued_at_epoch_ms).await
    }

    async fn dispatch_workflow(&self, workflow_id: WorkflowId) {
        self.dispatch_workflow(workflow_id).await
    }

    fn refresh_interval(&self) -> Duration {
        self.config().refresh_interval()
    }

    fn job_server(&self) -> &dyn JobServer {
        self.job_server()
    }
}
