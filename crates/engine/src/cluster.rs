// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The cluster scheduler: submits work through a [`DrmaaAdapter`], runs a
//! background status-refresh loop, and drives workflow DAGs through the
//! shared [`crate::dispatcher`] logic.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use wfs_adapters::{DrmaaAdapter, DrmaaSubmission};
use wfs_core::{
    Clock, ExitInfo, Job, JobId, JobStatus, JobTemplate, SystemClock, Transfer, TransferId,
    TransferStatus, UserId, Workflow, WorkflowId, WorkflowNode,
};
use wfs_storage::JobServer;

use crate::config::SchedulerConfig;
use crate::dispatcher::{evaluate_ready, WorkflowRegistration};
use crate::error::SchedulerError;

pub struct ClusterScheduler<D: DrmaaAdapter, C: Clock = SystemClock> {
    server: Arc<dyn JobServer>,
    drmaa: Arc<D>,
    config: Mutex<SchedulerConfig>,
    clock: C,
    /// Jobs submitted through this scheduler that are not yet terminal.
    tracked: Mutex<HashSet<JobId>>,
    registrations: Mutex<HashMap<WorkflowId, WorkflowRegistration>>,
    /// True iff no tracked job was non-terminal as of the last refresh tick.
    all_jobs_ended: Mutex<bool>,
}

impl<D: DrmaaAdapter> ClusterScheduler<D, SystemClock> {
    pub fn new(server: Arc<dyn JobServer>, drmaa: Arc<D>, config: SchedulerConfig) -> Self {
        Self::with_clock(server, drmaa, config, SystemClock)
    }
}

impl<D: DrmaaAdapter, C: Clock> ClusterScheduler<D, C> {
    pub fn with_clock(server: Arc<dyn JobServer>, drmaa: Arc<D>, config: SchedulerConfig, clock: C) -> Self {
        Self {
            server,
            drmaa,
            config: Mutex::new(config),
            clock,
            tracked: Mutex::new(HashSet::new()),
            registrations: Mutex::new(HashMap::new()),
            all_jobs_ended: Mutex::new(true),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config.lock().clone()
    }

    pub fn set_tick_interval_ms(&self, ms: u64) {
        self.config.lock().refresh_interval_ms = ms;
    }

    /// Apply runtime-mutable fields (currently just the tick interval) from
    /// every update published on `rx`, until the channel closes or
    /// `cancellation` fires.
    pub async fn apply_config_updates(&self, mut rx: tokio::sync::watch::Receiver<SchedulerConfig>, cancellation: tokio_util::sync::CancellationToken) {
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let new_config = rx.borrow_and_update().clone();
                    self.set_tick_interval_ms(new_config.refresh_interval_ms);
                    tracing::info!(refresh_interval_ms = new_config.refresh_interval_ms, "applied reloaded scheduler configuration");
                }
            }
        }
    }

    /// True iff, as of the last refresh tick, no submitted job tracked by
    /// this scheduler remained non-terminal.
    pub fn all_jobs_ended(&self) -> bool {
        *self.all_jobs_ended.lock()
    }

    fn resolve_std_paths(&self, owner: UserId, template: &JobTemplate) -> (PathBuf, bool) {
        match (&template.stdout_path, &template.stderr_path) {
            (None, None) => (self.server.generate_local_file_path(owner, None), false),
            _ => (
                template
                    .stdout_path
                    .clone()
                    .unwrap_or_else(|| self.server.generate_local_file_path(owner, None)),
                true,
            ),
        }
    }

    fn resolve_stderr_path(&self, owner: UserId, template: &JobTemplate, stdout_path: &PathBuf) -> PathBuf {
        if template.join_stderr_to_stdout {
            return stdout_path.clone();
        }
        template
            .stderr_path
            .clone()
            .unwrap_or_else(|| self.server.generate_local_file_path(owner, None))
    }

    /// Register a standalone job with the Job Server and submit it to DRMAA.
    pub async fn submit(&self, owner: UserId, template: JobTemplate) -> Result<JobId, SchedulerError> {
        if !template.is_valid() {
            return Err(SchedulerError::EmptyCommand);
        }
        let now = self.clock.epoch_ms();
        let (stdout_path, _custom) = self.resolve_std_paths(owner, &template);
        let stderr_path = self.resolve_stderr_path(owner, &template, &stdout_path);
        let job_id = JobId::new();
        let job = Job::new(job_id, owner, &template, stdout_path.clone(), stderr_path.clone(), now);
        self.server.add_job(job);
        self.server.register_inputs(job_id, template.referenced_input_files.clone());
        self.server.register_outputs(job_id, template.referenced_output_files.clone());
        self.submit_to_drmaa(job_id, &template, stdout_path, stderr_path).await?;
        Ok(job_id)
    }

    async fn submit_to_drmaa(
        &self,
        job_id: JobId,
        template: &JobTemplate,
        stdout_path: PathBuf,
        stderr_path: PathBuf,
    ) -> Result<(), SchedulerError> {
        let attributes = self.expand_parallel_attributes(template)?;
        let env = self.parallel_env();
        let submission = DrmaaSubmission {
            command: template.command.clone(),
            stdout_path,
            stderr_path,
            join_files: template.join_stderr_to_stdout,
            stdin_path: template.stdin_path.clone(),
            working_directory: template.working_directory.clone(),
            env,
            attributes,
        };
        match self.drmaa.submit(submission).await {
            Ok(drmaa_id) if !drmaa_id.is_empty() => {
                self.server.set_submission_information(job_id, &drmaa_id, self.clock.epoch_ms());
                self.tracked.lock().insert(job_id);
                Ok(())
            }
            Ok(_) => {
                tracing::error!(%job_id, "drmaa submission returned an empty job id");
                Err(SchedulerError::EmptySubmission)
            }
            Err(source) => {
                tracing::error!(%job_id, error = %source, "drmaa submission failed");
                Err(SchedulerError::Drmaa(source))
            }
        }
    }

    fn expand_parallel_attributes(&self, template: &JobTemplate) -> Result<Vec<(String, String)>, SchedulerError> {
        let Some(descriptor) = &template.parallel_job else {
            return Ok(Vec::new());
        };
        let config = self.config.lock();
        let cluster_name = config
            .parallel_job
            .resolve(&descriptor.configuration_name)
            .ok_or_else(|| SchedulerError::UnknownParallelConfiguration(descriptor.configuration_name.clone()))?
            .to_string();
        if config.parallel_job.attribute_templates.is_empty() {
            return Err(SchedulerError::MissingParallelConfiguration);
        }
        let max_node = descriptor.max_node_number.to_string();
        Ok(config
            .parallel_job
            .attribute_templates
            .iter()
            .map(|(name, value)| {
                let resolved = value.replace("{config_name}", &cluster_name).replace("{max_node}", &max_node);
                (name.clone(), resolved)
            })
            .collect())
    }

    fn parallel_env(&self) -> Vec<(String, String)> {
        let config = self.config.lock();
        config
            .parallel_job
            .env_keys
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value.trim_end().to_string())))
            .collect()
    }

    /// Register every node of a workflow, submitting its source job nodes
    /// immediately; remaining nodes are picked up by the dispatcher as their
    /// predecessors complete.
    pub async fn submit_workflow(&self, owner: UserId, mut workflow: Workflow) -> Result<WorkflowId, SchedulerError> {
        workflow.id = WorkflowId::new();
        let now = self.clock.epoch_ms();

        let mut node_transfer_ids = vec![None; workflow.nodes.len()];
        let mut remote_to_local: HashMap<String, PathBuf> = HashMap::new();
        for idx in 0..workflow.nodes.len() {
            let (remote_path, initial_status) = match &workflow.nodes[idx] {
                WorkflowNode::FileSending { remote_path } => (remote_path.clone(), TransferStatus::ReadyToTransfer),
                WorkflowNode::FileRetrieving { remote_path } => (remote_path.clone(), TransferStatus::TransferNotReady),
                WorkflowNode::Job(_) => continue,
            };
            let local_path = self.server.generate_local_file_path(owner, Some(&remote_path));
            let mut transfer = Transfer::new(TransferId::new(), owner, remote_path.clone(), local_path.clone(), 168, now);
            transfer.status = initial_status;
            transfer.workflow_id = Some(workflow.id);
            let transfer_id = transfer.id;
            self.server.add_transfer(transfer);
            node_transfer_ids[idx] = Some(transfer_id);
            remote_to_local.insert(remote_path, local_path);
        }

        let mut node_job_ids = vec![None; workflow.nodes.len()];
        for idx in 0..workflow.nodes.len() {
            if let WorkflowNode::Job(template) = workflow.nodes[idx].clone() {
                let rewritten = rewrite_template(&template, &remote_to_local);
                let (stdout_path, _custom) = self.resolve_std_paths(owner, &rewritten);
                let stderr_path = self.resolve_stderr_path(owner, &rewritten, &stdout_path);
                let job_id = JobId::new();
                let mut job = Job::new(job_id, owner, &rewritten, stdout_path, stderr_path, now);
                job.workflow_id = Some(workflow.id);
                self.server.add_job(job);
                self.server.register_inputs(job_id, rewritten.referenced_input_files.clone());
                self.server.register_outputs(job_id, rewritten.referenced_output_files.clone());
                node_job_ids[idx] = Some(job_id);
                workflow.nodes[idx] = WorkflowNode::Job(rewritten);
            }
        }

        self.server.add_workflow(workflow.clone(), owner);

        let mut registration = WorkflowRegistration::new(workflow.clone());
        registration.node_job_ids = node_job_ids;
        registration.node_transfer_ids = node_transfer_ids;
        // File-sending nodes are actionable the moment the workflow is
        // registered; they never wait in the dispatcher's "to inspect" set.
        for idx in 0..registration.node_job_ids.len() {
            if matches!(workflow.nodes[idx], WorkflowNode::FileSending { .. }) {
                registration.mark_dispatched(idx);
            }
        }

        let source_nodes = workflow.source_nodes();
        for idx in source_nodes {
            if let WorkflowNode::Job(template) = &workflow.nodes[idx] {
                let job_id = registration.node_job_ids[idx].expect("job node registered above");
                let job = self.server.get_job(job_id).expect("job just registered");
                if let Err(e) = self.submit_to_drmaa(job_id, template, job.stdout_path, job.stderr_path).await {
                    tracing::error!(%job_id, error = %e, "failed to submit workflow source node");
                }
                registration.mark_dispatched(idx);
            }
        }

        let workflow_id = workflow.id;
        self.registrations.lock().insert(workflow_id, registration);
        Ok(workflow_id)
    }

    /// One status-refresh tick: drop in-memory tracking for jobs no longer
    /// present in the Job Server (disposed through another path since the
    /// last tick), query DRMAA for everything still tracked, harvest exit
    /// information for newly terminal jobs, update the all-jobs-ended latch,
    /// then dispatch any workflows those jobs belong to.
    pub async fn refresh_tick(&self) {
        {
            let mut tracked = self.tracked.lock();
            tracked.retain(|job_id| self.server.get_job(*job_id).is_some());
        }

        let tracked: Vec<JobId> = self.tracked.lock().iter().copied().collect();
        let mut ended = Vec::new();
        for job_id in tracked {
            let Some(drmaa_id) = self.server.get_drmaa_job_id(job_id) else { continue };
            match self.drmaa.status(&drmaa_id).await {
                Ok(status) => {
                    self.server.set_job_status(job_id, status, self.clock.epoch_ms());
                    if status.is_terminal() {
                        if let Ok(exit_info) = self.drmaa.wait(&drmaa_id).await {
                            self.server.set_job_exit_info(job_id, exit_info);
                        }
                        ended.push(job_id);
                    }
                }
                Err(e) => tracing::warn!(%job_id, error = %e, "failed to refresh drmaa status"),
            }
        }

        let still_tracked = {
            let mut tracked = self.tracked.lock();
            for job_id in &ended {
                tracked.remove(job_id);
            }
            tracked.is_empty()
        };
        *self.all_jobs_ended.lock() = still_tracked;

        if ended.is_empty() {
            return;
        }
        let affected: HashSet<WorkflowId> = ended
            .iter()
            .filter_map(|id| self.server.get_job(*id).and_then(|j| j.workflow_id))
            .collect();
        for workflow_id in affected {
            self.dispatch_workflow(workflow_id).await;
        }
    }

    /// Spawn the background refresh loop: tick at the configured interval
    /// until `cancellation` fires.
    pub fn spawn_refresh_loop(
        self: Arc<Self>,
        cancellation: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()>
    where
        D: 'static,
        C: 'static,
    {
        tokio::spawn(async move {
            loop {
                let interval = self.config().refresh_interval();
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                self.refresh_tick().await;
            }
        })
    }

    /// Re-evaluate one workflow's readiness and act on whatever became
    /// ready: submit ready job nodes, flip ready transfer nodes to
    /// `ReadyToTransfer`.
    pub async fn dispatch_workflow(&self, workflow_id: WorkflowId) {
        let (ready_jobs, ready_transfers) = {
            let registrations = self.registrations.lock();
            let Some(registration) = registrations.get(&workflow_id) else { return };
            evaluate_ready(registration, &*self.server)
        };

        for idx in ready_jobs {
            let (job_id, template) = {
                let registrations = self.registrations.lock();
                let registration = &registrations[&workflow_id];
                let job_id = registration.node_job_ids[idx].expect("ready job node has a registered job id");
                let WorkflowNode::Job(template) = registration.workflow.nodes[idx].clone() else {
                    unreachable!("ready_jobs only contains job nodes")
                };
                (job_id, template)
            };
            let Some(job) = self.server.get_job(job_id) else { continue };
            if let Err(e) = self.submit_to_drmaa(job_id, &template, job.stdout_path, job.stderr_path).await {
                tracing::error!(%job_id, error = %e, "failed to submit ready workflow node");
            }
            self.registrations.lock().get_mut(&workflow_id).unwrap().mark_dispatched(idx);
        }

        for idx in ready_transfers {
            let transfer_id = {
                let mut registrations = self.registrations.lock();
                let registration = registrations.get_mut(&workflow_id).unwrap();
                let transfer_id = registration.node_transfer_ids[idx];
                registration.mark_dispatched(idx);
                transfer_id
            };
            if let Some(transfer_id) = transfer_id {
                self.server.set_transfer_status(transfer_id, TransferStatus::ReadyToTransfer);
            }
        }
    }

    /// Suspend (if running) or hold (if queued) a job, then wait for the
    /// refresh loop to publish the resulting status.
    pub async fn stop(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let status = self.server.get_job_status(job_id).ok_or(SchedulerError::UnknownJob(job_id))?;
        let drmaa_id = self.server.get_drmaa_job_id(job_id).ok_or(SchedulerError::UnknownJob(job_id))?;
        let issued_at = self.clock.epoch_ms();
        match status {
            JobStatus::Running => self.drmaa.suspend(&drmaa_id).await?,
            JobStatus::QueuedActive => self.drmaa.hold(&drmaa_id).await?,
            _ => return Ok(()),
        }
        self.wait_for_status_update(job_id, issued_at).await?;
        Ok(())
    }

    pub async fn restart(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let status = self.server.get_job_status(job_id).ok_or(SchedulerError::UnknownJob(job_id))?;
        let drmaa_id = self.server.get_drmaa_job_id(job_id).ok_or(SchedulerError::UnknownJob(job_id))?;
        let issued_at = self.clock.epoch_ms();
        match status {
            JobStatus::UserSuspended | JobStatus::UserSystemSuspended => self.drmaa.resume(&drmaa_id).await?,
            JobStatus::UserOnHold | JobStatus::UserSystemOnHold => self.drmaa.release(&drmaa_id).await?,
            _ => return Ok(()),
        }
        self.wait_for_status_update(job_id, issued_at).await?;
        Ok(())
    }

    pub async fn kill(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let status = self.server.get_job_status(job_id).ok_or(SchedulerError::UnknownJob(job_id))?;
        if status.is_terminal() {
            return Ok(());
        }
        if let Some(drmaa_id) = self.server.get_drmaa_job_id(job_id) {
            self.drmaa.terminate(&drmaa_id).await?;
        }
        self.server.set_job_exit_info(job_id, ExitInfo::killed());
        self.server.set_job_status(job_id, JobStatus::Failed, self.clock.epoch_ms());
        self.tracked.lock().remove(&job_id);
        Ok(())
    }

    pub async fn dispose(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.kill(job_id).await?;
        self.server.delete_job(job_id);
        Ok(())
    }

    /// Poll at the refresh interval until `job_id` is terminal or its
    /// last-status-update advances past `issued_at_epoch_ms`. Fails if the
    /// timestamp stalls for five consecutive intervals (the refresh loop is
    /// presumed dead).
    pub async fn wait_for_status_update(&self, job_id: JobId, issued_at_epoch_ms: u64) -> Result<JobStatus, SchedulerError> {
        let interval = self.config.lock().refresh_interval();
        let mut last_seen = issued_at_epoch_ms;
        let mut stale_ticks = 0u32;
        loop {
            tokio::time::sleep(interval).await;
            let (status, updated_at) = self
                .server
                .get_job_status_with_update(job_id)
                .ok_or(SchedulerError::UnknownJob(job_id))?;
            if status.is_terminal() || updated_at > issued_at_epoch_ms {
                return Ok(status);
            }
            if updated_at == last_seen {
                stale_ticks += 1;
            } else {
                stale_ticks = 0;
                last_seen = updated_at;
            }
            if stale_ticks >= 5 {
                return Err(SchedulerError::RefreshThreadDead(5));
            }
        }
    }

    pub fn job_server(&self) -> &dyn JobServer {
        &*self.server
    }
}

/// Replace any command/input/output/stdin token that names a transfer
/// node's remote path with the allocated local staging path.
pub(crate) fn rewrite_template(template: &JobTemplate, remote_to_local: &HashMap<String, PathBuf>) -> JobTemplate {
    let mut rewritten = template.clone();
    let substitute = |token: &str| -> String {
        remote_to_local
            .get(token)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| token.to_string())
    };
    rewritten.command = template.command.iter().map(|t| substitute(t)).collect();
    rewritten.referenced_input_files = template.referenced_input_files.iter().map(|t| substitute(t)).collect();
    rewritten.referenced_output_files = template.referenced_output_files.iter().map(|t| substitute(t)).collect();
    if let Some(stdin) = &template.stdin_path {
        if let Some(local) = remote_to_local.get(&stdin.display().to_string()) {
            rewritten.stdin_path = Some(local.clone());
        }
    }
    rewritten
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
