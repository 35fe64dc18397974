// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The local scheduler: runs jobs as child processes on this host, with
//! CPU-aware admission control and priority-ordered FIFO dispatch.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use wfs_adapters::{self as adapters, CpuMonitor, ProcessSpec, RunningProcess};
use wfs_core::{
    cpu_need, Clock, ExitInfo, Job, JobId, JobStatus, JobTemplate, SystemClock, Transfer, TransferId,
    TransferStatus, UserId, Workflow, WorkflowId, WorkflowNode,
};
use wfs_storage::JobServer;

use crate::config::SchedulerConfig;
use crate::dispatcher::{evaluate_ready, WorkflowRegistration};
use crate::error::SchedulerError;

#[derive(Clone)]
struct EngineJob {
    template: JobTemplate,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
}

pub struct LocalScheduler<M: CpuMonitor, C: Clock = SystemClock> {
    server: Arc<dyn JobServer>,
    cpu_monitor: Arc<M>,
    clock: C,
    config: Mutex<SchedulerConfig>,
    queue: Mutex<VecDeque<JobId>>,
    jobs: Mutex<HashMap<JobId, EngineJob>>,
    running: Mutex<HashMap<JobId, RunningProcess>>,
    registrations: Mutex<HashMap<WorkflowId, WorkflowRegistration>>,
    node_of_job: Mutex<HashMap<JobId, (WorkflowId, usize)>>,
}

impl<M: CpuMonitor> LocalScheduler<M, SystemClock> {
    pub fn new(server: Arc<dyn JobServer>, cpu_monitor: Arc<M>, config: SchedulerConfig) -> Self {
        Self::with_clock(server, cpu_monitor, config, SystemClock)
    }
}

impl<M: CpuMonitor, C: Clock> LocalScheduler<M, C> {
    pub fn with_clock(server: Arc<dyn JobServer>, cpu_monitor: Arc<M>, config: SchedulerConfig, clock: C) -> Self {
        Self {
            server,
            cpu_monitor,
            clock,
            config: Mutex::new(config),
            queue: Mutex::new(VecDeque::new()),
            jobs: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            registrations: Mutex::new(HashMap::new()),
            node_of_job: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config.lock().clone()
    }

    pub fn set_proc_nb(&self, proc_nb: u32) {
        self.config.lock().proc_nb = proc_nb;
    }

    pub fn set_max_proc_nb(&self, max_proc_nb: u32) {
        self.config.lock().max_proc_nb = max_proc_nb;
    }

    pub fn set_tick_interval_ms(&self, ms: u64) {
        self.config.lock().refresh_interval_ms = ms;
    }

    /// Apply runtime-mutable fields (`proc_nb`, `max_proc_nb`, tick interval)
    /// from every update published on `rx`, until the channel closes or
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
                    self.set_proc_nb(new_config.proc_nb);
                    self.set_max_proc_nb(new_config.max_proc_nb);
                    self.set_tick_interval_ms(new_config.refresh_interval_ms);
                    tracing::info!(
                        proc_nb = new_config.proc_nb,
                        max_proc_nb = new_config.max_proc_nb,
                        refresh_interval_ms = new_config.refresh_interval_ms,
                        "applied reloaded scheduler configuration"
                    );
                }
            }
        }
    }

    fn register_and_enqueue(&self, job_id: JobId, engine_job: EngineJob, priority: i64) {
        self.jobs.lock().insert(job_id, engine_job);
        let mut queue = self.queue.lock();
        queue.push_back(job_id);
        let server = &self.server;
        let mut items: Vec<JobId> = queue.drain(..).collect();
        let _ = priority;
        items.sort_by_key(|id| std::cmp::Reverse(server.get_job(*id).map(|j| j.priority).unwrap_or(0)));
        *queue = items.into();
    }

    pub fn submit(&self, owner: UserId, template: JobTemplate) -> Result<JobId, SchedulerError> {
        if !template.is_valid() {
            return Err(SchedulerError::EmptyCommand);
        }
        let now = self.clock.epoch_ms();
        let stdout_path = template.stdout_path.clone().unwrap_or_else(|| self.server.generate_local_file_path(owner, None));
        let stderr_path = if template.join_stderr_to_stdout {
            stdout_path.clone()
        } else {
            template.stderr_path.clone().unwrap_or_else(|| self.server.generate_local_file_path(owner, None))
        };
        let job_id = JobId::new();
        let mut job = Job::new(job_id, owner, &template, stdout_path.clone(), stderr_path.clone(), now);
        job.set_status(JobStatus::QueuedActive, now);
        let priority = job.priority;
        self.server.add_job(job);
        self.server.register_inputs(job_id, template.referenced_input_files.clone());
        self.server.register_outputs(job_id, template.referenced_output_files.clone());
        self.register_and_enqueue(job_id, EngineJob { template, stdout_path, stderr_path }, priority);
        Ok(job_id)
    }

    pub fn submit_workflow(&self, owner: UserId, mut workflow: Workflow) -> Result<WorkflowId, SchedulerError> {
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
                let rewritten = crate::cluster::rewrite_template(&template, &remote_to_local);
                let stdout_path = rewritten
                    .stdout_path
                    .clone()
                    .unwrap_or_else(|| self.server.generate_local_file_path(owner, None));
                let stderr_path = if rewritten.join_stderr_to_stdout {
                    stdout_path.clone()
                } else {
                    rewritten.stderr_path.clone().unwrap_or_else(|| self.server.generate_local_file_path(owner, None))
                };
                let job_id = JobId::new();
                let mut job = Job::new(job_id, owner, &rewritten, stdout_path.clone(), stderr_path.clone(), now);
                job.workflow_id = Some(workflow.id);
                self.server.add_job(job);
                self.server.register_inputs(job_id, rewritten.referenced_input_files.clone());
                self.server.register_outputs(job_id, rewritten.referenced_output_files.clone());
                node_job_ids[idx] = Some(job_id);
                self.node_of_job.lock().insert(job_id, (workflow.id, idx));
                self.jobs.lock().insert(job_id, EngineJob { template: rewritten.clone(), stdout_path, stderr_path });
                workflow.nodes[idx] = WorkflowNode::Job(rewritten);
            }
        }

        self.server.add_workflow(workflow.clone(), owner);

        let mut registration = WorkflowRegistration::new(workflow.clone());
        registration.node_job_ids = node_job_ids;
        registration.node_transfer_ids = node_transfer_ids;
        for idx in 0..registration.node_job_ids.len() {
            if matches!(workflow.nodes[idx], WorkflowNode::FileSending { .. }) {
                registration.mark_dispatched(idx);
            }
        }

        let source_nodes = workflow.source_nodes();
        for idx in source_nodes {
            if let WorkflowNode::Job(_) = &workflow.nodes[idx] {
                let job_id = registration.node_job_ids[idx].expect("job node registered above");
                self.enqueue_registered(job_id);
                registration.mark_dispatched(idx);
            }
        }

        let workflow_id = workflow.id;
        self.registrations.lock().insert(workflow_id, registration);
        Ok(workflow_id)
    }

    fn enqueue_registered(&self, job_id: JobId) {
        let now = self.clock.epoch_ms();
        self.server.set_job_status(job_id, JobStatus::QueuedActive, now);
        let mut queue = self.queue.lock();
        queue.push_back(job_id);
        let server = &self.server;
        let mut items: Vec<JobId> = queue.drain(..).collect();
        items.sort_by_key(|id| std::cmp::Reverse(server.get_job(*id).map(|j| j.priority).unwrap_or(0)));
        *queue = items.into();
    }

    /// One execution-loop tick: reap exited children, then schedule.
    pub async fn tick(&self) {
        self.reap().await;
        self.schedule();
    }

    /// Spawn the background refresh loop: tick at the configured interval
    /// until `cancellation` fires. The returned handle may be dropped or
    /// awaited; the loop itself stops as soon as the token is cancelled.
    pub fn spawn_refresh_loop(
        self: Arc<Self>,
        cancellation: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()>
    where
        M: 'static,
        C: 'static,
    {
        tokio::spawn(async move {
            loop {
                let interval = self.config().refresh_interval();
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                self.tick().await;
            }
        })
    }

    async fn reap(&self) {
        let ids: Vec<JobId> = self.running.lock().keys().copied().collect();
        let mut ended = Vec::new();
        for job_id in ids {
            let exit_code = {
                let mut running = self.running.lock();
                running.get_mut(&job_id).and_then(adapters::try_reap)
            };
            if let Some(code) = exit_code {
                self.running.lock().remove(&job_id);
                self.server.set_job_exit_info(job_id, ExitInfo::finished(code));
                self.server.set_job_status(job_id, JobStatus::Done, self.clock.epoch_ms());
                ended.push(job_id);
            }
        }
        for job_id in ended {
            self.on_job_ended(job_id).await;
        }
    }

    fn schedule(&self) {
        let mut skipped = Vec::new();
        loop {
            let job_id = self.queue.lock().pop_front();
            let Some(job_id) = job_id else { break };
            let Some(engine_job) = self.jobs.lock().get(&job_id).cloned() else { continue };

            if engine_job.template.is_barrier {
                self.server.set_job_exit_info(job_id, ExitInfo::finished(0));
                self.server.set_job_status(job_id, JobStatus::Done, self.clock.epoch_ms());
                self.complete_barrier(job_id);
                continue;
            }

            let ncpu = cpu_need(&engine_job.template.parallel_job);
            if !self.admit(ncpu) {
                let single_cpu = ncpu <= 1;
                skipped.push(job_id);
                if single_cpu {
                    break;
                }
                continue;
            }

            match self.launch(&engine_job) {
                Ok(proc) => {
                    self.server.set_job_status(job_id, JobStatus::Running, self.clock.epoch_ms());
                    self.running.lock().insert(job_id, proc);
                }
                Err(e) => {
                    tracing::error!(%job_id, error = %e, "failed to launch job");
                    self.server.set_job_exit_info(job_id, ExitInfo::aborted());
                    self.server.set_job_status(job_id, JobStatus::Failed, self.clock.epoch_ms());
                }
            }
        }
        if !skipped.is_empty() {
            let mut queue = self.queue.lock();
            for job_id in skipped.into_iter().rev() {
                queue.push_front(job_id);
            }
        }
    }

    fn complete_barrier(&self, _job_id: JobId) {
        // barrier jobs never produce a process; nothing further to release.
    }

    fn admit(&self, ncpu: u32) -> bool {
        let config = self.config.lock();
        let running_cpu: u32 = {
            let running = self.running.lock();
            let jobs = self.jobs.lock();
            running.keys().filter_map(|id| jobs.get(id).map(|j| cpu_need(&j.template.parallel_job))).sum()
        };
        if running_cpu + ncpu <= config.proc_nb {
            return true;
        }
        let ceiling = if config.max_proc_nb == 0 { self.cpu_monitor.cpu_count() as u32 } else { config.max_proc_nb };
        if running_cpu + ncpu <= ceiling {
            return self.cpu_monitor.try_admit(ncpu);
        }
        false
    }

    fn launch(&self, engine_job: &EngineJob) -> Result<RunningProcess, SchedulerError> {
        let spec = ProcessSpec {
            command: engine_job.template.command.clone(),
            stdout_path: engine_job.stdout_path.clone(),
            stderr_path: engine_job.stderr_path.clone(),
            stdin_path: engine_job.template.stdin_path.clone(),
            working_directory: engine_job.template.working_directory.clone(),
            env: Vec::new(),
        };
        adapters::spawn(&spec).map_err(|e| SchedulerError::LaunchFailed(e.to_string()))
    }

    async fn on_job_ended(&self, job_id: JobId) {
        let node = self.node_of_job.lock().remove(&job_id);
        let Some((workflow_id, _)) = node else { return };
        self.dispatch_workflow(workflow_id).await;
    }

    pub async fn dispatch_workflow(&self, workflow_id: WorkflowId) {
        let (ready_jobs, ready_transfers) = {
            let registrations = self.registrations.lock();
            let Some(registration) = registrations.get(&workflow_id) else { return };
            evaluate_ready(registration, &*self.server)
        };

        for idx in ready_jobs {
            let job_id = {
                let mut registrations = self.registrations.lock();
                let registration = registrations.get_mut(&workflow_id).unwrap();
                let job_id = registration.node_job_ids[idx].expect("ready job node has a registered job id");
                registration.mark_dispatched(idx);
                job_id
            };
            self.enqueue_registered(job_id);
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

    pub async fn kill(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let running = self.running.lock().remove(&job_id);
        if let Some(mut proc) = running {
            adapters::kill_tree(&mut proc).await.map_err(|e| SchedulerError::LaunchFailed(e.to_string()))?;
            self.server.set_job_exit_info(job_id, ExitInfo::killed());
            self.server.set_job_status(job_id, JobStatus::Failed, self.clock.epoch_ms());
            self.on_job_ended(job_id).await;
            return Ok(());
        }
        let removed_from_queue = {
            let mut queue = self.queue.lock();
            if let Some(pos) = queue.iter().position(|id| *id == job_id) {
                queue.remove(pos);
                true
            } else {
                false
            }
        };
        if removed_from_queue {
            self.server.set_job_exit_info(job_id, ExitInfo::aborted());
            self.server.set_job_status(job_id, JobStatus::Failed, self.clock.epoch_ms());
            self.on_job_ended(job_id).await;
        }
        Ok(())
    }

    pub async fn dispose(&self, job_id: JobId) -> Result<(), SchedulerError> {
        self.kill(job_id).await?;
        self.server.delete_job(job_id);
        Ok(())
    }

    /// The local scheduler has no suspend/resume primitive for a running
    /// child process tree; stop/restart are cluster-only operations.
    pub async fn stop(&self, _job_id: JobId) -> Result<(), SchedulerError> {
        Err(SchedulerError::LaunchFailed("stop is not supported by the local scheduler".into()))
    }

    pub async fn restart(&self, _job_id: JobId) -> Result<(), SchedulerError> {
        Err(SchedulerError::LaunchFailed("restart is not supported by the local scheduler".into()))
    }

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

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
