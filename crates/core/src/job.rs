// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier, submission template, and the persisted job record.

use crate::status::{ExitInfo, JobStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a job instance.
    ///
    /// Assigned by the owning scheduler at submission time and stable for the
    /// lifetime of the job record in the Job Server.
    pub struct JobId("job-");
}

crate::define_id! {
    /// Unique identifier for a workflow.
    pub struct WorkflowId("wfw-");
}

crate::define_id! {
    /// Unique identifier for a registered file transfer.
    pub struct TransferId("trf-");
}

crate::define_id! {
    /// Unique identifier for a registered user.
    pub struct UserId("usr-");
}

/// A request to run the job on multiple nodes under a named parallel
/// environment (e.g. an MPI or OpenMP configuration known to the cluster).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelJobDescriptor {
    /// Name of the parallel configuration, resolved against the cluster's
    /// configured environments (`[parallel_job]` in the scheduler config).
    pub configuration_name: String,
    pub max_node_number: u32,
    /// CPUs requested per node; defaults to 1 when unset.
    pub cpu_per_node: u32,
}

impl ParallelJobDescriptor {
    pub fn new(configuration_name: impl Into<String>, max_node_number: u32) -> Self {
        Self { configuration_name: configuration_name.into(), max_node_number, cpu_per_node: 1 }
    }

    /// Total CPU slots this job occupies while running.
    pub fn cpu_need(&self) -> u32 {
        self.max_node_number.max(1) * self.cpu_per_node.max(1)
    }
}

/// Client-supplied description of work to run. Deep-copied by the scheduler
/// on submission; the caller's copy is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTemplate {
    /// Non-empty ordered argument vector; `command[0]` is the executable.
    pub command: Vec<String>,
    pub stdin_path: Option<PathBuf>,
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
    pub join_stderr_to_stdout: bool,
    pub working_directory: Option<PathBuf>,
    /// Hours after which a non-custom job's std files may be reclaimed.
    pub disposal_timeout_hours: u32,
    pub name: String,
    pub description: String,
    pub referenced_input_files: Vec<String>,
    pub referenced_output_files: Vec<String>,
    pub parallel_job: Option<ParallelJobDescriptor>,
    /// Local-scheduler-only hint: higher runs first. No DRMAA equivalent.
    pub priority: i64,
    /// Local-scheduler-only: a no-op join point, never executed.
    pub is_barrier: bool,
}

impl JobTemplate {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            stdin_path: None,
            stdout_path: None,
            stderr_path: None,
            join_stderr_to_stdout: false,
            working_directory: None,
            disposal_timeout_hours: 168,
            name: String::new(),
            description: String::new(),
            referenced_input_files: Vec::new(),
            referenced_output_files: Vec::new(),
            parallel_job: None,
            priority: 0,
            is_barrier: false,
        }
    }

    pub fn barrier() -> Self {
        Self { is_barrier: true, ..Self::new(Vec::new()) }
    }

    pub fn is_valid(&self) -> bool {
        self.is_barrier || !self.command.is_empty()
    }

    /// True when the client supplied its own stdout/stderr paths; such a
    /// job's std files are never removed on disposal.
    pub fn is_custom_submission(&self) -> bool {
        self.stdout_path.is_some() || self.stderr_path.is_some()
    }
}

/// CPU need of a job with no parallel descriptor is 1.
pub fn cpu_need(parallel_job: &Option<ParallelJobDescriptor>) -> u32 {
    parallel_job.as_ref().map(ParallelJobDescriptor::cpu_need).unwrap_or(1)
}

/// Persisted job record, owned by the Job Server once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: UserId,
    pub custom_submission: bool,
    pub expiration_epoch_ms: u64,
    pub command_summary: String,
    pub workflow_id: Option<WorkflowId>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub working_directory: Option<PathBuf>,
    pub referenced_input_files: Vec<String>,
    pub referenced_output_files: Vec<String>,
    pub parallel_job: Option<ParallelJobDescriptor>,
    pub priority: i64,
    pub is_barrier: bool,
    pub submission_epoch_ms: Option<u64>,
    pub drmaa_id: Option<String>,
    pub status: JobStatus,
    pub last_status_update_epoch_ms: u64,
    pub exit_info: Option<ExitInfo>,
}

impl Job {
    /// Register a new job from a template at the given creation time. Paths
    /// must already be resolved by the caller (the scheduler allocates them
    /// through the Job Server when the template didn't supply its own).
    pub fn new(
        id: JobId,
        owner: UserId,
        template: &JobTemplate,
        stdout_path: PathBuf,
        stderr_path: PathBuf,
        now_epoch_ms: u64,
    ) -> Self {
        Self {
            id,
            owner,
            custom_submission: template.is_custom_submission(),
            expiration_epoch_ms: now_epoch_ms
                + u64::from(template.disposal_timeout_hours) * 3_600_000,
            command_summary: template.command.join(" "),
            workflow_id: None,
            stdout_path,
            stderr_path,
            working_directory: template.working_directory.clone(),
            referenced_input_files: template.referenced_input_files.clone(),
            referenced_output_files: template.referenced_output_files.clone(),
            parallel_job: template.parallel_job.clone(),
            priority: template.priority,
            is_barrier: template.is_barrier,
            submission_epoch_ms: None,
            drmaa_id: None,
            status: JobStatus::NotSubmitted,
            last_status_update_epoch_ms: now_epoch_ms,
            exit_info: None,
        }
    }

    pub fn cpu_need(&self) -> u32 {
        cpu_need(&self.parallel_job)
    }

    pub fn set_status(&mut self, status: JobStatus, now_epoch_ms: u64) {
        self.status = status;
        self.last_status_update_epoch_ms = now_epoch_ms;
    }

    pub fn mark_submitted(&mut self, drmaa_id: impl Into<String>, now_epoch_ms: u64) {
        self.drmaa_id = Some(drmaa_id.into());
        self.submission_epoch_ms = Some(now_epoch_ms);
        self.set_status(JobStatus::QueuedActive, now_epoch_ms);
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        set {
            id: JobId = JobId::new(),
            owner: UserId = UserId::new(),
            custom_submission: bool = false,
            expiration_epoch_ms: u64 = 0,
            command_summary: String = String::from("echo hi"),
            stdout_path: PathBuf = PathBuf::from("/tmp/job.out"),
            stderr_path: PathBuf = PathBuf::from("/tmp/job.err"),
            referenced_input_files: Vec<String> = Vec::new(),
            referenced_output_files: Vec<String> = Vec::new(),
            priority: i64 = 0,
            is_barrier: bool = false,
            status: JobStatus = JobStatus::NotSubmitted,
            last_status_update_epoch_ms: u64 = 0,
        }
        option {
            workflow_id: WorkflowId = None,
            working_directory: PathBuf = None,
            parallel_job: ParallelJobDescriptor = None,
            submission_epoch_ms: u64 = None,
            drmaa_id: String = None,
            exit_info: ExitInfo = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
