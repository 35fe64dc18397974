// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The client-facing facade: every operation checks ownership against the
//! Job Server before delegating to the injected [`SchedulerBackend`].
//! Unauthorized calls are refused with no side effects.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use wfs_core::{JobId, JobStatus, JobTemplate, Transfer, TransferId, TransferStatus, UserId, Workflow, WorkflowId};
use wfs_storage::{require_owned_job, require_owned_transfer, require_owned_workflow, JobServerError};

use crate::backend::SchedulerBackend;
use crate::error::FacadeError;

struct CachedHandle {
    path: PathBuf,
    file: std::fs::File,
    /// Bytes read past the last complete line, carried over to the next
    /// call so each call returns at most one line.
    pending: Vec<u8>,
}

pub struct Facade<B: SchedulerBackend> {
    backend: Arc<B>,
    stdout_handle: Mutex<Option<CachedHandle>>,
    stderr_handle: Mutex<Option<CachedHandle>>,
    transfer_write_handle: Mutex<Option<CachedHandle>>,
    transfer_read_handle: Mutex<Option<CachedHandle>>,
}

impl From<JobServerError> for FacadeError {
    fn from(_: JobServerError) -> Self {
        FacadeError::Refused
    }
}

impl<B: SchedulerBackend> Facade<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            stdout_handle: Mutex::new(None),
            stderr_handle: Mutex::new(None),
            transfer_write_handle: Mutex::new(None),
            transfer_read_handle: Mutex::new(None),
        }
    }

    pub fn register_user(&self, login: &str) -> UserId {
        self.backend.job_server().register_user(login)
    }

    pub async fn submit(&self, owner: UserId, template: JobTemplate) -> Result<JobId, FacadeError> {
        Ok(self.backend.submit(owner, template).await?)
    }

    pub async fn submit_workflow(&self, owner: UserId, workflow: Workflow) -> Result<WorkflowId, FacadeError> {
        Ok(self.backend.submit_workflow(owner, workflow).await?)
    }

    pub fn status(&self, owner: UserId, job_id: JobId) -> Result<JobStatus, FacadeError> {
        require_owned_job(self.backend.job_server(), owner, job_id)?;
        self.backend
            .job_server()
            .get_job_status(job_id)
            .ok_or(FacadeError::Scheduler(crate::error::SchedulerError::UnknownJob(job_id)))
    }

    pub async fn stop(&self, owner: UserId, job_id: JobId) -> Result<(), FacadeError> {
        require_owned_job(self.backend.job_server(), owner, job_id)?;
        Ok(self.backend.stop(job_id).await?)
    }

    pub async fn restart(&self, owner: UserId, job_id: JobId) -> Result<(), FacadeError> {
        require_owned_job(self.backend.job_server(), owner, job_id)?;
        Ok(self.backend.restart(job_id).await?)
    }

    pub async fn kill(&self, owner: UserId, job_id: JobId) -> Result<(), FacadeError> {
        require_owned_job(self.backend.job_server(), owner, job_id)?;
        Ok(self.backend.kill(job_id).await?)
    }

    pub async fn dispose(&self, owner: UserId, job_id: JobId) -> Result<(), FacadeError> {
        require_owned_job(self.backend.job_server(), owner, job_id)?;
        Ok(self.backend.dispose(job_id).await?)
    }

    pub fn jobs(&self, owner: UserId) -> Vec<JobId> {
        self.backend.job_server().get_jobs(owner)
    }

    pub fn workflows(&self, owner: UserId) -> Vec<WorkflowId> {
        self.backend.job_server().get_workflows(owner)
    }

    /// Allocate a fresh local staging path and register the transfer with
    /// the Job Server. Default disposal timeout matches the week-long
    /// default used for jobs' own std files.
    pub fn register_transfer(&self, owner: UserId, remote_path: &str, disposal_timeout_hours: u32) -> TransferId {
        let local_path = self.backend.job_server().generate_local_file_path(owner, Some(remote_path));
        let now = self.clock_now_epoch_ms();
        let transfer = wfs_core::Transfer::new(TransferId::new(), owner, remote_path, local_path, disposal_timeout_hours, now);
        let id = transfer.id;
        self.backend.job_server().add_transfer(transfer);
        id
    }

    pub fn transfers(&self, owner: UserId) -> Vec<TransferId> {
        self.backend.job_server().get_transfers(owner)
    }

    pub fn set_transfer_status(&self, owner: UserId, transfer_id: TransferId, status: TransferStatus) -> Result<(), FacadeError> {
        require_owned_transfer(self.backend.job_server(), owner, transfer_id)?;
        self.backend.job_server().set_transfer_status(transfer_id, status);
        Ok(())
    }

    pub fn transfer_status(&self, owner: UserId, transfer_id: TransferId) -> Result<TransferStatus, FacadeError> {
        require_owned_transfer(self.backend.job_server(), owner, transfer_id)?;
        self.backend.job_server().get_transfer_status(transfer_id).ok_or(FacadeError::Refused)
    }

    pub fn transfer_information(&self, owner: UserId, transfer_id: TransferId) -> Result<Transfer, FacadeError> {
        require_owned_transfer(self.backend.job_server(), owner, transfer_id)?;
        self.backend.job_server().get_transfer(transfer_id).ok_or(FacadeError::Refused)
    }

    pub fn cancel_transfer(&self, owner: UserId, transfer_id: TransferId) -> Result<(), FacadeError> {
        require_owned_transfer(self.backend.job_server(), owner, transfer_id)?;
        self.backend.job_server().remove_transfer(transfer_id);
        Ok(())
    }

    /// Notify the scheduler that a transfer's local file has finished being
    /// written by the external transfer agent, so its owning workflow is
    /// re-evaluated immediately instead of waiting for the next refresh tick.
    pub async fn signal_transfer_ended(&self, owner: UserId, transfer_id: TransferId) -> Result<(), FacadeError> {
        require_owned_transfer(self.backend.job_server(), owner, transfer_id)?;
        let transfer = self.backend.job_server().get_transfer(transfer_id).ok_or(FacadeError::Refused)?;
        if let Some(workflow_id) = transfer.workflow_id {
            self.backend.dispatch_workflow(workflow_id).await;
        }
        Ok(())
    }

    fn clock_now_epoch_ms(&self) -> u64 {
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }

    pub async fn dispose_workflow(&self, owner: UserId, workflow_id: WorkflowId) -> Result<(), FacadeError> {
        require_owned_workflow(self.backend.job_server(), owner, workflow_id)?;
        self.backend.job_server().delete_workflow(workflow_id);
        Ok(())
    }

    /// Poll every id's status at the backend's refresh interval until all
    /// are terminal or `timeout` elapses. Fails a given id's wait if its
    /// last-status-update timestamp stalls for ten consecutive intervals
    /// (the refresh loop is presumed dead).
    pub async fn wait(&self, owner: UserId, job_ids: &[JobId], timeout: Duration) -> Result<Vec<JobStatus>, FacadeError> {
        for &id in job_ids {
            require_owned_job(self.backend.job_server(), owner, id)?;
        }

        let interval = self.backend.refresh_interval();
        let mut statuses: Vec<Option<JobStatus>> = vec![None; job_ids.len()];
        let mut last_seen: Vec<Option<u64>> = vec![None; job_ids.len()];
        let mut stale_ticks: Vec<u32> = vec![0; job_ids.len()];
        let start = tokio::time::Instant::now();

        loop {
            let mut all_terminal = true;
            for (idx, &job_id) in job_ids.iter().enumerate() {
                if statuses[idx].is_some_and(JobStatus::is_terminal) {
                    continue;
                }
                let (status, updated_at) = self
                    .backend
                    .job_server()
                    .get_job_status_with_update(job_id)
                    .ok_or(FacadeError::Scheduler(crate::error::SchedulerError::UnknownJob(job_id)))?;
                statuses[idx] = Some(status);
                if status.is_terminal() {
                    continue;
                }
                all_terminal = false;
                if last_seen[idx] == Some(updated_at) {
                    stale_ticks[idx] += 1;
                } else {
                    stale_ticks[idx] = 0;
                    last_seen[idx] = Some(updated_at);
                }
                if stale_ticks[idx] >= 10 {
                    return Err(FacadeError::Scheduler(crate::error::SchedulerError::RefreshThreadDead(10)));
                }
            }
            if all_terminal || start.elapsed() >= timeout {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        Ok(statuses.into_iter().map(|s| s.unwrap_or(JobStatus::NotSubmitted)).collect())
    }

    fn ensure_read_handle(slot: &Mutex<Option<CachedHandle>>, path: &Path) -> std::io::Result<()> {
        let mut guard = slot.lock();
        if guard.as_ref().is_some_and(|h| h.path == path) {
            return Ok(());
        }
        let file = std::fs::File::open(path)?;
        *guard = Some(CachedHandle { path: path.to_path_buf(), file, pending: Vec::new() });
        Ok(())
    }

    /// Read and return at most one newline-terminated line, leaving any
    /// trailing partial line buffered for the next call. Returns `None` when
    /// no complete line is available yet (the writer hasn't produced one).
    fn read_line(slot: &Mutex<Option<CachedHandle>>, path: &Path) -> Result<Option<String>, FacadeError> {
        Self::ensure_read_handle(slot, path)?;
        use std::io::Read;
        let mut guard = slot.lock();
        let handle = guard.as_mut().expect("just opened above");
        loop {
            if let Some(newline_pos) = handle.pending.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = handle.pending.drain(..=newline_pos).collect();
                line.pop(); // drop the trailing '\n'
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            let mut chunk = [0u8; 4096];
            let read = handle.file.read(&mut chunk)?;
            if read == 0 {
                return Ok(None);
            }
            handle.pending.extend_from_slice(&chunk[..read]);
        }
    }

    pub fn read_stdout(&self, owner: UserId, job_id: JobId) -> Result<Option<String>, FacadeError> {
        require_owned_job(self.backend.job_server(), owner, job_id)?;
        let (stdout_path, _) = self
            .backend
            .job_server()
            .get_std_out_err_file_path(job_id)
            .ok_or(FacadeError::Scheduler(crate::error::SchedulerError::UnknownJob(job_id)))?;
        Self::read_line(&self.stdout_handle, &stdout_path)
    }

    pub fn read_stderr(&self, owner: UserId, job_id: JobId) -> Result<Option<String>, FacadeError> {
        require_owned_job(self.backend.job_server(), owner, job_id)?;
        let (_, stderr_path) = self
            .backend
            .job_server()
            .get_std_out_err_file_path(job_id)
            .ok_or(FacadeError::Scheduler(crate::error::SchedulerError::UnknownJob(job_id)))?;
        Self::read_line(&self.stderr_handle, &stderr_path)
    }

    /// Append one line to a registered transfer's local file. Flushes after
    /// every call; sets file mode 0777 the first time a freshly registered
    /// transfer target is opened (Unix only — a no-op elsewhere).
    pub fn write_transfer_line(&self, owner: UserId, transfer_id: TransferId, line: &str) -> Result<(), FacadeError> {
        require_owned_transfer(self.backend.job_server(), owner, transfer_id)?;
        let transfer = self
            .backend
            .job_server()
            .get_transfer(transfer_id)
            .ok_or(FacadeError::Refused)?;

        let mut guard = self.transfer_write_handle.lock();
        let needs_reopen = !guard.as_ref().is_some_and(|h| h.path == transfer.local_path);
        if needs_reopen {
            let is_fresh = !transfer.local_path.exists();
            let file = std::fs::OpenOptions::new().create(true).append(true).open(&transfer.local_path)?;
            if is_fresh {
                set_world_writable(&file);
            }
            *guard = Some(CachedHandle { path: transfer.local_path.clone(), file, pending: Vec::new() });
        }
        let handle = guard.as_mut().expect("just opened above");
        writeln!(handle.file, "{line}")?;
        handle.file.flush()?;
        Ok(())
    }

    pub fn read_transfer(&self, owner: UserId, transfer_id: TransferId) -> Result<Option<String>, FacadeError> {
        require_owned_transfer(self.backend.job_server(), owner, transfer_id)?;
        let transfer = self
            .backend
            .job_server()
            .get_transfer(transfer_id)
            .ok_or(FacadeError::Refused)?;
        Self::read_line(&self.transfer_read_handle, &transfer.local_path)
    }

    /// Close every cached file handle. Called when a transfer stream ends.
    pub fn end_transfers(&self) {
        *self.stdout_handle.lock() = None;
        *self.stderr_handle.lock() = None;
        *self.transfer_write_handle.lock() = None;
        *self.transfer_read_handle.lock() = None;
    }
}

#[cfg(unix)]
fn set_world_writable(file: &std::fs::File) {
    use std::os::unix::fs::PermissionsExt;
    let _ = file.set_permissions(std::fs::Permissions::from_mode(0o777));
}

#[cfg(not(unix))]
fn set_world_writable(_file: &std::fs::File) {}

#[cfg(test)]
#[path = "facade_tests.rs"]
mod tests;
