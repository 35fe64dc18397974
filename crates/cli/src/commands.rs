// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command handlers: one function per `wfsctl` subcommand, generic over the
//! injected scheduler backend (`SchedulerBackend`) so the same code runs
//! against either `wfs-engine` scheduler a caller binds the facade to, even
//! though this binary only ever binds `LocalScheduler`.

use std::io::Write as _;
use std::time::Duration;

use wfs_core::{JobId, UserId, Workflow, WorkflowId};
use wfs_engine::{Facade, SchedulerBackend};

use crate::exit_error::ExitError;
use crate::output::{format_or_json, handle_list, OutputFormat};
use crate::{Commands, WorkflowCommands};

const CLI_USER_LOGIN: &str = "cli";

pub async fn dispatch<B: SchedulerBackend>(
    facade: &Facade<B>,
    command: Commands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let owner = facade.register_user(CLI_USER_LOGIN);

    match command {
        Commands::Submit { command, stdout, stderr, cwd } => submit(facade, owner, command, stdout, stderr, cwd, format).await,
        Commands::Status { job_id } => status(facade, owner, &job_id, format),
        Commands::Wait { job_id, timeout } => wait(facade, owner, &job_id, timeout, format).await,
        Commands::Kill { job_id } => {
            let id = parse_job_id(&job_id);
            facade.kill(owner, id).await.map_err(|e| ExitError::new(1, e.to_string()))?;
            format_or_json(format, &id.to_string(), || println!("{id} killed"))
        }
        Commands::Stop { job_id } => {
            let id = parse_job_id(&job_id);
            facade.stop(owner, id).await.map_err(|e| ExitError::new(1, e.to_string()))?;
            format_or_json(format, &id.to_string(), || println!("{id} stopped"))
        }
        Commands::Restart { job_id } => {
            let id = parse_job_id(&job_id);
            facade.restart(owner, id).await.map_err(|e| ExitError::new(1, e.to_string()))?;
            format_or_json(format, &id.to_string(), || println!("{id} restarted"))
        }
        Commands::Dispose { job_id } => {
            let id = parse_job_id(&job_id);
            facade.dispose(owner, id).await.map_err(|e| ExitError::new(1, e.to_string()))?;
            format_or_json(format, &id.to_string(), || println!("{id} disposed"))
        }
        Commands::Jobs => jobs(facade, owner, format),
        Commands::RegisterTransfer { remote_path } => register_transfer(facade, owner, &remote_path, format),
        Commands::Transfers => transfers(facade, owner, format),
        Commands::Workflow(sub) => workflow(facade, owner, sub, format).await,
        Commands::Workflows => workflows(facade, owner, format),
    }
}

fn parse_job_id(raw: &str) -> JobId {
    JobId::from_string(raw)
}

fn parse_workflow_id(raw: &str) -> WorkflowId {
    WorkflowId::from_string(raw)
}

async fn submit<B: SchedulerBackend>(
    facade: &Facade<B>,
    owner: UserId,
    command: Vec<String>,
    stdout: Option<std::path::PathBuf>,
    stderr: Option<std::path::PathBuf>,
    cwd: Option<std::path::PathBuf>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut template = wfs_core::JobTemplate::new(command);
    template.stdout_path = stdout;
    template.stderr_path = stderr;
    template.working_directory = cwd;

    let job_id = facade.submit(owner, template).await.map_err(|e| ExitError::new(1, e.to_string()))?;
    format_or_json(format, &job_id.to_string(), || println!("submitted {job_id}"))
}

fn status<B: SchedulerBackend>(facade: &Facade<B>, owner: UserId, job_id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let id = parse_job_id(job_id);
    let status = facade.status(owner, id).map_err(|_| ExitError::new(1, "not authorized, or unknown job"))?;
    format_or_json(format, &status.to_string(), || println!("{status}"))
}

async fn wait<B: SchedulerBackend>(
    facade: &Facade<B>,
    owner: UserId,
    job_ids: &[String],
    timeout_secs: u64,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let ids: Vec<JobId> = job_ids.iter().map(|s| parse_job_id(s)).collect();
    let statuses = facade
        .wait(owner, &ids, Duration::from_secs(timeout_secs))
        .await
        .map_err(|e| ExitError::new(1, e.to_string()))?;
    let rendered: Vec<String> = statuses.iter().map(ToString::to_string).collect();
    format_or_json(format, &rendered, || {
        for (id, status) in ids.iter().zip(statuses.iter()) {
            println!("{id} {status}");
        }
    })
}

fn jobs<B: SchedulerBackend>(facade: &Facade<B>, owner: UserId, format: OutputFormat) -> anyhow::Result<()> {
    let ids: Vec<String> = facade.jobs(owner).into_iter().map(|id| id.to_string()).collect();
    handle_list(format, &ids, "no jobs submitted this run", |ids, out| {
        for id in ids {
            let _ = writeln!(out, "{id}");
        }
    })
}

fn register_transfer<B: SchedulerBackend>(facade: &Facade<B>, owner: UserId, remote_path: &str, format: OutputFormat) -> anyhow::Result<()> {
    let transfer_id = facade.register_transfer(owner, remote_path, 168);
    format_or_json(format, &transfer_id.to_string(), || println!("registered {transfer_id}"))
}

fn transfers<B: SchedulerBackend>(facade: &Facade<B>, owner: UserId, format: OutputFormat) -> anyhow::Result<()> {
    let ids: Vec<String> = facade.transfers(owner).into_iter().map(|id| id.to_string()).collect();
    handle_list(format, &ids, "no transfers registered this run", |ids, out| {
        for id in ids {
            let _ = writeln!(out, "{id}");
        }
    })
}

async fn workflow<B: SchedulerBackend>(
    facade: &Facade<B>,
    owner: UserId,
    sub: WorkflowCommands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match sub {
        WorkflowCommands::Submit { path } => {
            let text = std::fs::read_to_string(&path).map_err(|e| ExitError::new(1, format!("failed to read {}: {e}", path.display())))?;
            let workflow: Workflow = serde_json::from_str(&text).map_err(|e| ExitError::new(1, format!("invalid workflow json: {e}")))?;
            let workflow_id = facade.submit_workflow(owner, workflow).await.map_err(|e| ExitError::new(1, e.to_string()))?;
            format_or_json(format, &workflow_id.to_string(), || println!("submitted {workflow_id}"))
        }
        WorkflowCommands::Dispose { id } => {
            let workflow_id = parse_workflow_id(&id);
            facade.dispose_workflow(owner, workflow_id).await.map_err(|e| ExitError::new(1, e.to_string()))?;
            format_or_json(format, &workflow_id.to_string(), || println!("{workflow_id} disposed"))
        }
    }
}

fn workflows<B: SchedulerBackend>(facade: &Facade<B>, owner: UserId, format: OutputFormat) -> anyhow::Result<()> {
    let ids: Vec<String> = facade.workflows(owner).into_iter().map(|id| id.to_string()).collect();
    handle_list(format, &ids, "no workflows submitted this run", |ids, out| {
        for id in ids {
            let _ = writeln!(out, "{id}");
        }
    })
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
