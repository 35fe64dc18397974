// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wfsctl`: a thin per-process client demonstrating the facade against an
//! in-process scheduler. There is no RPC transport — every invocation binds
//! a fresh in-memory Job Server and scheduler, so state does not survive
//! across separate runs. Useful for smoke-testing the local scheduler, not
//! for production job submission.
//!
//! This binary only ever drives [`LocalScheduler`]. `wfs-engine`'s
//! `ClusterScheduler` is DRMAA-backed and needs a real [`wfs_adapters::DrmaaAdapter`]
//! impl to be worth exposing here; none ships in this crate's dependency tree
//! (only the test-only `FakeDrmaa`), so there is no `--backend cluster` flag.
//! Library consumers with a real DRMAA binding can bind `ClusterScheduler`
//! directly instead of going through this CLI.

mod color;
mod commands;
mod exit_error;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use exit_error::ExitError;
use output::OutputFormat;
use wfs_adapters::SysinfoCpuMonitor;
use wfs_engine::{Facade, LocalScheduler, SchedulerConfig};
use wfs_storage::InMemoryJobServer;

#[derive(Parser, Debug)]
#[command(name = "wfsctl", version = env!("BUILD_GIT_HASH"), styles = color::styles())]
struct Cli {
    /// Output format for commands that print structured data.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    output: OutputFormat,

    /// Path to a TOML scheduler config file. With this set, a SIGHUP
    /// delivered to this process re-reads the file and applies any
    /// runtime-mutable change (proc_nb, max_proc_nb, refresh interval)
    /// before the current command's dispatch completes; useful for a
    /// long-blocking `wait`. Without it, defaults plus `WFS_*` env
    /// overrides are used and no reload is possible.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a job and print its id.
    Submit {
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
        #[arg(long)]
        stdout: Option<PathBuf>,
        #[arg(long)]
        stderr: Option<PathBuf>,
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Show a job's current status.
    Status { job_id: String },
    /// Block until every job is terminal or the timeout elapses.
    Wait {
        #[arg(required = true, num_args = 1..)]
        job_id: Vec<String>,
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Terminate a running or queued job.
    Kill { job_id: String },
    /// Suspend a running job. Not supported by the local scheduler.
    Stop { job_id: String },
    /// Resume a suspended job. Not supported by the local scheduler.
    Restart { job_id: String },
    /// Remove a terminal job's record.
    Dispose { job_id: String },
    /// List this invocation's submitted job ids.
    Jobs,
    /// Register a file transfer and print its allocated local path.
    RegisterTransfer { remote_path: String },
    /// List this invocation's registered transfer ids.
    Transfers,
    /// Workflow submission/disposal/listing.
    #[command(subcommand)]
    Workflow(WorkflowCommands),
    /// List this invocation's submitted workflow ids.
    Workflows,
}

#[derive(Subcommand, Debug)]
enum WorkflowCommands {
    /// Submit a workflow described as JSON (see `wfs_core::Workflow`).
    Submit { path: PathBuf },
    /// Dispose of a workflow's record.
    Dispose { id: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        if let Some(exit_err) = err.downcast_ref::<ExitError>() {
            eprintln!("error: {}", exit_err.message);
            std::process::exit(exit_err.code);
        }
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let server = Arc::new(InMemoryJobServer::default());
    let cancellation = tokio_util::sync::CancellationToken::new();

    let cpu_monitor = Arc::new(SysinfoCpuMonitor::default());

    let (config, reload_watch) = match &cli.config {
        Some(path) => {
            let (rx, handle) = SchedulerConfig::watch(path.clone())?;
            let config = rx.borrow().clone();
            (config, Some((rx, handle)))
        }
        None => (SchedulerConfig::load(None)?, None),
    };

    let scheduler = Arc::new(LocalScheduler::new(server.clone(), cpu_monitor, config));
    let refresh = scheduler.clone().spawn_refresh_loop(cancellation.clone());
    // keep `handle`'s trigger sender alive for the task's lifetime: dropping it early
    // would close the trigger channel and make `apply_config_updates` exit immediately.
    let reload = reload_watch.map(|(rx, handle)| {
        let scheduler = scheduler.clone();
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            let _handle = handle;
            scheduler.apply_config_updates(rx, cancellation).await
        })
    });

    let facade = Facade::new(scheduler);
    let result = commands::dispatch(&facade, cli.command, cli.output).await;

    cancellation.cancel();
    let _ = refresh.await;
    if let Some(reload) = reload {
        let _ = reload.await;
    }
    result
}
