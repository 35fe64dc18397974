// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use wfs_adapters::FakeCpuMonitor;
use wfs_core::{FakeClock, JobTemplate, ParallelJobDescriptor, WorkflowNode};
use wfs_storage::InMemoryJobServer;

fn scheduler_with_capacity(proc_nb: u32) -> (LocalScheduler<FakeCpuMonitor, FakeClock>, Arc<InMemoryJobServer>) {
    scheduler_with_capacity_and_idle(proc_nb, 1.0)
}

/// `idle` is the raw idle-CPU count [`FakeCpuMonitor`] reports (out of 4),
/// not a fraction — matching the real monitor's `idle_cpus()` contract.
fn scheduler_with_capacity_and_idle(proc_nb: u32, idle: f64) -> (LocalScheduler<FakeCpuMonitor, FakeClock>, Arc<InMemoryJobServer>) {
    let server = Arc::new(InMemoryJobServer::default());
    let cpu_monitor = Arc::new(FakeCpuMonitor::new(4, idle));
    let mut config = SchedulerConfig::default();
    config.proc_nb = proc_nb;
    config.max_proc_nb = 0;
    let clock = FakeClock::new();
    let scheduler = LocalScheduler::with_clock(server.clone(), cpu_monitor, config, clock);
    (scheduler, server)
}

#[tokio::test]
async fn submit_rejects_empty_command() {
    let (scheduler, _server) = scheduler_with_capacity(4);
    let err = scheduler.submit(UserId::new(), JobTemplate::new(Vec::new())).unwrap_err();
    assert!(matches!(err, SchedulerError::EmptyCommand));
}

#[tokio::test]
async fn barrier_job_completes_without_running() {
    let (scheduler, server) = scheduler_with_capacity(4);
    let owner = UserId::new();
    let job_id = scheduler.submit(owner, JobTemplate::barrier()).unwrap();

    scheduler.tick().await;

    let job = server.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Done);
}

#[tokio::test]
async fn single_cpu_job_runs_and_is_reaped() {
    let (scheduler, server) = scheduler_with_capacity(4);
    let owner = UserId::new();
    let job_id = scheduler.submit(owner, JobTemplate::new(vec!["true".into()])).unwrap();

    scheduler.tick().await;
    assert_eq!(server.get_job(job_id).unwrap().status, JobStatus::Running);

    // give the short-lived child time to exit before reaping again
    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.tick().await;

    assert_eq!(server.get_job(job_id).unwrap().status, JobStatus::Done);
}

#[tokio::test]
async fn admission_control_defers_when_proc_nb_is_exhausted() {
    let (scheduler, server) = scheduler_with_capacity_and_idle(1, 0.0);
    let owner = UserId::new();
    let first = scheduler.submit(owner, JobTemplate::new(vec!["sleep".into(), "1".into()])).unwrap();
    let second = scheduler.submit(owner, JobTemplate::new(vec!["true".into()])).unwrap();

    scheduler.tick().await;

    assert_eq!(server.get_job(first).unwrap().status, JobStatus::Running);
    assert_eq!(server.get_job(second).unwrap().status, JobStatus::QueuedActive);

    scheduler.kill(first).await.unwrap();
}

#[tokio::test]
async fn parallel_job_cpu_need_blocks_admission_below_multi_cpu_threshold() {
    let server = Arc::new(InMemoryJobServer::default());
    let cpu_monitor = Arc::new(FakeCpuMonitor::new(4, 0.5));
    let mut config = SchedulerConfig::default();
    config.proc_nb = 0;
    config.max_proc_nb = 0;
    let scheduler = LocalScheduler::with_clock(server.clone(), cpu_monitor, config, FakeClock::new());
    let owner = UserId::new();
    let mut template = JobTemplate::new(vec!["mpirun".into()]);
    template.parallel_job = Some(ParallelJobDescriptor { configuration_name: "mpi".into(), max_node_number: 2, cpu_per_node: 2 });
    let job_id = scheduler.submit(owner, template).unwrap();

    scheduler.tick().await;

    assert_eq!(server.get_job(job_id).unwrap().status, JobStatus::QueuedActive);
}

#[tokio::test]
async fn kill_removes_a_queued_job_without_running_it() {
    let (scheduler, server) = scheduler_with_capacity(0);
    let owner = UserId::new();
    let job_id = scheduler.submit(owner, JobTemplate::new(vec!["true".into()])).unwrap();

    scheduler.kill(job_id).await.unwrap();

    let job = server.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn workflow_source_node_runs_before_its_successor() {
    let (scheduler, server) = scheduler_with_capacity(4);
    let owner = UserId::new();

    let mut workflow = Workflow::new(WorkflowId::new(), "chain");
    let a = workflow.add_node(WorkflowNode::Job(JobTemplate::new(vec!["true".into()])));
    let b = workflow.add_node(WorkflowNode::Job(JobTemplate::new(vec!["true".into()])));
    workflow.add_dependency(a, b);

    let workflow_id = scheduler.submit_workflow(owner, workflow).unwrap();
    let job_b_id = {
        let registrations = scheduler.registrations.lock();
        registrations[&workflow_id].node_job_ids[b].unwrap()
    };

    assert_eq!(server.get_job(job_b_id).unwrap().status, JobStatus::NotSubmitted);

    scheduler.tick().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.tick().await;

    assert!(server.get_job(job_b_id).unwrap().status.is_submitted(), "b should have left NOT_SUBMITTED once a completed");
}

#[tokio::test]
async fn apply_config_updates_applies_proc_nb_and_interval_from_the_watch_channel() {
    let (scheduler, _server) = scheduler_with_capacity(1);
    let scheduler = Arc::new(scheduler);
    let mut config = scheduler.config();
    config.proc_nb = 8;
    config.max_proc_nb = 16;
    config.refresh_interval_ms = 250;
    let (tx, rx) = tokio::sync::watch::channel(scheduler.config());
    let cancellation = tokio_util::sync::CancellationToken::new();

    let applying_scheduler = scheduler.clone();
    let applying_cancellation = cancellation.clone();
    let apply = tokio::spawn(async move { applying_scheduler.apply_config_updates(rx, applying_cancellation).await });

    tx.send(config).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancellation.cancel();
    apply.await.unwrap();

    let applied = scheduler.config();
    assert_eq!(applied.proc_nb, 8);
    assert_eq!(applied.max_proc_nb, 16);
    assert_eq!(applied.refresh_interval_ms, 250);
}
