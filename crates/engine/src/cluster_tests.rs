// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use wfs_adapters::FakeDrmaa;
use wfs_core::{FakeClock, JobTemplate, ParallelJobDescriptor, WorkflowNode};
use wfs_storage::InMemoryJobServer;

fn scheduler() -> (ClusterScheduler<FakeDrmaa, FakeClock>, Arc<InMemoryJobServer>, Arc<FakeDrmaa>) {
    let server = Arc::new(InMemoryJobServer::default());
    let drmaa = Arc::new(FakeDrmaa::new());
    let clock = FakeClock::new();
    let scheduler = ClusterScheduler::with_clock(server.clone(), drmaa.clone(), SchedulerConfig::default(), clock);
    (scheduler, server, drmaa)
}

#[tokio::test]
async fn submit_rejects_empty_command() {
    let (scheduler, _server, _drmaa) = scheduler();
    let owner = UserId::new();
    let err = scheduler.submit(owner, JobTemplate::new(Vec::new())).await.unwrap_err();
    assert!(matches!(err, SchedulerError::EmptyCommand));
}

#[tokio::test]
async fn submit_registers_job_and_submits_to_drmaa() {
    let (scheduler, server, _drmaa) = scheduler();
    let owner = UserId::new();
    let job_id = scheduler.submit(owner, JobTemplate::new(vec!["echo".into(), "hi".into()])).await.unwrap();
    let job = server.get_job(job_id).expect("job registered");
    assert!(job.drmaa_id.is_some());
    assert_eq!(job.status, JobStatus::QueuedActive);
}

#[tokio::test]
async fn submit_registers_referenced_input_and_output_files() {
    let (scheduler, server, _drmaa) = scheduler();
    let owner = UserId::new();
    let mut template = JobTemplate::new(vec!["cp".into(), "a".into(), "b".into()]);
    template.referenced_input_files = vec!["a".into()];
    template.referenced_output_files = vec!["b".into()];

    let job_id = scheduler.submit(owner, template).await.unwrap();

    let job = server.get_job(job_id).unwrap();
    assert_eq!(job.referenced_input_files, vec!["a".to_string()]);
    assert_eq!(job.referenced_output_files, vec!["b".to_string()]);
}

#[tokio::test]
async fn submit_with_unknown_parallel_configuration_fails() {
    let (scheduler, _server, _drmaa) = scheduler();
    let owner = UserId::new();
    let mut template = JobTemplate::new(vec!["mpirun".into()]);
    template.parallel_job = Some(ParallelJobDescriptor::new("mpi", 4));
    let err = scheduler.submit(owner, template).await.unwrap_err();
    assert!(matches!(err, SchedulerError::UnknownParallelConfiguration(name) if name == "mpi"));
}

#[tokio::test]
async fn refresh_tick_harvests_terminal_exit_info() {
    let (scheduler, server, drmaa) = scheduler();
    let owner = UserId::new();
    let job_id = scheduler.submit(owner, JobTemplate::new(vec!["true".into()])).await.unwrap();
    let drmaa_id = server.get_drmaa_job_id(job_id).unwrap();
    drmaa.complete(&drmaa_id, 0);

    scheduler.refresh_tick().await;

    let job = server.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.exit_info.is_some());
}

#[tokio::test]
async fn linear_workflow_dispatches_second_node_after_first_completes() {
    let (scheduler, server, drmaa) = scheduler();
    let owner = UserId::new();

    let mut workflow = Workflow::new(WorkflowId::new(), "chain");
    let a = workflow.add_node(WorkflowNode::Job(JobTemplate::new(vec!["a".into()])));
    let b = workflow.add_node(WorkflowNode::Job(JobTemplate::new(vec!["b".into()])));
    workflow.add_dependency(a, b);

    let workflow_id = scheduler.submit_workflow(owner, workflow).await.unwrap();

    let registered = server.get_workflow(workflow_id).unwrap();
    let WorkflowNode::Job(_) = &registered.nodes[a] else { panic!("expected job node") };
    let job_a_id = {
        let registrations = scheduler.registrations.lock();
        registrations[&workflow_id].node_job_ids[a].unwrap()
    };
    let job_b_id = {
        let registrations = scheduler.registrations.lock();
        registrations[&workflow_id].node_job_ids[b].unwrap()
    };

    // only the source node has been submitted to drmaa so far
    assert!(server.get_drmaa_job_id(job_a_id).is_some());
    assert!(server.get_drmaa_job_id(job_b_id).is_none());

    let drmaa_id_a = server.get_drmaa_job_id(job_a_id).unwrap();
    drmaa.complete(&drmaa_id_a, 0);
    scheduler.refresh_tick().await;

    assert!(server.get_drmaa_job_id(job_b_id).is_some(), "b should have been submitted once a completed");
}

#[tokio::test]
async fn kill_marks_job_failed_with_user_killed_exit() {
    let (scheduler, server, _drmaa) = scheduler();
    let owner = UserId::new();
    let job_id = scheduler.submit(owner, JobTemplate::new(vec!["sleep".into(), "10".into()])).await.unwrap();

    scheduler.kill(job_id).await.unwrap();

    let job = server.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.exit_info.unwrap().kind, wfs_core::ExitStatusKind::UserKilled);
}

#[tokio::test]
async fn dispose_kills_then_removes_the_job_record() {
    let (scheduler, server, _drmaa) = scheduler();
    let owner = UserId::new();
    let job_id = scheduler.submit(owner, JobTemplate::new(vec!["true".into()])).await.unwrap();

    scheduler.dispose(job_id).await.unwrap();

    assert!(server.get_job(job_id).is_none());
}

#[tokio::test]
async fn all_jobs_ended_latch_flips_once_every_tracked_job_is_terminal() {
    let (scheduler, server, drmaa) = scheduler();
    let owner = UserId::new();
    let job_id = scheduler.submit(owner, JobTemplate::new(vec!["true".into()])).await.unwrap();

    assert!(!scheduler.all_jobs_ended(), "a freshly submitted job is still tracked");

    let drmaa_id = server.get_drmaa_job_id(job_id).unwrap();
    drmaa.complete(&drmaa_id, 0);
    scheduler.refresh_tick().await;

    assert!(scheduler.all_jobs_ended());
}

#[tokio::test]
async fn all_jobs_ended_latch_is_true_with_nothing_tracked() {
    let (scheduler, _server, _drmaa) = scheduler();
    scheduler.refresh_tick().await;
    assert!(scheduler.all_jobs_ended());
}

#[tokio::test]
async fn apply_config_updates_applies_the_tick_interval_from_the_watch_channel() {
    let (scheduler, _server, _drmaa) = scheduler();
    let scheduler = Arc::new(scheduler);
    let mut config = scheduler.config();
    config.refresh_interval_ms = 250;
    let (tx, rx) = tokio::sync::watch::channel(scheduler.config());
    let cancellation = tokio_util::sync::CancellationToken::new();

    let applying_scheduler = scheduler.clone();
    let applying_cancellation = cancellation.clone();
    let apply = tokio::spawn(async move { applying_scheduler.apply_config_updates(rx, applying_cancellation).await });

    tx.send(config).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    cancellation.cancel();
    apply.await.unwrap();

    assert_eq!(scheduler.config().refresh_interval_ms, 250);
}

#[tokio::test]
async fn refresh_tick_drops_tracking_for_a_job_removed_from_the_job_server() {
    let (scheduler, server, _drmaa) = scheduler();
    let owner = UserId::new();
    let job_id = scheduler.submit(owner, JobTemplate::new(vec!["true".into()])).await.unwrap();
    assert!(!scheduler.tracked.lock().is_empty());

    // removed through another path, e.g. a concurrent dispose
    server.delete_job(job_id);

    scheduler.refresh_tick().await;

    assert!(scheduler.tracked.lock().is_empty());
    assert!(scheduler.all_jobs_ended());
}
