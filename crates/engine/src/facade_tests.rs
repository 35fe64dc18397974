// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use wfs_adapters::FakeCpuMonitor;
use wfs_core::{FakeClock, JobTemplate};
use wfs_storage::InMemoryJobServer;

use crate::config::SchedulerConfig;
use crate::local::LocalScheduler;

fn facade() -> (Facade<LocalScheduler<FakeCpuMonitor, FakeClock>>, Arc<InMemoryJobServer>) {
    let server = Arc::new(InMemoryJobServer::default());
    let cpu_monitor = Arc::new(FakeCpuMonitor::new(4, 1.0));
    let config = SchedulerConfig::default();
    let scheduler = Arc::new(LocalScheduler::with_clock(server.clone(), cpu_monitor, config, FakeClock::new()));
    (Facade::new(scheduler), server)
}

#[tokio::test]
async fn owner_can_submit_and_read_status() {
    let (facade, _server) = facade();
    let owner = facade.register_user("alice");
    let job_id = facade.submit(owner, JobTemplate::new(vec!["true".into()])).await.unwrap();

    let status = facade.status(owner, job_id).unwrap();
    assert_eq!(status, JobStatus::NotSubmitted);
}

#[tokio::test]
async fn non_owner_is_refused_with_no_side_effects() {
    let (facade, server) = facade();
    let owner = facade.register_user("alice");
    let intruder = facade.register_user("mallory");
    let job_id = facade.submit(owner, JobTemplate::new(vec!["true".into()])).await.unwrap();

    let err = facade.kill(intruder, job_id).await.unwrap_err();
    assert!(matches!(err, FacadeError::Refused));
    assert_eq!(server.get_job(job_id).unwrap().status, JobStatus::NotSubmitted);
}

#[tokio::test]
async fn wait_returns_once_job_reaches_a_terminal_status() {
    let (facade, _server) = facade();
    let owner = facade.register_user("alice");
    let job_id = facade.submit(owner, JobTemplate::barrier()).await.unwrap();

    let statuses = facade.wait(owner, &[job_id], Duration::from_secs(1)).await.unwrap();
    assert_eq!(statuses, vec![JobStatus::Done]);
}

#[tokio::test]
async fn wait_refuses_up_front_for_a_job_owned_by_someone_else() {
    let (facade, _server) = facade();
    let owner = facade.register_user("alice");
    let intruder = facade.register_user("mallory");
    let job_id = facade.submit(owner, JobTemplate::barrier()).await.unwrap();

    let err = facade.wait(intruder, &[job_id], Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, FacadeError::Refused));
}

#[tokio::test]
async fn register_transfer_allocates_a_path_and_is_listed_for_its_owner() {
    let (facade, _server) = facade();
    let owner = facade.register_user("alice");

    let transfer_id = facade.register_transfer(owner, "remote.txt", 24);

    assert_eq!(facade.transfers(owner), vec![transfer_id]);
}

#[tokio::test]
async fn write_transfer_line_creates_and_appends_to_the_local_file() {
    let (facade, server) = facade();
    let owner = facade.register_user("alice");
    let local_path = server.generate_local_file_path(owner, Some("remote.txt"));
    let transfer = wfs_core::Transfer::new(
        wfs_core::TransferId::new(),
        owner,
        "remote.txt",
        local_path.clone(),
        24,
        0,
    );
    let transfer_id = transfer.id;
    server.add_transfer(transfer);

    facade.write_transfer_line(owner, transfer_id, "first line").unwrap();
    facade.write_transfer_line(owner, transfer_id, "second line").unwrap();
    facade.end_transfers();

    let contents = std::fs::read_to_string(&local_path).unwrap();
    assert_eq!(contents, "first line\nsecond line\n");
}

#[tokio::test]
async fn read_transfer_returns_one_line_per_call_buffering_the_rest() {
    let (facade, server) = facade();
    let owner = facade.register_user("alice");
    let local_path = server.generate_local_file_path(owner, Some("remote.txt"));
    let transfer = wfs_core::Transfer::new(wfs_core::TransferId::new(), owner, "remote.txt", local_path.clone(), 24, 0);
    let transfer_id = transfer.id;
    server.add_transfer(transfer);
    std::fs::write(&local_path, "first\nsecond\nthird").unwrap();

    assert_eq!(facade.read_transfer(owner, transfer_id).unwrap().as_deref(), Some("first"));
    assert_eq!(facade.read_transfer(owner, transfer_id).unwrap().as_deref(), Some("second"));
    // "third" has no trailing newline yet; it stays buffered rather than
    // being returned early.
    assert_eq!(facade.read_transfer(owner, transfer_id).unwrap(), None);

    // more bytes appended by the external writer, via a separate handle;
    // the cached read handle's buffered "third" picks up the rest.
    {
        use std::io::Write as _;
        let mut file = std::fs::OpenOptions::new().append(true).open(&local_path).unwrap();
        writeln!(file).unwrap();
    }

    assert_eq!(facade.read_transfer(owner, transfer_id).unwrap().as_deref(), Some("third"));
}

#[tokio::test]
async fn read_transfer_is_refused_for_a_non_owner() {
    let (facade, server) = facade();
    let owner = facade.register_user("alice");
    let intruder = facade.register_user("mallory");
    let local_path = server.generate_local_file_path(owner, Some("remote.txt"));
    let transfer = wfs_core::Transfer::new(wfs_core::TransferId::new(), owner, "remote.txt", local_path, 24, 0);
    let transfer_id = transfer.id;
    server.add_transfer(transfer);

    let err = facade.read_transfer(intruder, transfer_id).unwrap_err();
    assert!(matches!(err, FacadeError::Refused));
}

#[tokio::test]
async fn set_transfer_status_is_visible_through_transfer_status() {
    let (facade, _server) = facade();
    let owner = facade.register_user("alice");
    let transfer_id = facade.register_transfer(owner, "remote.txt", 24);

    facade.set_transfer_status(owner, transfer_id, wfs_core::TransferStatus::ReadyToTransfer).unwrap();

    assert_eq!(facade.transfer_status(owner, transfer_id).unwrap(), wfs_core::TransferStatus::ReadyToTransfer);
}

#[tokio::test]
async fn cancel_transfer_removes_it_from_the_owners_list() {
    let (facade, _server) = facade();
    let owner = facade.register_user("alice");
    let transfer_id = facade.register_transfer(owner, "remote.txt", 24);

    facade.cancel_transfer(owner, transfer_id).unwrap();

    assert!(facade.transfers(owner).is_empty());
}

#[tokio::test]
async fn signal_transfer_ended_dispatches_the_owning_workflow() {
    let (facade, _server) = facade();
    let owner = facade.register_user("alice");

    let mut workflow = wfs_core::Workflow::new(wfs_core::WorkflowId::new(), "diamond");
    let fs_idx = workflow.add_node(wfs_core::WorkflowNode::FileSending { remote_path: "out.txt".into() });
    let job_idx = workflow.add_node(wfs_core::WorkflowNode::Job(JobTemplate::new(vec!["true".into()])));
    workflow.add_dependency(fs_idx, job_idx);

    facade.submit_workflow(owner, workflow).await.unwrap();
    let transfer_id = facade.transfers(owner)[0];
    let job_id = facade.jobs(owner)[0];
    assert_eq!(facade.status(owner, job_id).unwrap(), JobStatus::NotSubmitted);

    facade.set_transfer_status(owner, transfer_id, wfs_core::TransferStatus::Transfered).unwrap();
    facade.signal_transfer_ended(owner, transfer_id).await.unwrap();

    assert_ne!(facade.status(owner, job_id).unwrap(), JobStatus::NotSubmitted);
}

#[tokio::test]
async fn transfer_control_methods_are_refused_for_a_non_owner() {
    let (facade, _server) = facade();
    let owner = facade.register_user("alice");
    let intruder = facade.register_user("mallory");
    let transfer_id = facade.register_transfer(owner, "remote.txt", 24);

    assert!(matches!(
        facade.set_transfer_status(intruder, transfer_id, wfs_core::TransferStatus::Transfered).unwrap_err(),
        FacadeError::Refused
    ));
    assert!(matches!(facade.transfer_status(intruder, transfer_id).unwrap_err(), FacadeError::Refused));
    assert!(matches!(facade.transfer_information(intruder, transfer_id).unwrap_err(), FacadeError::Refused));
    assert!(matches!(facade.cancel_transfer(intruder, transfer_id).unwrap_err(), FacadeError::Refused));
    assert!(matches!(facade.signal_transfer_ended(intruder, transfer_id).await.unwrap_err(), FacadeError::Refused));
}
