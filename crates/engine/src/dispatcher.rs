// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow DAG readiness evaluation, shared verbatim by the cluster and
//! local schedulers. A node is ready once every predecessor is complete;
//! completion means terminal for a job node, [`TransferStatus::Transfered`]
//! for a file-sending node, [`TransferStatus::ReadyToTransfer`] for a
//! file-retrieving node. Submission/enqueue of a now-ready job node, and
//! flipping a now-ready transfer node to `ReadyToTransfer`, are left to the
//! caller — the two schedulers perform those steps differently, but walk
//! the same DAG the same way.

use wfs_core::{JobId, TransferId, Workflow, WorkflowNode};
use wfs_storage::JobServer;

/// Scheduler-private bookkeeping for a registered workflow: the DAG itself,
/// plus which node produced which Job Server id, plus which nodes are still
/// awaiting dispatch ("to inspect" in the capability contract's terms).
pub struct WorkflowRegistration {
    pub workflow: Workflow,
    pub node_job_ids: Vec<Option<JobId>>,
    pub node_transfer_ids: Vec<Option<TransferId>>,
    pending: Vec<bool>,
}

impl WorkflowRegistration {
    pub fn new(workflow: Workflow) -> Self {
        let len = workflow.nodes.len();
        Self {
            workflow,
            node_job_ids: vec![None; len],
            node_transfer_ids: vec![None; len],
            pending: vec![true; len],
        }
    }

    pub fn mark_dispatched(&mut self, node_idx: usize) {
        self.pending[node_idx] = false;
    }

    pub fn all_dispatched(&self) -> bool {
        self.pending.iter().all(|p| !p)
    }
}

fn node_is_complete(
    registration: &WorkflowRegistration,
    server: &dyn JobServer,
    node_idx: usize,
) -> bool {
    match &registration.workflow.nodes[node_idx] {
        WorkflowNode::Job(_) => registration.node_job_ids[node_idx]
            .and_then(|id| server.get_job_status(id))
            .map(wfs_core::JobStatus::is_terminal)
            .unwrap_or(false),
        WorkflowNode::FileSending { .. } => registration.node_transfer_ids[node_idx]
            .and_then(|id| server.get_transfer_status(id))
            .map(wfs_core::TransferStatus::is_complete)
            .unwrap_or(false),
        WorkflowNode::FileRetrieving { .. } => registration.node_transfer_ids[node_idx]
            .and_then(|id| server.get_transfer_status(id))
            .map(wfs_core::TransferStatus::is_ready_for_retrieval)
            .unwrap_or(false),
    }
}

/// Nodes ready to move, split by kind. Does not mutate `registration`; the
/// caller marks nodes dispatched only once the corresponding submission (or
/// transfer flip) has actually happened.
pub fn evaluate_ready(
    registration: &WorkflowRegistration,
    server: &dyn JobServer,
) -> (Vec<usize>, Vec<usize>) {
    let mut ready_jobs = Vec::new();
    let mut ready_transfers = Vec::new();

    for idx in 0..registration.workflow.nodes.len() {
        if !registration.pending[idx] {
            continue;
        }
        let ready = registration.workflow.predecessors_of(idx).all(|pred| {
            // A node with itself as a listed predecessor can never be ready;
            // treated as incomplete rather than panicking on self-reference.
            pred != idx && node_is_complete(registration, server, pred)
        });
        if !ready {
            continue;
        }
        match &registration.workflow.nodes[idx] {
            WorkflowNode::Job(_) => ready_jobs.push(idx),
            WorkflowNode::FileSending { .. } | WorkflowNode::FileRetrieving { .. } => {
                ready_transfers.push(idx)
            }
        }
    }

    (ready_jobs, ready_transfers)
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
