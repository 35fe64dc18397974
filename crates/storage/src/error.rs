// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job Server error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobServerError {
    #[error("unknown job id")]
    UnknownJob,
    #[error("unknown transfer id")]
    UnknownTransfer,
    #[error("unknown workflow id")]
    UnknownWorkflow,
    #[error("unknown local transfer path")]
    UnknownTransferPath,
}
