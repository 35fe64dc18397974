// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local process launch and teardown for the local scheduler. Children are
//! started in their own process group on Unix so the whole tree can be
//! signalled at once, mirroring the `setsid`-based fallback the original
//! implementation uses when no richer process-inspection tool is available.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::ProcessError;

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub command: Vec<String>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub stdin_path: Option<PathBuf>,
    pub working_directory: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

pub struct RunningProcess {
    pub child: Child,
}

fn open_file_for_write(path: &PathBuf) -> Result<std::fs::File, ProcessError> {
    std::fs::File::create(path)
        .map_err(|source| ProcessError::OpenFile { path: path.display().to_string(), source })
}

fn open_file_for_read(path: &PathBuf) -> Result<std::fs::File, ProcessError> {
    std::fs::File::open(path)
        .map_err(|source| ProcessError::OpenFile { path: path.display().to_string(), source })
}

/// Launch a child process per `spec`. Any I/O file that fails to open is
/// reported without leaving partially-opened handles behind.
pub fn spawn(spec: &ProcessSpec) -> Result<RunningProcess, ProcessError> {
    let Some((program, args)) = spec.command.split_first() else {
        return Err(ProcessError::Spawn(std::io::Error::other("empty command")));
    };

    let stdout = open_file_for_write(&spec.stdout_path)?;
    let stderr = open_file_for_write(&spec.stderr_path)?;
    let stdin = match &spec.stdin_path {
        Some(path) => Some(open_file_for_read(path)?),
        None => None,
    };

    let mut command = Command::new(program);
    command.args(args);
    command.stdout(Stdio::from(stdout));
    command.stderr(Stdio::from(stderr));
    command.stdin(stdin.map(Stdio::from).unwrap_or_else(Stdio::null));
    if let Some(dir) = &spec.working_directory {
        command.current_dir(dir);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    #[cfg(unix)]
    {
        // Own process group so `kill_tree` can signal every descendant.
        command.process_group(0);
    }

    let child = command.spawn().map_err(ProcessError::Spawn)?;
    Ok(RunningProcess { child })
}

/// Non-blocking reap: `Some(exit_code)` once the child has exited.
pub fn try_reap(proc: &mut RunningProcess) -> Option<i32> {
    match proc.child.try_wait() {
        Ok(Some(status)) => Some(status.code().unwrap_or(-1)),
        _ => None,
    }
}

/// Signal the whole process group and drain the child so its file handles
/// are released before returning.
#[cfg(unix)]
pub async fn kill_tree(proc: &mut RunningProcess) -> Result<(), ProcessError> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = proc.child.id() {
        let pgid = Pid::from_raw(pid as i32);
        // ESRCH means the group is already gone; not an error for our purposes.
        if let Err(e) = killpg(pgid, Signal::SIGKILL) {
            if e != nix::errno::Errno::ESRCH {
                return Err(ProcessError::Signal(std::io::Error::from_raw_os_error(e as i32)));
            }
        }
    }
    let _ = proc.child.wait().await;
    Ok(())
}

#[cfg(not(unix))]
pub async fn kill_tree(proc: &mut RunningProcess) -> Result<(), ProcessError> {
    proc.child.kill().await.map_err(ProcessError::Signal)?;
    let _ = proc.child.wait().await;
    Ok(())
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
