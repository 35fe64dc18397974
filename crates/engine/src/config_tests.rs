// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn default_config_has_sane_refresh_interval() {
    let config = SchedulerConfig::default();
    assert_eq!(config.refresh_interval(), Duration::from_millis(1_000));
}

#[test]
#[serial]
fn load_from_file_parses_toml() {
    let mut file = NamedTempFile::new().expect("tempfile");
    writeln!(file, "refresh_interval_ms = 500\nproc_nb = 2\nmax_proc_nb = 4").expect("write");
    let config = SchedulerConfig::load(Some(file.path())).expect("load should succeed");
    assert_eq!(config.refresh_interval_ms, 500);
    assert_eq!(config.proc_nb, 2);
    assert_eq!(config.max_proc_nb, 4);
}

#[test]
#[serial]
fn env_override_wins_over_file() {
    let mut file = NamedTempFile::new().expect("tempfile");
    writeln!(file, "proc_nb = 2").expect("write");
    std::env::set_var("WFS_PROC_NB", "9");
    let config = SchedulerConfig::load(Some(file.path())).expect("load should succeed");
    std::env::remove_var("WFS_PROC_NB");
    assert_eq!(config.proc_nb, 9);
}

#[test]
fn parallel_job_config_resolves_known_name() {
    let mut config = ParallelJobConfig::default();
    config.configurations.insert("mpi".into(), "cluster_mpi".into());
    assert_eq!(config.resolve("mpi"), Some("cluster_mpi"));
    assert_eq!(config.resolve("unknown"), None);
}

#[test]
#[serial]
fn save_then_load_round_trips() {
    let file = NamedTempFile::new().expect("tempfile");
    let mut config = SchedulerConfig::default();
    config.proc_nb = 7;
    config.save(file.path()).expect("save should succeed");

    let loaded = SchedulerConfig::load(Some(file.path())).expect("load should succeed");
    assert_eq!(loaded.proc_nb, 7);
}

#[tokio::test]
#[serial]
async fn explicit_trigger_reloads_and_publishes_the_new_value() {
    let mut file = NamedTempFile::new().expect("tempfile");
    writeln!(file, "proc_nb = 2").expect("write");

    let (mut rx, handle) = SchedulerConfig::watch(file.path().to_path_buf()).expect("watch should succeed");
    assert_eq!(rx.borrow().proc_nb, 2);

    std::fs::write(file.path(), "proc_nb = 5\n").expect("rewrite config file");
    handle.trigger_reload();

    rx.changed().await.expect("reload should publish an update");
    assert_eq!(rx.borrow().proc_nb, 5);
}

#[tokio::test]
#[serial]
async fn reload_persists_env_overrides_back_to_the_file() {
    let mut file = NamedTempFile::new().expect("tempfile");
    writeln!(file, "proc_nb = 2").expect("write");
    std::env::set_var("WFS_PROC_NB", "9");

    let (mut rx, handle) = SchedulerConfig::watch(file.path().to_path_buf()).expect("watch should succeed");
    handle.trigger_reload();
    rx.changed().await.expect("reload should publish an update");
    std::env::remove_var("WFS_PROC_NB");

    assert_eq!(rx.borrow().proc_nb, 9);
    let persisted = std::fs::read_to_string(file.path()).expect("read back config file");
    assert!(persisted.contains("proc_nb = 9"));
}
