//! Job and transfer submission specs
//!
//! Each `wfsctl` invocation binds a fresh in-memory Job Server, so these
//! specs only check what a single command can observe about its own
//! submission within one process run.

use crate::prelude::*;

#[test]
fn submit_prints_a_job_id() {
    cli().args(&["submit", "--", "true"]).passes().stdout_has("submitted job-");
}

#[test]
fn submit_with_json_output_prints_the_bare_id() {
    let stdout = cli().args(&["--output", "json", "submit", "--", "true"]).passes().stdout();
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("submit --output json should print valid json");
    assert!(value.as_str().expect("submit json payload is the job id string").starts_with("job-"));
}

#[test]
fn status_of_an_unknown_job_fails() {
    cli().args(&["status", "job-doesnotexist0000000"]).fails().stderr_has("error:");
}

#[test]
fn register_transfer_prints_the_allocated_id() {
    cli().args(&["register-transfer", "remote.txt"]).passes().stdout_has("registered trf-");
}

#[test]
fn jobs_with_no_prior_submission_reports_empty() {
    cli().args(&["jobs"]).passes().stdout_has("no jobs submitted this run");
}

#[test]
fn transfers_with_no_prior_registration_reports_empty() {
    cli().args(&["transfers"]).passes().stdout_has("no transfers registered this run");
}
