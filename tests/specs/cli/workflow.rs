//! Workflow submission specs

use crate::prelude::*;
use std::io::Write;

const SINGLE_JOB_WORKFLOW: &str = r#"{
  "id": "wfw-0000000000000000000",
  "name": "single-job",
  "nodes": [
    {
      "Job": {
        "command": ["true"],
        "stdin_path": null,
        "stdout_path": null,
        "stderr_path": null,
        "join_stderr_to_stdout": false,
        "working_directory": null,
        "disposal_timeout_hours": 168,
        "name": "",
        "description": "",
        "referenced_input_files": [],
        "referenced_output_files": [],
        "parallel_job": null,
        "priority": 0,
        "is_barrier": false
      }
    }
  ],
  "dependencies": []
}"#;

fn workflow_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("should create a temp file");
    file.write_all(SINGLE_JOB_WORKFLOW.as_bytes()).expect("should write workflow json");
    file
}

#[test]
fn workflow_submit_prints_the_allocated_id() {
    let file = workflow_file();
    cli().args(&["workflow", "submit", file.path().to_str().unwrap()]).passes().stdout_has("submitted wfw-");
}

#[test]
fn workflow_submit_with_a_missing_file_fails() {
    cli().args(&["workflow", "submit", "/nonexistent/path.json"]).fails().stderr_has("failed to read");
}

#[test]
fn workflow_submit_with_invalid_json_fails() {
    let mut file = tempfile::NamedTempFile::new().expect("should create a temp file");
    file.write_all(b"not json").unwrap();
    cli().args(&["workflow", "submit", file.path().to_str().unwrap()]).fails().stderr_has("invalid workflow json");
}

#[test]
fn workflow_dispose_of_an_unknown_id_fails() {
    cli().args(&["workflow", "dispose", "wfw-doesnotexist00000"]).fails().stderr_has("error:");
}
