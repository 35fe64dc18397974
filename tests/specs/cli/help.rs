//! CLI help and usage specs

use crate::prelude::*;

#[test]
fn wfsctl_help_shows_usage() {
    cli().args(&["--help"]).passes().stdout_has("Usage:");
}

#[test]
fn wfsctl_no_args_fails_with_usage() {
    cli().fails().stderr_has("Usage:");
}

#[test]
fn wfsctl_submit_help_shows_usage() {
    cli().args(&["submit", "--help"]).passes().stdout_has("Usage:");
}

#[test]
fn wfsctl_workflow_help_shows_subcommands() {
    cli().args(&["workflow", "--help"]).passes().stdout_has("submit").stdout_has("dispose");
}
