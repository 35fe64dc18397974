// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;

use super::{format_or_json, handle_list, OutputFormat};

#[derive(Debug, Clone, Serialize)]
struct FakeEntry {
    name: String,
    detail: String,
}

#[test]
fn handle_list_json_includes_all_fields() {
    let entries = vec![
        FakeEntry { name: "a".into(), detail: "d1".into() },
        FakeEntry { name: "b".into(), detail: "d2".into() },
    ];

    let result = handle_list(OutputFormat::Json, &entries, "none", |_, _| {
        panic!("text renderer should not run for the json format");
    });
    assert!(result.is_ok());
}

#[test]
fn handle_list_text_empty_prints_empty_message() {
    let entries: Vec<FakeEntry> = vec![];
    let result = handle_list(OutputFormat::Text, &entries, "no entries found", |_, _| {
        panic!("text renderer should not run for an empty list");
    });
    assert!(result.is_ok());
}

#[test]
fn handle_list_text_non_empty_invokes_renderer() {
    let entries = vec![FakeEntry { name: "x".into(), detail: "y".into() }];
    let mut ran = false;
    let result = handle_list(OutputFormat::Text, &entries, "no entries found", |items, _| {
        ran = items.len() == 1;
    });
    assert!(result.is_ok());
    assert!(ran);
}

#[test]
fn format_or_json_text_invokes_callback() {
    let mut ran = false;
    let result = format_or_json(OutputFormat::Text, &FakeEntry { name: "a".into(), detail: "b".into() }, || {
        ran = true;
    });
    assert!(result.is_ok());
    assert!(ran);
}
