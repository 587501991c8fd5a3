// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for `data: <json>\n` protocol lines.

use codeplan_core::types::GenerationResult;
use serde_json::json;

/// Protocol terminator line.
pub const DONE: &str = "data: [DONE]\n";

fn data_line(value: serde_json::Value) -> String {
    format!("data: {value}\n")
}

pub fn content(fragment: &str) -> String {
    data_line(json!({"type": "content", "content": fragment}))
}

pub fn progress(step: &str, percent: u8, message: &str) -> String {
    data_line(json!({
        "type": "progress",
        "step": step,
        "progress": percent,
        "message": message,
    }))
}

pub fn progress_on_file(step: &str, percent: u8, message: &str, file: &str) -> String {
    data_line(json!({
        "type": "progress",
        "step": step,
        "progress": percent,
        "message": message,
        "currentFile": file,
    }))
}

pub fn result(result: &GenerationResult) -> String {
    data_line(json!({"type": "result", "data": result}))
}

pub fn error(message: &str) -> String {
    data_line(json!({"type": "error", "message": message}))
}
