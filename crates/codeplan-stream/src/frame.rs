// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire frames and single-line parsing.

use codeplan_core::types::{GenerationProgress, GenerationResult};
use serde::Deserialize;

/// Line prefix that marks a protocol event.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that terminates the protocol.
pub const DONE_MARKER: &str = "[DONE]";

/// One server event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// A fragment of assistant text.
    Content {
        #[serde(default)]
        content: String,
    },
    /// Ephemeral progress; replaces whatever progress was shown before.
    Progress {
        #[serde(default)]
        step: String,
        #[serde(default)]
        progress: f64,
        #[serde(default)]
        message: String,
        #[serde(default, rename = "currentFile")]
        current_file: Option<String>,
    },
    /// The terminal generation result.
    Result { data: GenerationResult },
    /// Server-side failure. Terminal.
    Error {
        #[serde(default)]
        message: String,
    },
}

impl Frame {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::Progress { .. } => "progress",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
        }
    }
}

/// Converts a progress frame's fields, clamping the percentage into `0..=100`.
pub fn progress_from_frame(
    step: &str,
    progress: f64,
    message: &str,
    current_file: Option<&str>,
) -> GenerationProgress {
    let percent = if progress.is_finite() {
        progress.clamp(0.0, 100.0).round() as u8
    } else {
        0
    };
    GenerationProgress {
        step: step.to_string(),
        progress: percent,
        message: message.to_string(),
        current_file: current_file.map(str::to_string),
        is_complete: false,
    }
}

/// Classification of one decoded line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Frame(Frame),
    /// `data: [DONE]`.
    Done,
    /// Blank lines, comments, `event:` lines and anything else without the
    /// data prefix.
    Ignored,
    /// A data line whose payload is not a known frame. Carries the parser error.
    Malformed(String),
}

/// Classifies a single line (without its newline).
pub fn parse_line(line: &str) -> Line {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Ignored;
    };
    let payload = payload.trim();
    if payload == DONE_MARKER {
        return Line::Done;
    }
    match serde_json::from_str::<Frame>(payload) {
        Ok(frame) => Line::Frame(frame),
        Err(e) => Line::Malformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeplan_core::types::PlanStatus;

    #[test]
    fn content_frame() {
        let line = r#"data: {"type":"content","content":"Sure, "}"#;
        assert_eq!(
            parse_line(line),
            Line::Frame(Frame::Content {
                content: "Sure, ".into()
            })
        );
    }

    #[test]
    fn progress_frame_with_current_file() {
        let line = r#"data: {"type":"progress","step":"writing","progress":40,"message":"Writing files","currentFile":"src/App.tsx"}"#;
        match parse_line(line) {
            Line::Frame(Frame::Progress {
                step,
                progress,
                current_file,
                ..
            }) => {
                assert_eq!(step, "writing");
                assert_eq!(progress, 40.0);
                assert_eq!(current_file.as_deref(), Some("src/App.tsx"));
            }
            other => panic!("expected progress frame, got {other:?}"),
        }
    }

    #[test]
    fn result_frame_carries_plan() {
        let line = r#"data: {"type":"result","data":{"success":true,"message":"done","files":[],"executionPlan":{"id":"p1","title":"Add login","steps":[{"id":"s1","description":"Create button"}]}}}"#;
        match parse_line(line) {
            Line::Frame(Frame::Result { data }) => {
                assert!(data.success);
                let plan = data.execution_plan.unwrap();
                assert_eq!(plan.status, PlanStatus::Pending);
                assert_eq!(plan.steps.len(), 1);
            }
            other => panic!("expected result frame, got {other:?}"),
        }
    }

    #[test]
    fn error_frame() {
        let line = r#"data: {"type":"error","message":"model overloaded"}"#;
        assert_eq!(
            parse_line(line),
            Line::Frame(Frame::Error {
                message: "model overloaded".into()
            })
        );
    }

    #[test]
    fn done_marker() {
        assert_eq!(parse_line("data: [DONE]"), Line::Done);
        assert_eq!(parse_line("data: [DONE]  "), Line::Done);
    }

    #[test]
    fn lines_without_prefix_are_ignored() {
        assert_eq!(parse_line(""), Line::Ignored);
        assert_eq!(parse_line(": keep-alive"), Line::Ignored);
        assert_eq!(parse_line("event: content"), Line::Ignored);
        assert_eq!(parse_line("data:{\"type\":\"content\"}"), Line::Ignored);
    }

    #[test]
    fn malformed_payloads_are_reported_not_fatal() {
        assert!(matches!(parse_line("data: {not json"), Line::Malformed(_)));
        assert!(matches!(
            parse_line(r#"data: {"type":"telemetry","x":1}"#),
            Line::Malformed(_)
        ));
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_from_frame("s", 150.0, "", None).progress, 100);
        assert_eq!(progress_from_frame("s", -3.0, "", None).progress, 0);
        assert_eq!(progress_from_frame("s", 41.6, "", None).progress, 42);
        assert_eq!(progress_from_frame("s", f64::NAN, "", None).progress, 0);
    }
}
