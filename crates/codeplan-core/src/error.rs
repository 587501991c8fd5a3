// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Codeplan generation client.

use thiserror::Error;

use crate::types::{FailureKind, PlanStatus};

/// The primary error type used across Codeplan crates.
#[derive(Debug, Error)]
pub enum CodeplanError {
    /// Configuration errors (invalid values, unusable settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// Network failure, timeout, or a non-success HTTP status from the backend.
    #[error("network error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend reported an error frame. Authoritative and terminal.
    #[error("server error: {message}")]
    Protocol { message: String },

    /// The user cancelled the in-flight generation.
    #[error("generation cancelled")]
    Cancelled,

    /// A generation is already in flight for this session.
    #[error("already generating in session {session_id}")]
    AlreadyGenerating { session_id: String },

    /// The capability gate refused generation (signed out, billing, ...).
    #[error("generation is not permitted for the current user")]
    NotPermitted,

    /// No session with the given id exists.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// No message with the given id exists in the session.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// The message has no execution plan attached.
    #[error("message {0} has no execution plan")]
    PlanNotFound(String),

    /// A plan transition outside the permitted forward edges.
    #[error("invalid plan transition from {from} to {to}")]
    InvalidTransition { from: PlanStatus, to: PlanStatus },

    /// A plan step failed during execution.
    #[error("plan step {} ({step_id}) failed: {message}", .index + 1)]
    StepFailed {
        index: usize,
        step_id: String,
        message: String,
    },

    /// A file change is missing the content its action requires.
    #[error("invalid file change for {path}: {reason}")]
    InvalidFileChange { path: String, reason: String },

    /// Project store errors (read or write failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CodeplanError {
    /// Builds a transport error from any error source.
    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The user-visible failure class, if this error terminates a generation or plan.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Transport { .. } => Some(FailureKind::Network),
            Self::Protocol { .. } => Some(FailureKind::Server),
            Self::Cancelled => Some(FailureKind::Cancelled),
            Self::StepFailed { .. } => Some(FailureKind::PlanStep),
            Self::Storage { .. } => Some(FailureKind::Storage),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CodeplanError {
    fn from(e: std::io::Error) -> Self {
        Self::transport(format!("I/O failure: {e}"), e)
    }
}
