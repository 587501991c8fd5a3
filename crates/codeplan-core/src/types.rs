// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data model shared by the store, the stream reader, the plan machine and the
//! orchestrator.
//!
//! Wire-facing structs use camelCase field names to match the generation
//! backend; the outbound [`GenerationRequest`] uses snake_case.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Unique identifier for one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationId(pub String);

macro_rules! uuid_id {
    ($($ty:ident),*) => {
        $(
            impl $ty {
                /// Generates a fresh random identifier.
                pub fn generate() -> Self {
                    Self(uuid::Uuid::new_v4().to_string())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $ty {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

uuid_id!(SessionId, MessageId, GenerationId);

// --- Sessions and messages ---

/// Who authored a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// The user-visible class of a terminal failure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Network failure or timeout talking to the backend.
    Network,
    /// The backend sent an error frame.
    Server,
    /// The user cancelled the generation.
    Cancelled,
    /// A plan step failed during execution.
    PlanStep,
    /// Approved changes could not be written to the project.
    Storage,
}

impl FailureKind {
    /// Short bracketed label used when failure text is shown to the user.
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::Network => "[network error]",
            FailureKind::Server => "[server error]",
            FailureKind::Cancelled => "[cancelled]",
            FailureKind::PlanStep => "[plan step failed]",
            FailureKind::Storage => "[storage error]",
        }
    }
}

/// A classified failure recorded on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageError {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.message)
    }
}

/// Generation bookkeeping attached to assistant messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub files_affected: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MessageError>,
}

/// One message in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_thinking: bool,
    pub is_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_plan: Option<Plan>,
    /// Proposed file changes from the terminal result, diffs computed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_changes: Vec<FileChange>,
}

impl Message {
    /// True while the message is still being produced.
    pub fn is_active(&self) -> bool {
        self.is_streaming || self.is_thinking
    }

    /// Mutable access to the metadata, creating it on first use.
    pub fn metadata_mut(&mut self) -> &mut MessageMetadata {
        self.metadata.get_or_insert_with(MessageMetadata::default)
    }
}

/// The caller-supplied part of a new message; the store fills in id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub is_thinking: bool,
    pub is_streaming: bool,
    pub metadata: Option<MessageMetadata>,
}

impl NewMessage {
    /// A finished user prompt.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            is_thinking: false,
            is_streaming: false,
            metadata: None,
        }
    }

    /// An assistant placeholder awaiting a non-streaming result.
    pub fn assistant_thinking() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            is_thinking: true,
            is_streaming: false,
            metadata: None,
        }
    }

    /// An assistant placeholder that will receive content frames.
    pub fn assistant_streaming() -> Self {
        Self {
            is_streaming: true,
            ..Self::assistant_thinking()
        }
    }
}

/// A persistent conversation tied (optionally) to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new(project_id: Option<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            project_id,
            title: title.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn message_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    /// The message currently streaming or thinking, if any.
    pub fn active_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_active())
    }
}

// --- Execution plans ---

/// Lifecycle state of an execution plan.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    AwaitingConfirmation,
    Approved,
    Executing,
    Completed,
    Cancelled,
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Cancelled | PlanStatus::Failed
        )
    }
}

/// Lifecycle state of one plan step.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// One unit of work within a plan. Index in [`Plan::steps`] is execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: StepStatus::Pending,
            error: None,
        }
    }
}

/// A proposed, user-approvable sequence of file-mutating steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Index of the step that failed, when status is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
}

impl Plan {
    pub fn new(id: impl Into<String>, title: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: PlanStatus::Pending,
            steps,
            rejection_reason: None,
            failed_step: None,
        }
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    /// Fraction of steps completed, in `0.0..=1.0`.
    ///
    /// A plan without steps reports `1.0` once completed and `0.0` otherwise.
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return if self.status == PlanStatus::Completed {
                1.0
            } else {
                0.0
            };
        }
        self.completed_steps() as f64 / self.steps.len() as f64
    }
}

// --- File changes and diffs ---

/// What a file change does to its path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileAction {
    Create,
    Update,
    Delete,
}

/// Kind of one diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChunkKind {
    Add,
    Remove,
    Context,
}

/// One line-level add/remove/context record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffChunk {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    /// 1-based line number in the side the line belongs to (new side for
    /// `add`/`context`, old side for `remove`).
    pub line_number: usize,
    pub content: String,
}

/// Line-level difference for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub additions: usize,
    pub deletions: usize,
    pub changes: Vec<DiffChunk>,
}

/// A proposed change to one project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub action: FileAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<FileDiff>,
}

impl FileChange {
    /// Checks that the contents required by the action are present.
    pub fn validate(&self) -> Result<(), crate::CodeplanError> {
        let missing = match self.action {
            FileAction::Create if self.new_content.is_none() => Some("newContent"),
            FileAction::Update if self.old_content.is_none() => Some("oldContent"),
            FileAction::Update if self.new_content.is_none() => Some("newContent"),
            FileAction::Delete if self.old_content.is_none() => Some("oldContent"),
            _ => None,
        };
        match missing {
            Some(field) => Err(crate::CodeplanError::InvalidFileChange {
                path: self.path.clone(),
                reason: format!("{} requires {field}", self.action),
            }),
            None => Ok(()),
        }
    }
}

// --- Generation ---

/// Ephemeral progress of the in-flight generation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationProgress {
    pub step: String,
    /// Percentage in `0..=100`.
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
}

impl GenerationProgress {
    /// Step name of the terminal marker written on cancellation.
    pub const CANCELLED_STEP: &'static str = "cancelled";

    /// Progress at the start of a new attempt.
    pub fn starting() -> Self {
        Self {
            step: "starting".to_string(),
            progress: 0,
            message: String::new(),
            current_file: None,
            is_complete: false,
        }
    }

    /// Terminal marker after a user cancellation, keeping the reached percentage.
    pub fn cancelled(reached: u8) -> Self {
        Self {
            step: Self::CANCELLED_STEP.to_string(),
            progress: reached,
            message: "Generation cancelled".to_string(),
            current_file: None,
            is_complete: true,
        }
    }

    /// Terminal marker after a successful generation.
    pub fn complete() -> Self {
        Self {
            step: "complete".to_string(),
            progress: 100,
            message: "Generation complete".to_string(),
            current_file: None,
            is_complete: true,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.step == Self::CANCELLED_STEP && self.is_complete
    }
}

/// Backend generation strategy.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Simple,
    Agentic,
    Fullstack,
}

/// A file sent to the backend as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
}

/// One prior turn sent to the backend as conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Request body posted to the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub message: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_files: Option<Vec<ProjectFile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<HistoryEntry>>,
    pub mode: GenerationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Terminal result of a generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub files: Vec<FileChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_status_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&PlanStatus::AwaitingConfirmation).unwrap();
        assert_eq!(json, "\"awaiting_confirmation\"");
        assert_eq!(PlanStatus::AwaitingConfirmation.to_string(), "awaiting_confirmation");
        assert_eq!(StepStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn plan_from_backend_defaults_statuses_to_pending() {
        let json = r#"{
            "id": "plan-1",
            "title": "Add login",
            "steps": [
                {"id": "s1", "description": "Create component"},
                {"id": "s2", "description": "Wire route"}
            ]
        }"#;
        let plan: Plan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.status, PlanStatus::Pending);
        assert!(plan.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(plan.description, "");
    }

    #[test]
    fn plan_progress_is_bounded() {
        let mut plan = Plan::new(
            "p",
            "t",
            vec![Step::new("a", "a"), Step::new("b", "b"), Step::new("c", "c")],
        );
        assert_eq!(plan.progress(), 0.0);
        plan.steps[0].status = StepStatus::Completed;
        assert!((plan.progress() - 1.0 / 3.0).abs() < f64::EPSILON);
        for step in &mut plan.steps {
            step.status = StepStatus::Completed;
        }
        assert_eq!(plan.progress(), 1.0);

        let empty = Plan::new("e", "empty", vec![]);
        assert_eq!(empty.progress(), 0.0);
    }

    #[test]
    fn file_change_wire_shape() {
        let json = r#"{"path":"Login.tsx","action":"update","oldContent":"a","newContent":"b"}"#;
        let change: FileChange = serde_json::from_str(json).unwrap();
        assert_eq!(change.action, FileAction::Update);
        assert_eq!(change.old_content.as_deref(), Some("a"));
        assert!(change.validate().is_ok());
    }

    #[test]
    fn file_change_validation_names_missing_field() {
        let change = FileChange {
            path: "gone.rs".into(),
            action: FileAction::Delete,
            old_content: None,
            new_content: None,
            diff: None,
        };
        let err = change.validate().unwrap_err().to_string();
        assert!(err.contains("oldContent"), "got: {err}");

        let create = FileChange {
            path: "new.rs".into(),
            action: FileAction::Create,
            old_content: None,
            new_content: Some(String::new()),
            diff: None,
        };
        assert!(create.validate().is_ok());
    }

    #[test]
    fn diff_chunk_serializes_kind_as_type() {
        let chunk = DiffChunk {
            kind: ChunkKind::Remove,
            line_number: 3,
            content: "old".into(),
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["type"], "remove");
        assert_eq!(value["lineNumber"], 3);
    }

    #[test]
    fn request_omits_absent_optionals() {
        let request = GenerationRequest {
            message: "add a login button".into(),
            model: "gpt-4o".into(),
            api_key: None,
            current_files: None,
            conversation_history: None,
            mode: GenerationMode::Agentic,
            project_id: Some("proj-1".into()),
            user_id: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["mode"], "agentic");
        assert_eq!(value["project_id"], "proj-1");
        assert!(value.get("api_key").is_none());
        assert!(value.get("conversation_history").is_none());
    }

    #[test]
    fn result_carries_execution_plan() {
        let json = r#"{
            "success": true,
            "message": "planned",
            "files": [],
            "executionPlan": {"id": "p1", "title": "Refactor", "steps": []}
        }"#;
        let result: GenerationResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.execution_plan.unwrap().id, "p1");
    }

    #[test]
    fn new_message_placeholders() {
        let streaming = NewMessage::assistant_streaming();
        assert!(streaming.is_streaming && streaming.is_thinking);
        let thinking = NewMessage::assistant_thinking();
        assert!(thinking.is_thinking && !thinking.is_streaming);
        assert!(!NewMessage::user("hi").is_thinking);
    }

    #[test]
    fn cancelled_marker_keeps_reached_progress() {
        let marker = GenerationProgress::cancelled(40);
        assert!(marker.is_cancelled());
        assert_eq!(marker.progress, 40);
        assert!(!GenerationProgress::starting().is_cancelled());
    }

    #[test]
    fn failure_labels_are_distinct() {
        let labels = [
            FailureKind::Network.label(),
            FailureKind::Server.label(),
            FailureKind::Cancelled.label(),
            FailureKind::PlanStep.label(),
        ];
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
