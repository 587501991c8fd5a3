// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Codeplan generation client.
//!
//! This crate provides the data model (sessions, messages, plans, file
//! changes), the error taxonomy, and the trait seams to the collaborators the
//! client consumes: the generation transport, the project store, the
//! capability gate, and the step executor.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CodeplanError;
pub use types::{GenerationId, MessageId, SessionId};

pub use traits::{CapabilityGate, GenerationTransport, ProjectStore, StepExecutor};
