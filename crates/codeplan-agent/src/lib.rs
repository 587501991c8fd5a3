// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session store and generation orchestration for Codeplan.
//!
//! The [`SessionStore`] owns sessions, messages and ephemeral progress. The
//! [`GenerationOrchestrator`] turns prompts into store mutations by driving a
//! `GenerationTransport`, and runs approved execution plans.

pub mod orchestrator;
pub mod shutdown;
pub mod store;

pub use orchestrator::{
    GenerationDefaults, GenerationHandle, GenerationOptions, GenerationOrchestrator,
    GenerationOutcome, StreamingGeneration,
};
pub use shutdown::install_signal_handler;
pub use store::SessionStore;
