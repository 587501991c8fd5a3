// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams to the collaborators the core consumes but does not own.
//!
//! All async traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod executor;
pub mod gate;
pub mod project;
pub mod transport;

pub use executor::StepExecutor;
pub use gate::{AllowAll, CapabilityGate};
pub use project::ProjectStore;
pub use transport::{ByteStream, GenerationTransport};
