// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for Codeplan.
//!
//! - [`MockTransport`]: scripted generation backend (ready results, canned
//!   streams, hand-fed streams)
//! - [`ScriptedExecutor`]: plan step executor that fails where told to
//! - [`InMemoryProjectStore`]: project store backed by maps
//! - [`StaticGate`]: capability gate that can be flipped mid-test
//! - [`wire`]: builders for protocol lines

pub mod executor;
pub mod gate;
pub mod mock_transport;
pub mod project_store;
pub mod wire;

pub use executor::ScriptedExecutor;
pub use gate::StaticGate;
pub use mock_transport::{MockTransport, StreamFeeder};
pub use project_store::InMemoryProjectStore;
