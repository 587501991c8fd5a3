// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability gate: the only view the core has of authentication and billing.

/// Answers whether the current user may start a generation.
pub trait CapabilityGate: Send + Sync {
    fn may_generate(&self) -> bool;
}

/// Gate that always permits generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CapabilityGate for AllowAll {
    fn may_generate(&self) -> bool {
        true
    }
}

impl<F> CapabilityGate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn may_generate(&self) -> bool {
        self()
    }
}
