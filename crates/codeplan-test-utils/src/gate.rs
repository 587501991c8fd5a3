// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability gate with a switchable answer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use codeplan_core::traits::CapabilityGate;

#[derive(Debug, Clone)]
pub struct StaticGate {
    allowed: Arc<AtomicBool>,
}

impl StaticGate {
    pub fn allowing() -> Self {
        Self {
            allowed: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn denying() -> Self {
        Self {
            allowed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flips the answer for every clone of this gate.
    pub fn set_allowed(&self, allowed: bool) {
        self.allowed.store(allowed, Ordering::SeqCst);
    }
}

impl CapabilityGate for StaticGate {
    fn may_generate(&self) -> bool {
        self.allowed.load(Ordering::SeqCst)
    }
}
