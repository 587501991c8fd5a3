// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport trait for the generation backend.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;

use crate::error::CodeplanError;
use crate::types::{GenerationRequest, GenerationResult};

/// Raw response body of a streaming generation.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, CodeplanError>> + Send>>;

/// Carries generation requests to the backend.
///
/// Implementations report network failures and timeouts as
/// [`CodeplanError::Transport`]; they never interpret the stream body.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    /// Returns the transport name (e.g., "http").
    fn name(&self) -> &str;

    /// Posts one request and waits for the terminal result.
    async fn complete(&self, request: GenerationRequest)
    -> Result<GenerationResult, CodeplanError>;

    /// Posts one request and returns the response body as it arrives.
    async fn stream(&self, request: GenerationRequest) -> Result<ByteStream, CodeplanError>;
}
