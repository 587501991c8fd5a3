// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock generation transport for deterministic testing.
//!
//! `MockTransport` implements `GenerationTransport` with scripted replies,
//! so orchestrator tests run without a backend.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::stream;
use tokio::sync::{Mutex, oneshot};

use codeplan_core::CodeplanError;
use codeplan_core::traits::{ByteStream, GenerationTransport};
use codeplan_core::types::{GenerationRequest, GenerationResult};

use crate::wire;

enum Completion {
    Ready(Result<GenerationResult, CodeplanError>),
    Deferred(oneshot::Receiver<Result<GenerationResult, CodeplanError>>),
}

enum ScriptedStream {
    Chunks(Vec<Result<Bytes, CodeplanError>>),
    Fed(mpsc::UnboundedReceiver<Result<Bytes, CodeplanError>>),
    Refused(CodeplanError),
}

/// Sending half of a stream scripted with [`MockTransport::push_fed_stream`].
///
/// Each `send` delivers one chunk. Dropping the feeder ends the stream.
#[derive(Debug, Clone)]
pub struct StreamFeeder {
    tx: mpsc::UnboundedSender<Result<Bytes, CodeplanError>>,
}

impl StreamFeeder {
    /// Delivers raw bytes as one chunk. Returns false once the reader is gone.
    pub fn send(&self, chunk: impl Into<String>) -> bool {
        self.tx
            .unbounded_send(Ok(Bytes::from(chunk.into())))
            .is_ok()
    }

    /// Delivers a transport failure mid-stream.
    pub fn fail(&self, error: CodeplanError) -> bool {
        self.tx.unbounded_send(Err(error)).is_ok()
    }

    /// True once the reading side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A mock transport that replays queued completions and streams.
///
/// Both queues are FIFO. When the completion queue is empty a successful
/// "mock response" result is returned; when the stream queue is empty a
/// single content frame followed by `[DONE]` is streamed.
#[derive(Clone, Default)]
pub struct MockTransport {
    completions: Arc<Mutex<VecDeque<Completion>>>,
    streams: Arc<Mutex<VecDeque<ScriptedStream>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful non-streaming result.
    pub async fn push_result(&self, result: GenerationResult) {
        self.completions
            .lock()
            .await
            .push_back(Completion::Ready(Ok(result)));
    }

    /// Queues a failing non-streaming call.
    pub async fn push_completion_error(&self, error: CodeplanError) {
        self.completions
            .lock()
            .await
            .push_back(Completion::Ready(Err(error)));
    }

    /// Queues a non-streaming call that stays pending until the returned
    /// sender resolves it. Dropping the sender fails the call.
    pub async fn push_deferred(
        &self,
    ) -> oneshot::Sender<Result<GenerationResult, CodeplanError>> {
        let (tx, rx) = oneshot::channel();
        self.completions
            .lock()
            .await
            .push_back(Completion::Deferred(rx));
        tx
    }

    /// Queues a stream that yields each line as its own chunk, then ends.
    pub async fn push_stream<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks = lines
            .into_iter()
            .map(|line| Ok(Bytes::from(line.into())))
            .collect();
        self.streams
            .lock()
            .await
            .push_back(ScriptedStream::Chunks(chunks));
    }

    /// Queues a stream that yields the lines and then a transport failure.
    pub async fn push_stream_then_error<I, S>(&self, lines: I, error: CodeplanError)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chunks: Vec<_> = lines
            .into_iter()
            .map(|line| Ok(Bytes::from(line.into())))
            .collect();
        chunks.push(Err(error));
        self.streams
            .lock()
            .await
            .push_back(ScriptedStream::Chunks(chunks));
    }

    /// Queues a stream driven by hand through the returned feeder.
    pub async fn push_fed_stream(&self) -> StreamFeeder {
        let (tx, rx) = mpsc::unbounded();
        self.streams.lock().await.push_back(ScriptedStream::Fed(rx));
        StreamFeeder { tx }
    }

    /// Queues a stream request that fails before any byte arrives.
    pub async fn push_stream_refusal(&self, error: CodeplanError) {
        self.streams
            .lock()
            .await
            .push_back(ScriptedStream::Refused(error));
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }

    async fn record(&self, request: GenerationRequest) {
        self.requests.lock().await.push(request);
    }
}

fn default_result() -> GenerationResult {
    GenerationResult {
        success: true,
        message: "mock response".to_string(),
        ..GenerationResult::default()
    }
}

#[async_trait]
impl GenerationTransport for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    async fn complete(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, CodeplanError> {
        self.record(request).await;
        let next = self.completions.lock().await.pop_front();
        match next {
            Some(Completion::Ready(result)) => result,
            Some(Completion::Deferred(rx)) => rx.await.unwrap_or_else(|_| {
                Err(CodeplanError::Transport {
                    message: "deferred completion dropped".to_string(),
                    source: None,
                })
            }),
            None => Ok(default_result()),
        }
    }

    async fn stream(&self, request: GenerationRequest) -> Result<ByteStream, CodeplanError> {
        self.record(request).await;
        let next = self.streams.lock().await.pop_front();
        match next {
            Some(ScriptedStream::Chunks(chunks)) => Ok(Box::pin(stream::iter(chunks))),
            Some(ScriptedStream::Fed(rx)) => Ok(Box::pin(rx)),
            Some(ScriptedStream::Refused(error)) => Err(error),
            None => {
                let chunks = vec![
                    Ok(Bytes::from(wire::content("mock response"))),
                    Ok(Bytes::from(wire::DONE)),
                ];
                Ok(Box::pin(stream::iter(chunks)))
            }
        }
    }
}
