// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The cancellable protocol read loop.
//!
//! [`read_stream`] pulls chunks from a transport byte stream, splits them into
//! lines, and applies each frame in arrival order. Cancellation is checked
//! before every chunk and every line: anything read before the token fired
//! stays applied, nothing after it is.

use bytes::BytesMut;
use codeplan_core::CodeplanError;
use codeplan_core::traits::ByteStream;
use codeplan_core::types::{GenerationProgress, GenerationResult};
use futures::StreamExt;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decoder::LineDecoder;
use crate::frame::{self, Frame, Line};

/// Receives frames as they are applied.
pub trait FrameSink: Send {
    /// A content fragment, in arrival order.
    fn on_content(&mut self, fragment: &str) -> Result<(), CodeplanError>;

    /// A progress update that replaces the previous one.
    fn on_progress(&mut self, progress: GenerationProgress) -> Result<(), CodeplanError>;
}

/// Sink that discards everything; the outcome still carries the content.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl FrameSink for NoopSink {
    fn on_content(&mut self, _fragment: &str) -> Result<(), CodeplanError> {
        Ok(())
    }

    fn on_progress(&mut self, _progress: GenerationProgress) -> Result<(), CodeplanError> {
        Ok(())
    }
}

/// How a read ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// `[DONE]` or end of stream.
    Completed {
        content: String,
        result: Option<GenerationResult>,
    },
    /// The token fired. `content` holds what was applied before it did.
    Cancelled { content: String },
}

impl ReadOutcome {
    pub fn content(&self) -> &str {
        match self {
            Self::Completed { content, .. } | Self::Cancelled { content } => content,
        }
    }
}

enum Flow {
    Continue,
    Done,
}

struct ReadState<'a, S: ?Sized> {
    sink: &'a mut S,
    content: String,
    result: Option<GenerationResult>,
}

impl<S: FrameSink + ?Sized> ReadState<'_, S> {
    fn apply(&mut self, line: &str) -> Result<Flow, CodeplanError> {
        match frame::parse_line(line) {
            Line::Ignored => Ok(Flow::Continue),
            Line::Done => {
                debug!("protocol terminator received");
                Ok(Flow::Done)
            }
            Line::Malformed(reason) => {
                debug!(%reason, "skipping malformed data line");
                Ok(Flow::Continue)
            }
            Line::Frame(frame) => {
                debug!(kind = frame.kind(), "frame received");
                match frame {
                    Frame::Content { content } => {
                        self.content.push_str(&content);
                        self.sink.on_content(&content)?;
                    }
                    Frame::Progress {
                        step,
                        progress,
                        message,
                        current_file,
                    } => {
                        self.sink.on_progress(frame::progress_from_frame(
                            &step,
                            progress,
                            &message,
                            current_file.as_deref(),
                        ))?;
                    }
                    Frame::Result { data } => self.result = Some(data),
                    Frame::Error { message } => return Err(CodeplanError::Protocol { message }),
                }
                Ok(Flow::Continue)
            }
        }
    }

    fn completed(self) -> ReadOutcome {
        ReadOutcome::Completed {
            content: self.content,
            result: self.result,
        }
    }

    fn cancelled(self) -> ReadOutcome {
        debug!(applied = self.content.len(), "read cancelled");
        ReadOutcome::Cancelled {
            content: self.content,
        }
    }
}

/// Drives `stream` to completion, cancellation, or the first error.
///
/// An `error` frame ends the read with [`CodeplanError::Protocol`]; a failed
/// chunk ends it with the transport's error. A trailing line without a newline
/// is still applied at end of stream.
pub async fn read_stream<S>(
    mut stream: ByteStream,
    token: &CancellationToken,
    sink: &mut S,
) -> Result<ReadOutcome, CodeplanError>
where
    S: FrameSink + ?Sized,
{
    let mut decoder = LineDecoder::new();
    let mut buf = BytesMut::new();
    let mut state = ReadState {
        sink,
        content: String::new(),
        result: None,
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(state.cancelled()),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                buf.extend_from_slice(&chunk);
                while let Some(line) = decoder.decode(&mut buf)? {
                    if token.is_cancelled() {
                        return Ok(state.cancelled());
                    }
                    if let Flow::Done = state.apply(&line)? {
                        return Ok(state.completed());
                    }
                }
            }
            Some(Err(e)) => return Err(e),
            None => {
                while let Some(line) = decoder.decode_eof(&mut buf)? {
                    if token.is_cancelled() {
                        return Ok(state.cancelled());
                    }
                    if let Flow::Done = state.apply(&line)? {
                        break;
                    }
                }
                return Ok(state.completed());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use codeplan_test_utils::wire;
    use futures::stream;
    use proptest::prelude::*;

    #[derive(Default)]
    struct Recorder {
        fragments: Vec<String>,
        progress: Vec<GenerationProgress>,
    }

    impl FrameSink for Recorder {
        fn on_content(&mut self, fragment: &str) -> Result<(), CodeplanError> {
            self.fragments.push(fragment.to_string());
            Ok(())
        }

        fn on_progress(&mut self, progress: GenerationProgress) -> Result<(), CodeplanError> {
            self.progress.push(progress);
            Ok(())
        }
    }

    fn byte_stream<I, S>(chunks: I) -> ByteStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks: Vec<Result<Bytes, CodeplanError>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::from(c.into())))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn content_frames_accumulate_in_order() {
        let stream = byte_stream([
            wire::content("Sure, "),
            wire::content("adding it now."),
            wire::DONE.to_string(),
        ]);
        let mut sink = Recorder::default();
        let outcome = read_stream(stream, &CancellationToken::new(), &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.content(), "Sure, adding it now.");
        assert_eq!(sink.fragments, vec!["Sure, ", "adding it now."]);
    }

    #[tokio::test]
    async fn frames_split_across_chunks() {
        let line = wire::content("split");
        let (a, b) = line.split_at(10);
        let stream = byte_stream([a.to_string(), b.to_string()]);
        let outcome = read_stream(stream, &CancellationToken::new(), &mut NoopSink)
            .await
            .unwrap();
        assert_eq!(outcome.content(), "split");
    }

    #[tokio::test]
    async fn reader_stops_at_done() {
        let stream = byte_stream([
            wire::content("kept"),
            wire::DONE.to_string(),
            wire::content("after done"),
        ]);
        let mut sink = Recorder::default();
        let outcome = read_stream(stream, &CancellationToken::new(), &mut sink)
            .await
            .unwrap();
        assert_eq!(outcome.content(), "kept");
        assert_eq!(sink.fragments.len(), 1);
    }

    #[tokio::test]
    async fn result_frame_is_captured() {
        let result = GenerationResult {
            success: true,
            message: "Created 1 file".into(),
            ..Default::default()
        };
        let stream = byte_stream([wire::result(&result), wire::DONE.to_string()]);
        let outcome = read_stream(stream, &CancellationToken::new(), &mut NoopSink)
            .await
            .unwrap();
        match outcome {
            ReadOutcome::Completed {
                result: Some(got), ..
            } => assert_eq!(got, result),
            other => panic!("expected captured result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn progress_frames_reach_the_sink() {
        let stream = byte_stream([
            wire::progress("planning", 10, "Planning"),
            wire::progress_on_file("writing", 60, "Writing", "src/main.rs"),
        ]);
        let mut sink = Recorder::default();
        read_stream(stream, &CancellationToken::new(), &mut sink)
            .await
            .unwrap();
        assert_eq!(sink.progress.len(), 2);
        assert_eq!(sink.progress[1].progress, 60);
        assert_eq!(sink.progress[1].current_file.as_deref(), Some("src/main.rs"));
    }

    #[tokio::test]
    async fn error_frame_is_terminal() {
        let stream = byte_stream([
            wire::content("partial"),
            wire::error("model overloaded"),
            wire::content("never applied"),
        ]);
        let mut sink = Recorder::default();
        let err = read_stream(stream, &CancellationToken::new(), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodeplanError::Protocol { ref message } if message == "model overloaded"
        ));
        assert_eq!(sink.fragments, vec!["partial"]);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn malformed_and_foreign_lines_are_skipped() {
        let stream = byte_stream([
            ": keep-alive\n".to_string(),
            "event: content\n".to_string(),
            "data: {broken\n".to_string(),
            "\n".to_string(),
            wire::content("ok"),
        ]);
        let outcome = read_stream(stream, &CancellationToken::new(), &mut NoopSink)
            .await
            .unwrap();
        assert_eq!(outcome.content(), "ok");
        assert!(logs_contain("skipping malformed data line"));
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_applied() {
        let stream = byte_stream([
            wire::content("a"),
            r#"data: {"type":"content","content":"b"}"#.to_string(),
        ]);
        let outcome = read_stream(stream, &CancellationToken::new(), &mut NoopSink)
            .await
            .unwrap();
        assert_eq!(outcome.content(), "ab");
    }

    #[tokio::test]
    async fn transport_failure_mid_stream_propagates() {
        let chunks: Vec<Result<Bytes, CodeplanError>> = vec![
            Ok(Bytes::from(wire::content("half"))),
            Err(CodeplanError::Transport {
                message: "connection reset".into(),
                source: None,
            }),
        ];
        let err = read_stream(
            Box::pin(stream::iter(chunks)),
            &CancellationToken::new(),
            &mut NoopSink,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CodeplanError::Transport { .. }));
    }

    /// Cancels the token once it has seen `after` fragments.
    struct CancelAfter {
        token: CancellationToken,
        after: usize,
        fragments: Vec<String>,
    }

    impl FrameSink for CancelAfter {
        fn on_content(&mut self, fragment: &str) -> Result<(), CodeplanError> {
            self.fragments.push(fragment.to_string());
            if self.fragments.len() == self.after {
                self.token.cancel();
            }
            Ok(())
        }

        fn on_progress(&mut self, _progress: GenerationProgress) -> Result<(), CodeplanError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn nothing_is_applied_after_cancellation() {
        let token = CancellationToken::new();
        let mut sink = CancelAfter {
            token: token.clone(),
            after: 2,
            fragments: Vec::new(),
        };
        let result = GenerationResult {
            success: true,
            ..Default::default()
        };
        let stream = byte_stream([
            wire::content("one "),
            wire::content("two "),
            wire::content("three "),
            wire::result(&result),
            wire::DONE.to_string(),
        ]);

        let outcome = read_stream(stream, &token, &mut sink).await.unwrap();
        assert_eq!(
            outcome,
            ReadOutcome::Cancelled {
                content: "one two ".into()
            }
        );
        assert_eq!(sink.fragments, vec!["one ", "two "]);
    }

    #[tokio::test]
    async fn cancellation_within_one_chunk_stops_at_the_next_line() {
        let token = CancellationToken::new();
        let mut sink = CancelAfter {
            token: token.clone(),
            after: 1,
            fragments: Vec::new(),
        };
        let chunk = format!("{}{}", wire::content("first"), wire::content("second"));
        let outcome = read_stream(byte_stream([chunk]), &token, &mut sink)
            .await
            .unwrap();
        assert_eq!(outcome.content(), "first");
    }

    #[tokio::test]
    async fn token_cancelled_up_front_reads_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let stream = byte_stream([wire::content("ignored")]);
        let outcome = read_stream(stream, &token, &mut NoopSink).await.unwrap();
        assert_eq!(
            outcome,
            ReadOutcome::Cancelled {
                content: String::new()
            }
        );
    }

    proptest! {
        #[test]
        fn content_order_is_preserved(fragments in proptest::collection::vec("[a-zA-Z0-9 .,!]{0,10}", 0..20)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let mut lines: Vec<String> = fragments.iter().map(|f| wire::content(f)).collect();
            lines.push(wire::DONE.to_string());
            let mut sink = Recorder::default();
            let outcome = rt
                .block_on(read_stream(byte_stream(lines), &CancellationToken::new(), &mut sink))
                .unwrap();
            prop_assert_eq!(outcome.content(), fragments.concat());
            prop_assert_eq!(sink.fragments, fragments);
        }
    }
}
