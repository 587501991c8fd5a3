// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming protocol support for the Codeplan generation backend.
//!
//! The backend answers a streaming request with one event per line,
//! `data: <json>\n`, terminated by `data: [DONE]`. This crate provides:
//!
//! - [`frame`]: the tagged frame enum and single-line parsing
//! - [`decoder`]: an incremental byte-to-line decoder
//! - [`reader`]: the cancellable read loop that feeds a [`FrameSink`]
//! - [`client`]: the `reqwest` implementation of `GenerationTransport`

pub mod client;
pub mod decoder;
pub mod frame;
pub mod reader;

pub use client::HttpTransport;
pub use decoder::LineDecoder;
pub use frame::{Frame, Line, parse_line};
pub use reader::{FrameSink, NoopSink, ReadOutcome, read_stream};
