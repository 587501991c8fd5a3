// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incremental newline decoder.
//!
//! Bytes are buffered until a `\n` arrives, so a multi-byte UTF-8 sequence
//! split across network chunks is decoded whole. Invalid UTF-8 is replaced
//! rather than rejected.

use bytes::{Buf, BytesMut};
use codeplan_core::CodeplanError;
use tokio_util::codec::Decoder;

/// Splits a byte buffer into lines, dropping the `\n` (and a preceding `\r`).
#[derive(Debug, Default, Clone)]
pub struct LineDecoder {
    // Bytes already scanned without finding a newline.
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_line(mut raw: BytesMut) -> String {
    if raw.last() == Some(&b'\r') {
        raw.truncate(raw.len() - 1);
    }
    match String::from_utf8(raw.to_vec()) {
        Ok(line) => line,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

impl Decoder for LineDecoder {
    type Item = String;
    type Error = CodeplanError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodeplanError> {
        let Some(offset) = buf[self.scanned..].iter().position(|b| *b == b'\n') else {
            self.scanned = buf.len();
            return Ok(None);
        };
        let newline = self.scanned + offset;
        self.scanned = 0;
        let raw = buf.split_to(newline);
        buf.advance(1);
        Ok(Some(to_line(raw)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodeplanError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.scanned = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let raw = buf.split_to(buf.len());
        Ok(Some(to_line(raw)))
    }
}
