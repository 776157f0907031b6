//! Incremental statement buffering for streaming input.
//!
//! Interactive hosts feed input line by line; a statement is only parseable
//! once a `;` terminator arrives. [`FragmentBuffer`] accumulates chunks and
//! yields parsed statements as terminators complete them, retaining any
//! unterminated tail. This is purely a buffering concern; each call either
//! completes statements (clearing their text) or extends the buffer, and
//! returns immediately.

use super::ast::Statement;
use super::parser::parse;
use crate::error::ParseError;

/// Accumulates query text across calls until terminators make it parseable.
#[derive(Debug, Default)]
pub struct FragmentBuffer {
    buffer: String,
}

impl FragmentBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of input.
    ///
    /// Returns the statements completed by this chunk (possibly none). On a
    /// parse error the whole buffer is discarded so the next chunk starts
    /// clean; the error's offset points into the text that was buffered.
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<Statement>, ParseError> {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(chunk);

        let Some(end) = last_terminator(&self.buffer) else {
            return Ok(Vec::new());
        };
        let complete = self.buffer[..=end].to_owned();
        let rest = self.buffer[end + 1..].trim_start().to_owned();

        match parse(&complete) {
            Ok(statements) => {
                self.buffer = rest;
                Ok(statements)
            }
            Err(err) => {
                self.buffer.clear();
                Err(err)
            }
        }
    }

    /// The unterminated text still waiting for a terminator, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&str> {
        let trimmed = self.buffer.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    /// Discard any buffered text.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Find the byte offset of the last `;` that is outside quoted strings and
/// comments.
fn last_terminator(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut last = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b';' => last = Some(i),
            _ => {}
        }
        i += 1;
    }
    last
}
