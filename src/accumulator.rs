//! Assembles raw bytes into newline-terminated entries.
//!
//! Each producer owns one accumulator. Bytes are buffered until a `\n` is
//! seen; the buffered bytes (terminator included) then become one [`Entry`].
//! A single `feed` may complete several entries when the input carries
//! several terminators, so completions are exposed as an iterator rather
//! than a single return value.

use crate::error::LogError;
use crate::ring::Entry;

const TERMINATOR: u8 = b'\n';

/// Per-producer scratch buffer for in-flight line assembly.
#[derive(Debug)]
pub struct WriteAccumulator {
    buffer: Vec<u8>,
    max_line_bytes: usize,
    /// Set after an unterminated overrun: the rest of that line, up to and
    /// including its terminator, is swallowed rather than assembled.
    discarding: bool,
}

impl WriteAccumulator {
    /// `max_line_bytes` caps the length of any single assembled line,
    /// terminator included. Lines that exceed it are abandoned in full, even
    /// when they span several feeds, without touching the ring.
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_bytes,
            discarding: false,
        }
    }

    /// Number of bytes buffered for the line currently being assembled.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds `input` and returns an iterator over the entries it completes.
    ///
    /// The iterator must be driven to exhaustion: the final unterminated tail
    /// of `input` is only buffered once every completed line before it has
    /// been yielded.
    pub fn feed<'a>(&'a mut self, input: &'a [u8]) -> Completions<'a> {
        Completions {
            accumulator: self,
            input,
        }
    }
}

/// Iterator over the entries completed by one `feed` call.
///
/// Yields `Err` for a line that overran the configured cap; the offending
/// line is dropped and iteration continues with the next terminator.
pub struct Completions<'a> {
    accumulator: &'a mut WriteAccumulator,
    input: &'a [u8],
}

impl Iterator for Completions<'_> {
    type Item = Result<Entry, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input.is_empty() {
            return None;
        }
        // A previous feed dropped an unterminated overrun; the remainder of
        // that line is not data and must never be assembled into an entry.
        if self.accumulator.discarding {
            match self.input.iter().position(|&b| b == TERMINATOR) {
                Some(nl) => {
                    let (_, rest) = self.input.split_at(nl + 1);
                    self.input = rest;
                    self.accumulator.discarding = false;
                    if self.input.is_empty() {
                        return None;
                    }
                }
                None => {
                    self.input = &[];
                    return None;
                }
            }
        }
        let limit = self.accumulator.max_line_bytes;
        match self.input.iter().position(|&b| b == TERMINATOR) {
            Some(nl) => {
                let (segment, rest) = self.input.split_at(nl + 1);
                self.input = rest;
                if self.accumulator.buffer.len() + segment.len() > limit {
                    self.accumulator.buffer.clear();
                    return Some(Err(LogError::OversizedWrite { limit }));
                }
                self.accumulator.buffer.extend_from_slice(segment);
                let data = std::mem::take(&mut self.accumulator.buffer);
                Some(Ok(Entry::new(data)))
            }
            None => {
                // No terminator yet: buffer the tail for the next feed.
                let segment = self.input;
                self.input = &[];
                if self.accumulator.buffer.len() + segment.len() > limit {
                    self.accumulator.buffer.clear();
                    self.accumulator.discarding = true;
                    return Some(Err(LogError::OversizedWrite { limit }));
                }
                self.accumulator.buffer.extend_from_slice(segment);
                None
            }
        }
    }
}
