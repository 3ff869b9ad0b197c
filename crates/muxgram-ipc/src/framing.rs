//! Incremental newline framing for the NDJSON stream.

/// Hard cap on a single frame; a client writing an unbounded line without a
/// newline must not grow the buffer forever.
const DEFAULT_MAX_LINE: usize = 1024 * 1024;

/// Accumulates raw reads and yields complete lines.
///
/// A line held across a partial read is completed by the next `push`; an
/// oversized line is discarded up to its terminating newline and framing
/// resumes with the next line.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_line: usize,
    discarding: bool,
    /// How many oversized lines have been dropped (for diagnostics).
    dropped: u64,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

impl LineFramer {
    /// Create a framer with the given per-line byte cap.
    #[must_use]
    pub fn new(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line,
            discarding: false,
            dropped: 0,
        }
    }

    /// Feed raw bytes; returns the lines completed by this read, without
    /// their terminators. Empty lines are skipped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else if !self.buf.is_empty() {
                    let line = String::from_utf8_lossy(&self.buf).into_owned();
                    if !line.trim().is_empty() {
                        lines.push(line);
                    }
                }
                self.buf.clear();
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.buf.len() >= self.max_line {
                self.buf.clear();
                self.discarding = true;
                self.dropped = self.dropped.saturating_add(1);
                continue;
            }
            self.buf.push(byte);
        }
        lines
    }

    /// How many oversized lines have been discarded so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
