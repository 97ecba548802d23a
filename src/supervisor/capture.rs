//! Bounded tail of an attempt's combined output.
//!
//! The log sink only keeps the last N lines across all jobs, so failure
//! classification works from its own capture of the current attempt. Memory
//! is bounded by keeping only the most recent bytes.

/// Bytes of combined output kept for classification.
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Combined stdout+stderr text of one attempt, tail-truncated.
#[derive(Debug, Clone)]
pub struct OutputTail {
    buf: String,
    max_bytes: usize,
}

impl OutputTail {
    pub fn new() -> Self {
        Self::with_limit(MAX_CAPTURE_BYTES)
    }

    pub fn with_limit(max_bytes: usize) -> Self {
        OutputTail {
            buf: String::new(),
            max_bytes: max_bytes.max(1),
        }
    }

    /// Append text, dropping the oldest bytes once over the limit.
    ///
    /// Truncation only happens once the buffer reaches twice the limit, so
    /// the drain cost is amortized over many appends.
    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
        if self.buf.len() > self.max_bytes * 2 {
            self.truncate_to_limit();
        }
    }

    /// The captured text, at most `max_bytes` long.
    pub fn as_str(&self) -> &str {
        let len = self.buf.len();
        if len <= self.max_bytes {
            return &self.buf;
        }
        let start = char_boundary_at_or_after(&self.buf, len - self.max_bytes);
        &self.buf[start..]
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    fn truncate_to_limit(&mut self) {
        let keep_from = char_boundary_at_or_after(&self.buf, self.buf.len() - self.max_bytes);
        self.buf.drain(..keep_from);
    }
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new()
    }
}

fn char_boundary_at_or_after(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}
