// crates/core/src/frame.rs
//! Incremental frame reassembly for chunked event streams.
//!
//! Bytes arrive in arbitrary chunks; a [`FrameDecoder`] keeps whatever has not
//! yet formed a complete frame and hands back only whole frames. Delimiters are
//! ASCII, so cutting on them never splits a multi-byte UTF-8 sequence: a
//! character torn across two chunks simply waits in the buffer until its
//! remaining bytes arrive.
//!
//! Two framings are supported:
//! - [`Framing::Block`]: frames end at a blank line (`\n\n`, `\r\n\r\n` or a
//!   mix). Only `data:` lines carry payload; several `data:` lines in one
//!   frame are joined with `\n`. Frames without payload (keep-alives,
//!   comments) are dropped.
//! - [`Framing::Line`]: every non-blank line is a frame.

use memchr::memchr;

/// How frames are delimited inside the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Block,
    Line,
}

/// Carry-over buffer plus framing rules.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buf: Vec::new(),
        }
    }

    /// Decoder for blank-line separated `data:` blocks.
    pub fn block() -> Self {
        Self::new(Framing::Block)
    }

    /// Decoder for newline-delimited payloads.
    pub fn line() -> Self {
        Self::new(Framing::Line)
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Bytes held back because they do not form a complete frame yet.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Append `chunk` and return every frame it completed, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        match self.framing {
            Framing::Block => {
                while let Some((end, next)) = find_block_boundary(&self.buf, consumed) {
                    if let Some(payload) = block_payload(&self.buf[consumed..end]) {
                        frames.push(payload);
                    }
                    consumed = next;
                }
            }
            Framing::Line => {
                while let Some(rel) = memchr(b'\n', &self.buf[consumed..]) {
                    let end = consumed + rel;
                    if let Some(line) = line_payload(&self.buf[consumed..end]) {
                        frames.push(line);
                    }
                    consumed = end + 1;
                }
            }
        }

        self.buf.drain(..consumed);
        frames
    }

    /// End of stream: whatever is still buffered is processed exactly once,
    /// even without a trailing delimiter.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buf);
        match self.framing {
            Framing::Block => block_payload(&rest).into_iter().collect(),
            Framing::Line => rest
                .split(|&b| b == b'\n')
                .filter_map(line_payload)
                .collect(),
        }
    }

    /// Drop any partially received frame (used on cancellation).
    /// Returns the number of bytes thrown away.
    pub fn discard(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        dropped
    }
}

/// Find the first blank-line delimiter at or after `from`.
///
/// Returns `(frame_end, next_frame_start)`. A `\n` whose follow-up bytes have
/// not arrived yet is not treated as a delimiter; the next `push` rescans it.
fn find_block_boundary(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut search = from;
    while let Some(rel) = memchr(b'\n', &buf[search..]) {
        let nl = search + rel;
        match buf.get(nl + 1) {
            Some(b'\n') => return Some((nl, nl + 2)),
            Some(b'\r') if buf.get(nl + 2) == Some(&b'\n') => return Some((nl, nl + 3)),
            _ => search = nl + 1,
        }
    }
    None
}

fn block_payload(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let data_lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();
    let joined = data_lines.join("\n");
    let payload = joined.trim();
    (!payload.is_empty()).then(|| payload.to_string())
}

fn line_payload(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    (!line.is_empty()).then(|| line.to_string())
}
