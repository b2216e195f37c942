//! Reassembly of the device's diagnostic text stream into log lines.
//!
//! The device writes newline-terminated text on the same serial link that
//! carries frames towards it.  Reads return arbitrary chunks, so a line may be
//! split across many reads or several lines may arrive in one read.
//! [`LineAssembler`] buffers bytes until a line feed arrives and hands each
//! complete line to a callback.
//!
//! # Memory bound
//!
//! A device that never sends a line feed must not grow the buffer without
//! limit.  When a line reaches [`MAX_LOG_LINE_BYTES`] the buffered bytes are
//! emitted as a line of their own, followed by a single
//! [`LogEvent::Truncated`].  Accumulation then continues for the rest of the
//! over-long line; further cap-sized chunks are emitted without repeating the
//! warning until the next line feed ends the truncated line.

/// Upper bound on the bytes buffered for one line.
pub const MAX_LOG_LINE_BYTES: usize = 16384;

/// Output of the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// A complete (or cap-sized) line with trailing carriage returns removed.
    Line(String),
    /// The current line hit the byte cap.  Emitted once per over-long line.
    Truncated { max_bytes: usize },
}

/// Bounded line accumulator.
#[derive(Debug)]
pub struct LineAssembler {
    buffer: Vec<u8>,
    truncated: bool,
    max_bytes: usize,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAssembler {
    /// Creates an assembler with the standard [`MAX_LOG_LINE_BYTES`] cap.
    pub fn new() -> Self {
        Self::with_limit(MAX_LOG_LINE_BYTES)
    }

    /// Creates an assembler with a custom cap.  A cap of zero is raised to one.
    pub fn with_limit(max_bytes: usize) -> Self {
        let max_bytes = max_bytes.max(1);
        Self {
            buffer: Vec::with_capacity(max_bytes.min(1024)),
            truncated: false,
            max_bytes,
        }
    }

    /// Bytes received since the last emitted line.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns `true` while the current line is past the cap.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Consumes one chunk of raw bytes, calling `emit` for every event.
    pub fn feed<F>(&mut self, mut data: &[u8], mut emit: F)
    where
        F: FnMut(LogEvent),
    {
        while !data.is_empty() {
            match data.iter().position(|&b| b == b'\n') {
                Some(index) => {
                    self.append(&data[..index], &mut emit);
                    self.flush_line(&mut emit);
                    self.truncated = false;
                    data = &data[index + 1..];
                }
                None => {
                    self.append(data, &mut emit);
                    return;
                }
            }
        }
    }

    fn append<F>(&mut self, mut data: &[u8], emit: &mut F)
    where
        F: FnMut(LogEvent),
    {
        while !data.is_empty() {
            let space = self.max_bytes - self.buffer.len();
            if space == 0 {
                self.flush_truncated(emit);
                continue;
            }
            let take = space.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buffer.len() == self.max_bytes {
                self.flush_truncated(emit);
            }
        }
    }

    fn flush_truncated<F>(&mut self, emit: &mut F)
    where
        F: FnMut(LogEvent),
    {
        self.flush_line(emit);
        if !self.truncated {
            emit(LogEvent::Truncated {
                max_bytes: self.max_bytes,
            });
            self.truncated = true;
        }
    }

    fn flush_line<F>(&mut self, emit: &mut F)
    where
        F: FnMut(LogEvent),
    {
        if !self.buffer.is_empty() {
            let text = String::from_utf8_lossy(&self.buffer);
            let text = text.trim_end_matches('\r');
            if !text.is_empty() {
                emit(LogEvent::Line(text.to_string()));
            }
        }
        self.buffer.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
