//! Incremental splitting of the device byte stream into text lines.
//!
//! The lock firmware terminates telegrams with `\r\n`. Lines are cut at `\n`;
//! the remaining `\r` is whitespace and disappears when the reader trims the
//! line. Bytes after the last terminator stay buffered until the next push.

/// One line as received, without its `\n`, decoded as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub text: String,
    /// The bytes were not valid UTF-8 and were decoded lossily.
    pub lossy: bool,
}

impl RawLine {
    fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(s) => Self { text: s.to_string(), lossy: false },
            Err(_) => Self { text: String::from_utf8_lossy(bytes).into_owned(), lossy: true },
        }
    }
}

pub struct LineFramer {
    buffer: Vec<u8>,
    max_line_len: usize,
    trims: u64,
    /// Inside an oversized line; everything up to the next `\n` is dropped.
    discarding: bool,
}

impl LineFramer {
    pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

    pub fn new() -> Self {
        Self::with_max_line_len(Self::DEFAULT_MAX_LINE_LEN)
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            max_line_len: max_line_len.max(1),
            trims: 0,
            discarding: false,
        }
    }

    /// Feed a chunk and collect every line it completes, in arrival order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<RawLine> {
        let mut lines = Vec::new();

        for &b in bytes {
            if b == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else {
                    lines.push(RawLine::from_bytes(&self.buffer));
                }
                self.buffer.clear();
                continue;
            }
            if self.discarding {
                continue;
            }
            self.buffer.push(b);
            if self.buffer.len() > self.max_line_len {
                // No terminator in sight; drop the rest of this line and resync on the next '\n'
                log::warn!(
                    "Discarding {} bytes of unterminated input",
                    self.buffer.len()
                );
                self.buffer.clear();
                self.discarding = true;
                self.trims += 1;
            }
        }

        lines
    }

    /// Number of partial lines discarded for exceeding the length limit.
    pub fn trims(&self) -> u64 {
        self.trims
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}
