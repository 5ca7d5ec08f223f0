use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of retained lines per project.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Longest line kept as one entry. A partial line reaching this size is
/// emitted as is and the rest continues as a new line.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub sequence: u64,
    pub stream: LogStream,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Bounded capture of a process's combined output.
///
/// Chunks are split on `\n`; an unterminated tail is held per stream until the
/// rest of the line arrives or [`LogBuffer::flush`] is called, and never grows
/// past [`MAX_LINE_BYTES`]. Once more than `capacity` lines are stored the
/// oldest are dropped.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    next_sequence: u64,
    lines: VecDeque<LogLine>,
    pending_stdout: Vec<u8>,
    pending_stderr: Vec<u8>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            next_sequence: 1,
            lines: VecDeque::with_capacity(capacity),
            pending_stdout: Vec::new(),
            pending_stderr: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Append a raw output chunk, emitting every completed line.
    ///
    /// Only the new chunk is scanned; the held partial never contains a newline.
    pub fn append(&mut self, stream: LogStream, chunk: &[u8]) {
        let mut pending = std::mem::take(self.pending_mut(stream));
        for piece in chunk.split_inclusive(|b| *b == b'\n') {
            let (mut body, complete) = match piece.strip_suffix(b"\n") {
                Some(body) => (body, true),
                None => (piece, false),
            };
            while pending.len() + body.len() > MAX_LINE_BYTES {
                let room = MAX_LINE_BYTES - pending.len();
                pending.extend_from_slice(&body[..room]);
                body = &body[room..];
                let text = decode_line(&pending);
                pending.clear();
                self.push(stream, text);
            }
            pending.extend_from_slice(body);
            if complete {
                let text = decode_line(&pending);
                pending.clear();
                self.push(stream, text);
            }
        }
        *self.pending_mut(stream) = pending;
    }

    /// Record a complete line that did not come from the process itself.
    pub fn push_line(&mut self, stream: LogStream, text: impl Into<String>) {
        self.push(stream, text.into());
    }

    /// Emit any held partial lines. Called once the process has exited.
    pub fn flush(&mut self) {
        for stream in [LogStream::Stdout, LogStream::Stderr] {
            let pending = std::mem::take(self.pending_mut(stream));
            if !pending.is_empty() {
                let text = decode_line(&pending);
                self.push(stream, text);
            }
        }
    }

    /// Drop retained lines and partials. The sequence counter keeps running so
    /// pollers holding a cursor never see numbers reused.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.pending_stdout.clear();
        self.pending_stderr.clear();
    }

    /// Point-in-time copy of the retained lines, oldest first.
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }

    /// Retained lines with a sequence number greater than `cursor`.
    pub fn lines_after(&self, cursor: u64) -> Vec<LogLine> {
        let skip = self.lines.partition_point(|line| line.sequence <= cursor);
        self.lines.iter().skip(skip).cloned().collect()
    }

    fn push(&mut self, stream: LogStream, text: String) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        self.lines.push_back(LogLine {
            sequence,
            stream,
            timestamp: Utc::now(),
            text,
        });
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    fn pending_mut(&mut self, stream: LogStream) -> &mut Vec<u8> {
        match stream {
            LogStream::Stdout => &mut self.pending_stdout,
            LogStream::Stderr => &mut self.pending_stderr,
        }
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(buffer: &LogBuffer) -> Vec<String> {
        buffer.snapshot().into_iter().map(|l| l.text).collect()
    }

    #[test]
    fn splits_chunks_on_newlines() {
        let mut buffer = LogBuffer::new(10);
        buffer.append(LogStream::Stdout, b"one\ntwo\r\nthree\n");
        assert_eq!(texts(&buffer), vec!["one", "two", "three"]);
    }

    #[test]
    fn partial_line_is_held_until_completed() {
        let mut buffer = LogBuffer::new(10);
        buffer.append(LogStream::Stdout, b"compil");
        assert!(buffer.is_empty());
        buffer.append(LogStream::Stdout, b"ing...");
        assert!(buffer.is_empty());
        buffer.append(LogStream::Stdout, b" done\nnext");
        assert_eq!(texts(&buffer), vec!["compiling... done"]);
    }

    #[test]
    fn partials_are_tracked_per_stream() {
        let mut buffer = LogBuffer::new(10);
        buffer.append(LogStream::Stdout, b"out-");
        buffer.append(LogStream::Stderr, b"err\n");
        buffer.append(LogStream::Stdout, b"line\n");
        let lines = buffer.snapshot();
        assert_eq!(lines[0].stream, LogStream::Stderr);
        assert_eq!(lines[0].text, "err");
        assert_eq!(lines[1].stream, LogStream::Stdout);
        assert_eq!(lines[1].text, "out-line");
    }

    #[test]
    fn flush_emits_trailing_partial() {
        let mut buffer = LogBuffer::new(10);
        buffer.append(LogStream::Stderr, b"no newline at end");
        buffer.flush();
        assert_eq!(texts(&buffer), vec!["no newline at end"]);
        buffer.flush();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn multibyte_characters_split_across_chunks() {
        let mut buffer = LogBuffer::new(10);
        let bytes = "➜ Local\n".as_bytes();
        buffer.append(LogStream::Stdout, &bytes[..2]);
        buffer.append(LogStream::Stdout, &bytes[2..]);
        assert_eq!(texts(&buffer), vec!["➜ Local"]);
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut buffer = LogBuffer::new(500);
        for i in 0..1200 {
            buffer.append(LogStream::Stdout, format!("line {}\n", i).as_bytes());
        }
        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 500);
        assert_eq!(lines[0].text, "line 700");
        assert_eq!(lines[499].text, "line 1199");
        for pair in lines.windows(2) {
            assert_eq!(pair[1].sequence, pair[0].sequence + 1);
        }
        assert_eq!(lines[0].sequence, 701);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut buffer = LogBuffer::new(10);
        buffer.append(LogStream::Stdout, b"a\n");
        let before = buffer.snapshot();
        buffer.append(LogStream::Stdout, b"b\n");
        assert_eq!(before.len(), 1);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn lines_after_cursor() {
        let mut buffer = LogBuffer::new(3);
        for i in 1..=5 {
            buffer.append(LogStream::Stdout, format!("{}\n", i).as_bytes());
        }
        // Retained: sequences 3, 4, 5.
        let after = buffer.lines_after(3);
        assert_eq!(after.iter().map(|l| l.sequence).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(buffer.lines_after(0).len(), 3);
        assert!(buffer.lines_after(5).is_empty());
    }

    #[test]
    fn clear_keeps_sequence_running() {
        let mut buffer = LogBuffer::new(10);
        buffer.append(LogStream::Stdout, b"a\nb\n");
        buffer.append(LogStream::Stdout, b"partial");
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.push_line(LogStream::Stderr, "fresh");
        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].sequence, 3);
        assert_eq!(lines[0].text, "fresh");
    }

    #[test]
    fn unterminated_output_is_split_at_line_limit() {
        let mut buffer = LogBuffer::new(10);
        let chunk = vec![b'x'; 8 * 1024];
        // 4 MiB without a single newline, fed the way a reader delivers it.
        for _ in 0..512 {
            buffer.append(LogStream::Stdout, &chunk);
            assert!(buffer.pending_stdout.len() <= MAX_LINE_BYTES);
        }
        assert_eq!(buffer.len(), 10);
        assert!(buffer.snapshot().iter().all(|l| l.text.len() == MAX_LINE_BYTES));
        // The last full block is still held: it could yet be followed by a newline.
        assert_eq!(buffer.pending_stdout.len(), MAX_LINE_BYTES);
        assert_eq!(buffer.snapshot().last().unwrap().sequence, 63);

        buffer.append(LogStream::Stdout, b"tail\n");
        let lines = buffer.snapshot();
        assert_eq!(lines[8].sequence, 64);
        assert_eq!(lines[8].text.len(), MAX_LINE_BYTES);
        assert_eq!(lines[9].text, "tail");
        assert!(buffer.pending_stdout.is_empty());
    }

    #[test]
    fn long_line_split_keeps_remainder() {
        let mut buffer = LogBuffer::new(10);
        let mut chunk = vec![b'a'; MAX_LINE_BYTES + 5];
        chunk.extend_from_slice(b"\nnext");
        buffer.append(LogStream::Stderr, &chunk);
        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text.len(), MAX_LINE_BYTES);
        assert_eq!(lines[1].text, "aaaaa");
        buffer.flush();
        assert_eq!(buffer.snapshot().last().unwrap().text, "next");
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let buffer = LogBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
    }
}
