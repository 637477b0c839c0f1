//! Decoder for the engine's multiplexed stdout/stderr log stream.
//!
//! Wire format, repeated: an 8-byte header `[stream, 0, 0, 0, len_be32]`
//! followed by `len` payload bytes. Stream `1` is stdout and `2` is stderr.
//!
//! Bytes may arrive in arbitrary chunks. Incomplete trailing frames stay
//! buffered until the rest arrives, so the decoded lines never depend on
//! where the chunk boundaries fall. An unknown stream byte is fatal for the
//! decoder: it does not scan forward looking for the next plausible header.

use std::collections::VecDeque;

use crate::error::ProtocolError;
use crate::model::{LogLine, LogStream};

pub const HEADER_LEN: usize = 8;

/// One decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFrame {
    pub stream: LogStream,
    pub payload: Vec<u8>,
}

impl LogFrame {
    /// Non-empty lines of the payload with trailing whitespace trimmed.
    pub fn lines(&self) -> impl Iterator<Item = LogLine> + '_ {
        let stream = self.stream;
        split_lines(&self.payload).map(move |text| LogLine::new(stream, text))
    }
}

#[derive(Debug, Default)]
pub struct LogStreamDecoder {
    buf: Vec<u8>,
    start: usize,                   // first unconsumed byte in `buf`
    consumed: u64,                  // absolute offset of `buf[start]`
    failed: Option<ProtocolError>,
}

impl LogStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer another chunk of the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.start > 0 && self.start >= self.buf.len() / 2 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet part of a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Next complete frame, `Ok(None)` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<LogFrame>, ProtocolError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        let avail = &self.buf[self.start..];
        if avail.len() < HEADER_LEN {
            return Ok(None);
        }

        let stream = match avail[0] {
            1 => LogStream::Stdout,
            2 => LogStream::Stderr,
            tag => {
                let err = ProtocolError::UnknownStream { tag, offset: self.consumed };
                self.failed = Some(err.clone());
                return Err(err);
            }
        };
        let len = u32::from_be_bytes([avail[4], avail[5], avail[6], avail[7]]) as usize;
        if avail.len() < HEADER_LEN + len {
            return Ok(None);
        }

        let payload = avail[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.start += HEADER_LEN + len;
        self.consumed += (HEADER_LEN + len) as u64;
        Ok(Some(LogFrame { stream, payload }))
    }

    /// Lazily yields the lines of every complete frame buffered so far, in
    /// wire order. Calling it again after `push` resumes where it stopped.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { decoder: self, pending: VecDeque::new(), done: false }
    }

    /// Push a chunk and collect all lines it completes.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<LogLine>, ProtocolError> {
        self.push(chunk);
        self.lines().collect()
    }
}

pub struct Lines<'a> {
    decoder: &'a mut LogStreamDecoder,
    pending: VecDeque<LogLine>,
    done: bool,
}

impl Iterator for Lines<'_> {
    type Item = Result<LogLine, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            if self.done {
                return None;
            }
            match self.decoder.next_frame() {
                Ok(Some(frame)) => self.pending.extend(frame.lines()),
                Ok(None) => return None,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Whether a log response body is framed, judging by its content type.
/// Raw streams (TTY containers, plain-text engines) are not.
pub fn is_multiplexed(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else { return true };
    let ct = ct.trim().to_ascii_lowercase();
    !(ct.starts_with("application/vnd.docker.raw-stream") || ct.starts_with("text/plain"))
}

/// Lines of an unframed body, attributed to stdout.
pub fn plain_lines(body: &[u8]) -> Vec<LogLine> {
    split_lines(body).map(|t| LogLine::new(LogStream::Stdout, t)).collect()
}

fn split_lines(payload: &[u8]) -> impl Iterator<Item = String> + '_ {
    payload
        .split(|b| *b == b'\n')
        .map(|raw| String::from_utf8_lossy(raw).trim_end().to_string())
        .filter(|line| !line.is_empty())
}
