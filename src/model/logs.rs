use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        })
    }
}

/// One decoded, attributed line of container output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub stream: LogStream,
    pub text: String,
    /// Engine-side write time, present when the lines were requested with
    /// timestamps.
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogLine {
    pub fn new(stream: LogStream, text: impl Into<String>) -> Self {
        Self { stream, text: text.into(), timestamp: None }
    }

    /// Move a leading RFC 3339 timestamp (`<ts> <text>`) out of the text.
    /// Lines without one are returned unchanged.
    pub fn split_timestamp(self) -> Self {
        let parsed = self.text.split_once(' ').and_then(|(ts, rest)| {
            DateTime::parse_from_rfc3339(ts)
                .ok()
                .map(|ts| (ts.with_timezone(&Utc), rest.to_string()))
        });
        match parsed {
            Some((timestamp, text)) => Self { stream: self.stream, text, timestamp: Some(timestamp) },
            None => self,
        }
    }
}

/// Bounded tail of log lines. Oldest lines fall off the front.
#[derive(Clone, Debug)]
pub struct LogBuffer {
    lines: VecDeque<LogLine>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(5000)),
            capacity,
        }
    }

    pub fn push(&mut self, line: LogLine) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Append a freshly fetched tail window, skipping the lines already in the
    /// buffer. Returns how many lines were appended.
    ///
    /// Timestamped windows are merged by time: lines older than the newest
    /// buffered line are dropped, and at that exact instant only lines not yet
    /// buffered are kept. Otherwise the overlap is the longest suffix of the
    /// buffer equal to a prefix of `batch`, which cannot tell a repeated line
    /// from one already seen.
    pub fn merge_window(&mut self, batch: Vec<LogLine>) -> usize {
        match self.last_timestamp() {
            Some(cursor) if batch.iter().all(|l| l.timestamp.is_some()) => {
                self.merge_after(cursor, batch)
            }
            _ => self.merge_by_overlap(batch),
        }
    }

    /// Write time of the newest buffered line.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.lines.back().and_then(|l| l.timestamp)
    }

    fn merge_after(&mut self, cursor: DateTime<Utc>, batch: Vec<LogLine>) -> usize {
        let mut at_cursor: Vec<LogLine> = self
            .lines
            .iter()
            .rev()
            .take_while(|l| l.timestamp == Some(cursor))
            .cloned()
            .collect();

        let mut added = 0;
        for line in batch {
            match line.timestamp {
                Some(ts) if ts < cursor => continue,
                Some(ts) if ts == cursor => {
                    if let Some(pos) = at_cursor.iter().position(|seen| *seen == line) {
                        at_cursor.swap_remove(pos);
                        continue;
                    }
                }
                _ => {}
            }
            self.push(line);
            added += 1;
        }
        added
    }

    fn merge_by_overlap(&mut self, batch: Vec<LogLine>) -> usize {
        let overlap = self.overlap_with(&batch);
        let added = batch.len() - overlap;
        for line in batch.into_iter().skip(overlap) {
            self.push(line);
        }
        added
    }

    fn overlap_with(&self, batch: &[LogLine]) -> usize {
        let max = self.lines.len().min(batch.len());
        for k in (1..=max).rev() {
            let start = self.lines.len() - k;
            if self.lines.range(start..).zip(&batch[..k]).all(|(a, b)| a == b) {
                return k;
            }
        }
        0
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
