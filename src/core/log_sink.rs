//! Bounded, ordered log of captured tool output.
//!
//! The sink is a FIFO ring buffer: once it holds `capacity` entries, every
//! new entry evicts the oldest one. Eviction is silent and expected under
//! sustained output. Entries carry a sequence number that keeps increasing
//! across evictions, which is what [`LogRef`] ranges point at.
//!
//! One writer (the job supervisor) and any number of readers share the sink
//! through an `Arc`. Every operation holds the lock only for the duration of
//! a copy, so the writer never waits on a slow reader.

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::util::fs::ensure_dir;

/// Default number of entries kept.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Severity class of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogClass {
    /// Tool standard output
    Stdout,
    /// Tool standard error
    Stderr,
    Info,
    Warning,
    Error,
}

impl LogClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogClass::Stdout => "stdout",
            LogClass::Stderr => "stderr",
            LogClass::Info => "info",
            LogClass::Warning => "warning",
            LogClass::Error => "error",
        }
    }
}

impl fmt::Display for LogClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of captured or synthetic output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Position in the sink's lifetime, never reused
    pub seq: u64,
    pub text: String,
    pub class: LogClass,
    /// Capture time, not the tool-reported time
    pub timestamp: DateTime<Local>,
}

impl LogEntry {
    /// Format as a persisted log line.
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.class,
            self.text
        )
    }
}

/// A range of sequence numbers belonging to one job.
///
/// Entries in the range may since have been evicted; [`LogSink::range`]
/// returns whatever is still buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogRef {
    pub job_id: u64,
    /// First sequence number written for the job
    pub first_seq: u64,
    /// One past the last sequence number written for the job
    pub end_seq: u64,
}

impl LogRef {
    /// Number of lines the job produced, evicted ones included.
    pub fn len(&self) -> u64 {
        self.end_seq.saturating_sub(self.first_seq)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct Ring {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
}

/// Fixed-capacity log buffer.
#[derive(Debug)]
pub struct LogSink {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl LogSink {
    /// Create a sink holding [`DEFAULT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a sink with a custom capacity (at least one entry).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        LogSink {
            capacity,
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                next_seq: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.ring.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence number the next appended entry will get.
    pub fn next_seq(&self) -> u64 {
        self.ring.lock().next_seq
    }

    /// Append a chunk of text, one entry per non-empty line.
    ///
    /// Returns the entries that were appended, for forwarding to subscribers.
    pub fn append(&self, text: &str, class: LogClass) -> Vec<LogEntry> {
        let lines: Vec<&str> = split_lines(text).collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let timestamp = Local::now();
        let mut ring = self.ring.lock();
        let mut appended = Vec::with_capacity(lines.len());

        for line in lines {
            let entry = LogEntry {
                seq: ring.next_seq,
                text: line.to_string(),
                class,
                timestamp,
            };
            ring.next_seq += 1;

            if ring.entries.len() == self.capacity {
                ring.entries.pop_front();
            }
            ring.entries.push_back(entry.clone());
            appended.push(entry);
        }

        appended
    }

    /// Snapshot of all buffered entries, oldest first.
    pub fn get_all(&self) -> Vec<LogEntry> {
        self.ring.lock().entries.iter().cloned().collect()
    }

    /// Entries whose text contains `needle`, ignoring case.
    ///
    /// Each match is paired with its index in [`get_all`](Self::get_all), so
    /// callers can show "match N of M" against the full buffer.
    pub fn get_filtered(&self, needle: &str) -> Vec<(usize, LogEntry)> {
        let needle = needle.to_lowercase();
        self.ring
            .lock()
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.text.to_lowercase().contains(&needle))
            .map(|(i, e)| (i, e.clone()))
            .collect()
    }

    /// Buffered entries with `seq >= from`.
    pub fn entries_since(&self, from: u64) -> Vec<LogEntry> {
        self.ring
            .lock()
            .entries
            .iter()
            .filter(|e| e.seq >= from)
            .cloned()
            .collect()
    }

    /// Buffered entries belonging to a job's log range.
    pub fn range(&self, log_ref: &LogRef) -> Vec<LogEntry> {
        self.ring
            .lock()
            .entries
            .iter()
            .filter(|e| e.seq >= log_ref.first_seq && e.seq < log_ref.end_seq)
            .cloned()
            .collect()
    }

    /// Drop all buffered entries. Sequence numbers keep counting.
    pub fn clear(&self) {
        self.ring.lock().entries.clear();
    }

    /// Write the buffered entries to `path`, one formatted line each.
    ///
    /// The file is written to a temporary sibling first and moved into place,
    /// so a concurrent reader never sees a half-written log. An existing file
    /// at `path` is never replaced.
    pub fn persist_to_file(&self, path: &Path) -> Result<()> {
        let entries = self.get_all();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        ensure_dir(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        for entry in &entries {
            writeln!(tmp, "{}", entry.format_line())
                .with_context(|| format!("failed to write log file: {}", path.display()))?;
        }
        tmp.persist_noclobber(path)
            .with_context(|| format!("failed to write log file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), lines = entries.len(), "persisted log");
        Ok(())
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Split on `\n`, `\r\n` and lone `\r`, dropping empty lines.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\n', '\r']).filter(|line| !line.trim().is_empty())
}

/// Log file name with a sortable timestamp, e.g.
/// `stagehand-build-20261019-142501-042.log`.
pub fn log_file_name(kind: &str, at: DateTime<Local>) -> String {
    format!("stagehand-{}-{}.log", kind, at.format("%Y%m%d-%H%M%S-%3f"))
}

/// A path in `dir` for a new log that does not exist yet.
///
/// Adds a numeric suffix when another log already took the same timestamp.
pub fn log_file_path(dir: &Path, kind: &str, at: DateTime<Local>) -> PathBuf {
    let name = log_file_name(kind, at);
    let mut path = dir.join(&name);
    let stem = name.trim_end_matches(".log");
    let mut n = 1u32;
    while path.exists() {
        path = dir.join(format!("{}-{}.log", stem, n));
        n += 1;
    }
    path
}

static STAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{8}-\d{6}(?:-\d{3})?)(?:-(\d+))?\.log$").expect("stamp pattern is valid")
});

/// Ordering key of a log file name: its timestamp, then its suffix.
///
/// Names without a timestamp sort before every stamped name.
pub fn log_file_stamp(name: &str) -> Option<(String, u32)> {
    let caps = STAMP_RE.captures(name)?;
    let suffix = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some((caps[1].to_string(), suffix))
}
