/*!
 * Timing Records
 *
 * Nanosecond timestamps, the per-worker (pid, start, end) record and its
 * fixed textual line:
 *
 * ```text
 * [<tag>] <pid> <start_sec>.<start_nsec> <end_sec>.<end_nsec>
 * ```
 *
 * Every timestamp component is zero-padded to nine digits.
 */

use super::traits::Clock;
use crate::core::limits::{DEFAULT_LOG_TAG, TIMESTAMP_DIGITS};
use crate::core::types::RawPid;
use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, ClockId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Errors from parsing a timing line
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordParseError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Malformed tag: {0:?}")]
    MalformedTag(String),

    #[error("Malformed pid: {0:?}")]
    MalformedPid(String),

    #[error("Malformed timestamp: {0:?}")]
    MalformedTimestamp(String),

    #[error("Unexpected trailing field: {0:?}")]
    TrailingField(String),
}

/// Tag printed in brackets at the start of a timing line
///
/// Non-empty, free of whitespace and `]`, so every rendered line parses back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogTag(String);

impl LogTag {
    pub fn new(tag: impl Into<String>) -> Result<Self, RecordParseError> {
        let tag = tag.into();
        if tag.is_empty() || tag.chars().any(|c| c.is_whitespace() || c == ']') {
            return Err(RecordParseError::MalformedTag(tag));
        }
        Ok(Self(tag))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LogTag {
    fn default() -> Self {
        Self(DEFAULT_LOG_TAG.to_string())
    }
}

impl TryFrom<String> for LogTag {
    type Error = RecordParseError;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        Self::new(tag)
    }
}

impl From<LogTag> for String {
    fn from(tag: LogTag) -> Self {
        tag.0
    }
}

impl FromStr for LogTag {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for LogTag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Wall-clock instant as (seconds, nanoseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
}

impl Timestamp {
    #[inline]
    pub const fn new(secs: u64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Time from `earlier` to `self`, zero if `earlier` is later
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        let this = Duration::new(self.secs, self.nanos);
        let that = Duration::new(earlier.secs, earlier.nanos);
        this.saturating_sub(that)
    }
}

impl From<TimeSpec> for Timestamp {
    fn from(ts: TimeSpec) -> Self {
        Self {
            secs: u64::try_from(ts.tv_sec()).unwrap_or(0),
            nanos: u32::try_from(ts.tv_nsec()).unwrap_or(0),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0width$}.{:0width$}",
            self.secs,
            self.nanos,
            width = TIMESTAMP_DIGITS
        )
    }
}

impl FromStr for Timestamp {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RecordParseError::MalformedTimestamp(s.to_string());

        let (secs, nanos) = s.split_once('.').ok_or_else(malformed)?;
        if secs.is_empty()
            || nanos.len() != TIMESTAMP_DIGITS
            || !secs.bytes().chain(nanos.bytes()).all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }

        let secs = secs.parse().map_err(|_| malformed())?;
        let nanos: u32 = nanos.parse().map_err(|_| malformed())?;
        if nanos >= NANOS_PER_SEC {
            return Err(malformed());
        }
        Ok(Self { secs, nanos })
    }
}

/// Reads CLOCK_REALTIME
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeClock;

impl Clock for RealtimeClock {
    #[inline]
    fn now(&self) -> Result<Timestamp, Errno> {
        clock_gettime(ClockId::CLOCK_REALTIME).map(Timestamp::from)
    }
}

/// Total execution span of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub pid: RawPid,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimingRecord {
    #[inline]
    pub const fn new(pid: RawPid, start: Timestamp, end: Timestamp) -> Self {
        Self { pid, start, end }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.end.saturating_since(self.start)
    }

    /// Render the newline-terminated log line
    pub fn to_line(&self, tag: &LogTag) -> String {
        format!("[{}] {} {} {}\n", tag, self.pid, self.start, self.end)
    }

    /// Parse a line produced by [`TimingRecord::to_line`], returning the tag too
    pub fn parse_line(line: &str) -> Result<(LogTag, Self), RecordParseError> {
        let mut fields = line.split_whitespace();

        let tag = fields.next().ok_or(RecordParseError::MissingField("tag"))?;
        let tag = tag
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .ok_or_else(|| RecordParseError::MalformedTag(tag.to_string()))
            .and_then(LogTag::new)?;

        let pid = fields.next().ok_or(RecordParseError::MissingField("pid"))?;
        let pid = pid
            .parse()
            .map_err(|_| RecordParseError::MalformedPid(pid.to_string()))?;

        let start = fields
            .next()
            .ok_or(RecordParseError::MissingField("start"))?
            .parse()?;
        let end = fields
            .next()
            .ok_or(RecordParseError::MissingField("end"))?
            .parse()?;

        if let Some(extra) = fields.next() {
            return Err(RecordParseError::TrailingField(extra.to_string()));
        }

        Ok((tag, Self { pid, start, end }))
    }
}
