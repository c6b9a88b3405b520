/*!
 * Log Sinks
 *
 * Implementations of the opaque `(length, buffer)` log channel. Records reach
 * a sink as a null-terminated buffer whose length counts the null.
 */

use super::traits::LogSink;
use crate::core::errors::RecoverableError;
use crate::core::limits::DEFAULT_PRINTSTRING_SYSCALL;
use nix::errno::Errno;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Null-terminate `line` for hand-off to a sink
pub fn frame(line: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(0);
    buf
}

/// Text carried by a framed buffer, without the null
fn payload(len: usize, buf: &[u8]) -> &[u8] {
    let text = &buf[..len.min(buf.len())];
    text.strip_suffix(&[0]).unwrap_or(text)
}

/// Hands records to the kernel through the print-string syscall
#[derive(Debug, Clone, Copy)]
pub struct KernelLogSink {
    syscall: i64,
}

impl KernelLogSink {
    pub const fn new(syscall: i64) -> Self {
        Self { syscall }
    }
}

impl Default for KernelLogSink {
    fn default() -> Self {
        Self::new(DEFAULT_PRINTSTRING_SYSCALL)
    }
}

impl LogSink for KernelLogSink {
    fn emit(&self, len: usize, buf: &[u8]) -> io::Result<()> {
        let len = len.min(buf.len());
        // SAFETY: the kernel reads at most `len` bytes from `buf`, which is live
        // and at least that long for the duration of the call
        let ret = unsafe {
            libc::syscall(
                self.syscall as libc::c_long,
                len as libc::c_ulong,
                buf.as_ptr(),
            )
        };
        Errno::result(ret).map(drop).map_err(io::Error::from)
    }
}

/// Writes records to standard error
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrLogSink;

impl LogSink for StderrLogSink {
    fn emit(&self, len: usize, buf: &[u8]) -> io::Result<()> {
        io::stderr().lock().write_all(payload(len, buf))
    }
}

/// Appends records to a file, one write per record
///
/// The file is opened per record so forked workers never share a buffer.
#[derive(Debug, Clone)]
pub struct FileLogSink {
    path: PathBuf,
}

impl FileLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn emit(&self, len: usize, buf: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(payload(len, buf))
    }
}

/// Keeps records in memory; used by in-process lifecycles
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSink {
    records: Arc<Mutex<Vec<(usize, Vec<u8>)>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw `(len, buffer)` pairs in emission order
    pub fn records(&self) -> Vec<(usize, Vec<u8>)> {
        self.records.lock().clone()
    }

    /// Record text with the null stripped
    pub fn lines(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|(len, buf)| String::from_utf8_lossy(payload(*len, buf)).into_owned())
            .collect()
    }
}

impl LogSink for MemoryLogSink {
    fn emit(&self, len: usize, buf: &[u8]) -> io::Result<()> {
        self.records.lock().push((len, buf.to_vec()));
        Ok(())
    }
}

/// Configured sink selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogSinkKind {
    Stderr,
    Kernel { syscall: i64 },
    File { path: PathBuf },
}

impl LogSinkKind {
    pub fn build(&self) -> Arc<dyn LogSink> {
        match self {
            Self::Stderr => Arc::new(StderrLogSink),
            Self::Kernel { syscall } => Arc::new(KernelLogSink::new(*syscall)),
            Self::File { path } => Arc::new(FileLogSink::new(path.clone())),
        }
    }
}

impl Default for LogSinkKind {
    fn default() -> Self {
        Self::Stderr
    }
}

impl FromStr for LogSinkKind {
    type Err = RecoverableError;

    /// Accepts `stderr`, `kernel`, `kernel:<nr>` and `file:<path>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RecoverableError::InvalidConfig {
            key: "log_sink",
            value: s.to_string(),
        };

        match s.split_once(':') {
            None if s == "stderr" => Ok(Self::Stderr),
            None if s == "kernel" => Ok(Self::Kernel {
                syscall: DEFAULT_PRINTSTRING_SYSCALL,
            }),
            Some(("kernel", nr)) => nr
                .parse()
                .map(|syscall| Self::Kernel { syscall })
                .map_err(|_| invalid()),
            Some(("file", path)) if !path.is_empty() => Ok(Self::File { path: path.into() }),
            _ => Err(invalid()),
        }
    }
}
