/*!
 * Process Traits
 * Seams between the worker lifecycle and the host
 */

use super::gate::GateResult;
use super::timing::Timestamp;
use nix::errno::Errno;
use std::io;

/// Source of admission tokens; blocks until one is available
pub trait TokenSource {
    /// Consume exactly one token
    fn acquire(&mut self) -> GateResult<()>;
}

/// Wall-clock reader with nanosecond resolution
pub trait Clock {
    fn now(&self) -> Result<Timestamp, Errno>;
}

/// Opaque, write-only log channel taking a length-prefixed buffer
///
/// `len` counts the terminating null byte included at the end of `buf`.
/// Forked workers keep only stdio open, so a sink must not hold any other
/// descriptor opened before the fork.
pub trait LogSink: Send + Sync {
    fn emit(&self, len: usize, buf: &[u8]) -> io::Result<()>;
}
