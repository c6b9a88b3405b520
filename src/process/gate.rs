/*!
 * Dispatch Gate
 *
 * One-way byte channel used as a blocking admission gate. The gate is opened
 * before the worker is forked so both ends survive the split; afterwards each
 * side keeps only its own end. Ends are owned descriptors and close on drop,
 * on every path.
 *
 * A forked worker also inherits every other descriptor the dispatcher had
 * open, including the signal ends of sibling gates. [`GateWait::isolate`]
 * drops those so a gate reaches EOF as soon as the dispatcher closes it.
 */

use super::traits::TokenSource;
use crate::core::limits::GATE_TOKEN;
use nix::errno::Errno;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use thiserror::Error;

/// Lowest descriptor above stdin, stdout and stderr
const FIRST_INHERITED: libc::c_uint = 3;

/// Gate error types
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Failed to open gate: {0}")]
    Open(#[source] Errno),

    #[error("Gate closed")]
    Closed,

    #[error("Gate I/O failed: {0}")]
    Io(#[from] io::Error),
}

pub type GateResult<T> = Result<T, GateError>;

/// Both ends of a freshly opened gate
#[derive(Debug)]
pub struct DispatchGate {
    signal: OwnedFd,
    wait: OwnedFd,
}

impl DispatchGate {
    /// Open a new gate
    pub fn open() -> GateResult<Self> {
        let (wait, signal) = nix::unistd::pipe().map_err(GateError::Open)?;
        Ok(Self { signal, wait })
    }

    /// Keep the signal end, closing the wait end (dispatcher side)
    pub fn into_signal_end(self) -> GateSignal {
        let Self { signal, wait } = self;
        drop(wait);
        GateSignal {
            end: File::from(signal),
        }
    }

    /// Keep both ends in this process, for thread-based workers
    pub fn split(self) -> (GateSignal, GateWait) {
        let Self { signal, wait } = self;
        (
            GateSignal {
                end: File::from(signal),
            },
            GateWait {
                end: File::from(wait),
            },
        )
    }

    /// Keep the wait end, closing the signal end (worker side)
    pub fn into_wait_end(self) -> GateWait {
        let Self { signal, wait } = self;
        drop(signal);
        GateWait {
            end: File::from(wait),
        }
    }
}

/// Dispatcher's end of a gate
#[derive(Debug)]
pub struct GateSignal {
    end: File,
}

impl GateSignal {
    /// Authorize one quantum
    #[inline]
    pub fn grant(&self) -> GateResult<()> {
        self.write_tokens(&[GATE_TOKEN])
    }

    /// Authorize `count` quanta in a single write
    pub fn grant_many(&self, count: usize) -> GateResult<()> {
        if count == 0 {
            return Ok(());
        }
        self.write_tokens(&vec![GATE_TOKEN; count])
    }

    fn write_tokens(&self, tokens: &[u8]) -> GateResult<()> {
        (&self.end).write_all(tokens).map_err(|e| match e.kind() {
            io::ErrorKind::BrokenPipe => GateError::Closed,
            _ => GateError::Io(e),
        })
    }
}

/// Worker's end of a gate
#[derive(Debug)]
pub struct GateWait {
    end: File,
}

impl GateWait {
    /// Block until one token arrives and consume it
    ///
    /// Returns `GateError::Closed` once every signal end is gone.
    pub fn acquire(&mut self) -> GateResult<()> {
        let mut token = [0u8; 1];
        loop {
            match self.end.read(&mut token) {
                Ok(0) => return Err(GateError::Closed),
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(GateError::Io(e)),
            }
        }
    }

    /// Close every descriptor of this process except stdio and this end
    ///
    /// Only for a freshly forked worker: owners of the closed descriptors in
    /// the copied address space must never use or drop them afterwards.
    pub fn isolate(&self) -> io::Result<()> {
        close_inherited(self.end.as_raw_fd())
    }
}

impl AsRawFd for GateWait {
    fn as_raw_fd(&self) -> RawFd {
        self.end.as_raw_fd()
    }
}

fn close_inherited(keep: RawFd) -> io::Result<()> {
    let keep = keep as libc::c_uint;
    let closed = if keep < FIRST_INHERITED {
        close_range(FIRST_INHERITED, libc::c_uint::MAX)
    } else if keep == FIRST_INHERITED {
        close_range(keep + 1, libc::c_uint::MAX)
    } else {
        close_range(FIRST_INHERITED, keep - 1).and_then(|()| close_range(keep + 1, libc::c_uint::MAX))
    };

    match closed {
        Ok(()) => Ok(()),
        // close_range needs Linux 5.9
        Err(Errno::ENOSYS) => close_listed(keep as RawFd),
        Err(e) => Err(e.into()),
    }
}

fn close_range(first: libc::c_uint, last: libc::c_uint) -> Result<(), Errno> {
    // SAFETY: close_range only releases descriptors and reads no memory
    let ret = unsafe { libc::syscall(libc::SYS_close_range, first, last, 0 as libc::c_uint) };
    Errno::result(ret).map(drop)
}

fn close_listed(keep: RawFd) -> io::Result<()> {
    let open: Vec<RawFd> = std::fs::read_dir("/proc/self/fd")?
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
        .collect();

    for fd in open {
        if fd >= FIRST_INHERITED as RawFd && fd != keep {
            // EBADF for the descriptor that listed the directory
            let _ = nix::unistd::close(fd);
        }
    }
    Ok(())
}

impl TokenSource for GateWait {
    #[inline]
    fn acquire(&mut self) -> GateResult<()> {
        GateWait::acquire(self)
    }
}
