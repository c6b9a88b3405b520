/*!
 * Affinity Binder
 * Confines a process to exactly one logical core
 */

use crate::core::errors::{ControllerResult, FatalError, RecoverableError};
use crate::core::types::CoreId;
use nix::errno::Errno;
use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::{sysconf, Pid, SysconfVar};
use std::num::NonZeroUsize;
use tracing::{debug, error};

/// Number of logical cores the host reports online
pub fn usable_cores() -> usize {
    if let Ok(Some(online)) = sysconf(SysconfVar::_NPROCESSORS_ONLN) {
        if online > 0 {
            return (online as usize).min(CpuSet::count());
        }
    }

    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Check `core` against the host core count without touching any process
#[inline]
pub fn validate_core(core: CoreId) -> Result<(), RecoverableError> {
    check_core(core, usable_cores())
}

#[inline]
fn check_core(core: CoreId, available: usize) -> Result<(), RecoverableError> {
    if core >= available {
        return Err(RecoverableError::InvalidCore { core, available });
    }
    Ok(())
}

/// Restrict `pid` to run only on `core`
///
/// An out-of-range core is recoverable and leaves the process untouched.
/// A rejected `sched_setaffinity` is fatal.
pub fn bind(pid: Pid, core: CoreId) -> ControllerResult<()> {
    validate_core(core)?;

    let mut mask = CpuSet::new();
    mask.set(core).map_err(|_| RecoverableError::InvalidCore {
        core,
        available: CpuSet::count(),
    })?;

    sched_setaffinity(pid, &mask).map_err(|source| {
        error!(pid = pid.as_raw(), core, error = %source, "sched_setaffinity rejected");
        FatalError::BindingFailed { pid, core, source }
    })?;

    debug!(pid = pid.as_raw(), core, "Process bound to core");
    Ok(())
}

/// Cores `pid` is currently allowed to run on, ascending
pub fn current_cores(pid: Pid) -> Result<Vec<CoreId>, Errno> {
    let mask = sched_getaffinity(pid)?;
    Ok((0..CpuSet::count())
        .filter(|&core| mask.is_set(core).unwrap_or(false))
        .collect())
}
