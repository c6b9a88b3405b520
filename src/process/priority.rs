/*!
 * Priority Controller
 * Moves processes between the normal and idle scheduling classes
 */

use crate::core::errors::RecoverableError;
use nix::errno::Errno;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Host scheduling class of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// SCHED_OTHER, the default time-sharing class
    Normal,
    /// SCHED_IDLE, runs only when nothing else wants the core
    Idle,
}

impl PriorityClass {
    #[inline]
    fn policy(self) -> libc::c_int {
        match self {
            Self::Normal => libc::SCHED_OTHER,
            Self::Idle => libc::SCHED_IDLE,
        }
    }

    #[inline]
    fn from_policy(policy: libc::c_int) -> Option<Self> {
        match policy & !libc::SCHED_RESET_ON_FORK {
            libc::SCHED_OTHER => Some(Self::Normal),
            libc::SCHED_IDLE => Some(Self::Idle),
            _ => None,
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Idle => f.write_str("idle"),
        }
    }
}

/// Move `pid` into `class`
pub fn set_class(pid: Pid, class: PriorityClass) -> Result<(), RecoverableError> {
    // SAFETY: sched_param is plain old data; all-zero is a valid value.
    // Both classes require a static priority of zero.
    let param: libc::sched_param = unsafe { std::mem::zeroed() };

    // SAFETY: `param` is a valid, initialized sched_param for the duration of the call
    let ret = unsafe { libc::sched_setscheduler(pid.as_raw(), class.policy(), &param) };

    match Errno::result(ret) {
        Ok(_) => {
            debug!(pid = pid.as_raw(), %class, "Scheduling class changed");
            Ok(())
        }
        Err(source) => {
            warn!(pid = pid.as_raw(), %class, error = %source, "sched_setscheduler rejected");
            Err(RecoverableError::PriorityChangeFailed { pid, class, source })
        }
    }
}

/// Demote `pid` to the idle class
#[inline]
pub fn set_idle(pid: Pid) -> Result<(), RecoverableError> {
    set_class(pid, PriorityClass::Idle)
}

/// Restore `pid` to the normal class
///
/// Never called by the default worker lifecycle; exposed for dispatch
/// policies that want to promote a worker.
#[inline]
pub fn set_normal(pid: Pid) -> Result<(), RecoverableError> {
    set_class(pid, PriorityClass::Normal)
}

/// Current class of `pid`, or `None` when it runs under another policy
pub fn current_class(pid: Pid) -> Result<Option<PriorityClass>, Errno> {
    // SAFETY: sched_getscheduler only reads kernel state for the given pid
    let ret = unsafe { libc::sched_getscheduler(pid.as_raw()) };
    Errno::result(ret).map(PriorityClass::from_policy)
}
