/*!
 * Error Types
 * Two-severity error handling with thiserror and miette
 *
 * `RecoverableError` means the caller can retry with different input.
 * `FatalError` means the worker (or the process reporting it) is unusable.
 */

use super::limits::{
    EXIT_CONFINEMENT_FAILED, EXIT_GATE_CLOSED, EXIT_GATE_READ_FAILED, EXIT_INTERNAL_FAILURE,
    EXIT_TIMING_FAILURE,
};
use super::types::CoreId;
use crate::process::gate::GateError;
use crate::process::priority::PriorityClass;
use miette::Diagnostic;
use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

/// Error severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Nothing was changed; retry with different input
    Recoverable,
    /// The affected worker or process cannot be used
    Fatal,
}

/// Errors the caller can act on without losing a worker
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum RecoverableError {
    #[error("Invalid core {core}: {available} usable core(s)")]
    #[diagnostic(
        code(affinity::invalid_core),
        help("Core indices must be below the number of usable cores.")
    )]
    InvalidCore { core: CoreId, available: usize },

    #[error("Worker '{name}' needs a positive quantum count")]
    #[diagnostic(
        code(worker::invalid_quantum_count),
        help("A worker with zero quanta would never consume a token.")
    )]
    InvalidQuantumCount { name: String },

    #[error("Failed to move process {pid} to the {class} class: {source}")]
    #[diagnostic(
        code(priority::change_failed),
        help("Leaving SCHED_IDLE usually needs CAP_SYS_NICE or a raised RLIMIT_NICE.")
    )]
    PriorityChangeFailed {
        pid: Pid,
        class: PriorityClass,
        source: Errno,
    },

    #[error("Invalid value for {key}: {value:?}")]
    #[diagnostic(code(config::invalid_value))]
    InvalidConfig { key: &'static str, value: String },
}

impl RecoverableError {
    /// Promote to a fatal error when the failing step was mandatory
    pub fn escalate(self) -> FatalError {
        match self {
            Self::PriorityChangeFailed { pid, class, source } => {
                FatalError::PriorityChangeFailed { pid, class, source }
            }
            other => FatalError::Escalated(other),
        }
    }
}

/// Errors after which the worker cannot be relied upon
#[derive(Error, Debug, Diagnostic)]
pub enum FatalError {
    #[error("Failed to create worker process: {0}")]
    #[diagnostic(
        code(worker::creation_failed),
        help("Check the process limit (RLIMIT_NPROC) and available memory.")
    )]
    ProcessCreationFailed(#[source] Errno),

    #[error("Failed to bind process {pid} to core {core}: {source}")]
    #[diagnostic(
        code(affinity::binding_failed),
        help("The core may be outside the cpuset of this process, or the pid is gone.")
    )]
    BindingFailed {
        pid: Pid,
        core: CoreId,
        source: Errno,
    },

    #[error("Failed to move process {pid} to the {class} class: {source}")]
    #[diagnostic(code(priority::change_failed))]
    PriorityChangeFailed {
        pid: Pid,
        class: PriorityClass,
        source: Errno,
    },

    #[error("Dispatch gate failure: {0}")]
    #[diagnostic(code(gate::failed))]
    GateFailed(#[from] GateError),

    #[error("Failed to read the realtime clock: {0}")]
    #[diagnostic(
        code(timing::clock_failed),
        help("No timing record was emitted for this worker.")
    )]
    TimingFailure(#[source] Errno),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Escalated(RecoverableError),
}

impl FatalError {
    /// Exit status a worker process reports for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::TimingFailure(_) => EXIT_TIMING_FAILURE,
            Self::GateFailed(GateError::Closed) => EXIT_GATE_CLOSED,
            Self::GateFailed(GateError::Io(_)) => EXIT_GATE_READ_FAILED,
            Self::BindingFailed { .. } | Self::PriorityChangeFailed { .. } => EXIT_CONFINEMENT_FAILED,
            Self::ProcessCreationFailed(_)
            | Self::GateFailed(GateError::Open(_))
            | Self::Escalated(_) => EXIT_INTERNAL_FAILURE,
        }
    }
}

/// Unified controller error
#[derive(Error, Debug, Diagnostic)]
pub enum ControllerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Recoverable(#[from] RecoverableError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fatal(#[from] FatalError),
}

impl ControllerError {
    #[inline]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Recoverable(_) => Severity::Recoverable,
            Self::Fatal(_) => Severity::Fatal,
        }
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Common result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;
