/*!
 * Dispatch Kernel Library
 * Cooperative dispatch of gated, pinned, idle-class worker processes
 */

pub mod core;
pub mod monitoring;
pub mod process;

// Re-exports
pub use crate::core::errors::{ControllerError, ControllerResult, FatalError, RecoverableError, Severity};
pub use crate::core::types::{CoreId, Quanta};
pub use monitoring::init_tracing;
pub use process::{
    ControllerConfig, DispatchGate, GateError, LogTag, PriorityClass, QuantumUnit, Timestamp, TimingRecord,
    WorkerController, WorkerExit, WorkerHandle, WorkerSpec, WorkerState,
};
