/*!
 * Process Module
 * Worker creation, confinement, gating and timing
 */

pub mod affinity;
pub mod config;
pub mod gate;
pub mod lifecycle;
pub mod priority;
pub mod quantum;
pub mod sink;
pub mod timing;
pub mod traits;
pub mod worker;

// Re-export for convenience
pub use config::ControllerConfig;
pub use gate::{DispatchGate, GateError, GateResult, GateSignal, GateWait};
pub use lifecycle::{WorkerLifecycle, WorkerState};
pub use priority::PriorityClass;
pub use quantum::QuantumUnit;
pub use sink::{FileLogSink, KernelLogSink, LogSinkKind, MemoryLogSink, StderrLogSink};
pub use timing::{LogTag, RealtimeClock, RecordParseError, Timestamp, TimingRecord};
pub use traits::{Clock, LogSink, TokenSource};
pub use worker::{WorkerController, WorkerExit, WorkerHandle, WorkerSpec};
