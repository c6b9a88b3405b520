/*!
 * Core Types
 * Common types used across the controller
 */

/// Logical core index, as understood by `sched_setaffinity`
pub type CoreId = usize;

/// Number of quantum units a worker must execute
pub type Quanta = u32;

/// Raw OS process id, as written into timing records
pub type RawPid = i32;
