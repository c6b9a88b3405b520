/*!
 * Controller Limits and Constants
 *
 * Centralized location for calibration defaults, wire values and exit codes.
 */

use super::types::CoreId;

// =============================================================================
// QUANTUM CALIBRATION
// =============================================================================

/// Busy-loop iterations that make up one quantum unit (one million)
pub const DEFAULT_QUANTUM_ITERATIONS: u64 = 1_000_000;

// =============================================================================
// DISPATCH GATE
// =============================================================================

/// Byte written to a gate to authorize exactly one quantum
pub const GATE_TOKEN: u8 = b'r';

// =============================================================================
// CORE ASSIGNMENT
// =============================================================================

/// Core reserved for the dispatching process
pub const DISPATCHER_CORE: CoreId = 0;

// =============================================================================
// TIMING RECORDS
// =============================================================================

/// Default tag printed in brackets at the start of every timing line
pub const DEFAULT_LOG_TAG: &str = "dispatch";

/// Syscall number of the kernel print-string patch
/// [LINUX-COMPAT] Only meaningful on kernels carrying that patch
pub const DEFAULT_PRINTSTRING_SYSCALL: i64 = 333;

/// Zero-padding width of each timestamp component
pub const TIMESTAMP_DIGITS: usize = 9;

// =============================================================================
// WORKER EXIT CODES
// =============================================================================

/// Worker completed its quanta and emitted its record
pub const EXIT_SUCCESS: i32 = 0;

/// Clock read failed; no record was emitted
pub const EXIT_TIMING_FAILURE: i32 = 3;

/// Gate reached EOF before the quanta were exhausted
pub const EXIT_GATE_CLOSED: i32 = 4;

/// Gate read failed with an I/O error
pub const EXIT_GATE_READ_FAILED: i32 = 5;

/// Demotion or core binding was rejected
pub const EXIT_CONFINEMENT_FAILED: i32 = 6;

/// Process creation, gate setup or an escalated input error
pub const EXIT_INTERNAL_FAILURE: i32 = 7;
