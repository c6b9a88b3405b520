/*!
 * Monitoring Module
 * Structured tracing for the controller
 */

pub mod tracer;

pub use tracer::{init_tracing, OperationSpan};
