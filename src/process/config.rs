/*!
 * Controller Configuration
 *
 * Defaults come from `core::limits`; `from_env` overlays:
 *
 * - `DISPATCH_QUANTUM_ITERATIONS` busy-loop iterations per quantum unit
 * - `DISPATCH_LOG_TAG` tag printed at the start of timing lines
 * - `DISPATCH_LOG_SINK` `stderr`, `kernel`, `kernel:<nr>` or `file:<path>`
 * - `DISPATCH_ANNOUNCE` `1`/`true` or `0`/`false`
 */

use super::quantum::QuantumUnit;
use super::sink::LogSinkKind;
use super::timing::LogTag;
use crate::core::errors::RecoverableError;
use serde::{Deserialize, Serialize};

/// Worker controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ControllerConfig {
    /// Calibration of one quantum unit
    pub quantum: QuantumUnit,
    /// Tag printed in brackets at the start of every timing line
    pub log_tag: LogTag,
    /// Where timing records go
    pub log_sink: LogSinkKind,
    /// Print `<name> <pid>` to stderr when a worker takes its first token
    pub announce: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            quantum: QuantumUnit::default(),
            log_tag: LogTag::default(),
            log_sink: LogSinkKind::default(),
            announce: true,
        }
    }
}

impl ControllerConfig {
    /// Defaults overlaid with `DISPATCH_*` environment variables
    pub fn from_env() -> Result<Self, RecoverableError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values produced by `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RecoverableError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("DISPATCH_QUANTUM_ITERATIONS") {
            let iterations = raw.trim().parse().map_err(|_| RecoverableError::InvalidConfig {
                key: "DISPATCH_QUANTUM_ITERATIONS",
                value: raw.clone(),
            })?;
            config.quantum = QuantumUnit::new(iterations);
        }

        if let Some(raw) = lookup("DISPATCH_LOG_TAG") {
            config.log_tag = LogTag::new(raw.clone()).map_err(|_| RecoverableError::InvalidConfig {
                key: "DISPATCH_LOG_TAG",
                value: raw,
            })?;
        }

        if let Some(raw) = lookup("DISPATCH_LOG_SINK") {
            config.log_sink = raw.trim().parse()?;
        }

        if let Some(raw) = lookup("DISPATCH_ANNOUNCE") {
            config.announce = match raw.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => {
                    return Err(RecoverableError::InvalidConfig {
                        key: "DISPATCH_ANNOUNCE",
                        value: raw,
                    })
                }
            };
        }

        Ok(config)
    }

    #[inline]
    #[must_use]
    pub fn with_quantum_iterations(mut self, iterations: u64) -> Self {
        self.quantum = QuantumUnit::new(iterations);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_log_tag(mut self, tag: LogTag) -> Self {
        self.log_tag = tag;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_log_sink(mut self, sink: LogSinkKind) -> Self {
        self.log_sink = sink;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_announce(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }
}
