/*!
 * Quantum Unit
 * One calibrated slice of busy CPU work
 */

use crate::core::limits::DEFAULT_QUANTUM_ITERATIONS;
use serde::{Deserialize, Serialize};
use std::hint::black_box;

/// Calibrated unit of CPU-bound work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuantumUnit {
    iterations: u64,
}

impl QuantumUnit {
    #[inline]
    pub const fn new(iterations: u64) -> Self {
        Self { iterations }
    }

    #[inline]
    pub const fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Burn exactly one unit
    #[inline(never)]
    pub fn run(&self) {
        let mut counter = 0u64;
        for _ in 0..self.iterations {
            counter = black_box(counter.wrapping_add(1));
        }
        black_box(counter);
    }

    /// Burn `units` units back to back
    pub fn run_many(&self, units: u64) {
        for _ in 0..units {
            self.run();
        }
    }
}

impl Default for QuantumUnit {
    fn default() -> Self {
        Self::new(DEFAULT_QUANTUM_ITERATIONS)
    }
}
