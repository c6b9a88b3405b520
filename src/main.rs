/*!
 * Dispatcher - Main Entry Point
 *
 * Round-robin driver for the worker controller:
 * - Pins itself to the dispatcher core
 * - Spawns one gated worker per workload entry
 * - Grants tokens in turns of `slice` quanta
 * - Reaps every worker and reports abnormal exits
 *
 * Usage: `dispatcher <workload.json>`
 */

use dispatch_kernel::core::limits::DISPATCHER_CORE;
use dispatch_kernel::process::affinity;
use dispatch_kernel::{
    init_tracing, ControllerConfig, CoreId, DispatchGate, FatalError, Quanta, QuantumUnit,
    WorkerController, WorkerHandle, WorkerSpec,
};
use miette::{miette, IntoDiagnostic, Result, WrapErr};
use nix::unistd::getpid;
use serde::Deserialize;
use std::collections::VecDeque;
use tracing::{info, warn};

/// Workload file contents
#[derive(Debug, Deserialize)]
struct Workload {
    /// Quanta granted per turn
    #[serde(default = "default_slice")]
    slice: Quanta,
    workers: Vec<WorkloadEntry>,
}

#[derive(Debug, Deserialize)]
struct WorkloadEntry {
    name: String,
    quanta: Quanta,
}

fn default_slice() -> Quanta {
    500
}

fn main() -> Result<()> {
    init_tracing();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| miette!("usage: dispatcher <workload.json>"))?;
    let raw = std::fs::read_to_string(&path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read workload {path}"))?;
    let workload: Workload = serde_json::from_str(&raw)
        .into_diagnostic()
        .wrap_err("Failed to parse workload")?;
    if workload.slice == 0 {
        return Err(miette!("slice must be positive"));
    }

    let config = ControllerConfig::from_env()?;
    let quantum = config.quantum;

    if let Err(e) = affinity::bind(getpid(), DISPATCHER_CORE) {
        warn!(error = %e, "Dispatcher runs unpinned");
    }

    let cores = affinity::usable_cores();
    info!(
        workers = workload.workers.len(),
        slice = workload.slice,
        cores,
        iterations = quantum.iterations(),
        "Dispatcher starting"
    );

    let controller = WorkerController::new(config);
    let mut workers = Vec::with_capacity(workload.workers.len());
    for (index, entry) in workload.workers.into_iter().enumerate() {
        let gate = DispatchGate::open().map_err(FatalError::from)?;
        let core = worker_core(index, cores);
        workers.push(controller.spawn(WorkerSpec::new(entry.name, entry.quanta, gate), core)?);
    }

    round_robin(&mut workers, workload.slice, &quantum)?;

    let mut failures = 0usize;
    for worker in &mut workers {
        let exit = worker.wait().into_diagnostic()?;
        if !exit.is_success() {
            failures += 1;
            warn!(worker = worker.name(), pid = worker.pid().as_raw(), exit = ?exit, "Worker failed");
        }
    }

    info!(failures, "Dispatcher finished");
    if failures > 0 {
        return Err(miette!("{failures} worker(s) ended abnormally"));
    }
    Ok(())
}

/// Spread workers over every core but the dispatcher's
fn worker_core(index: usize, cores: usize) -> CoreId {
    if cores <= 1 {
        return DISPATCHER_CORE;
    }
    1 + index % (cores - 1)
}

/// Grant up to `slice` tokens per turn, keeping pace one quantum per token
fn round_robin(workers: &mut [WorkerHandle], slice: Quanta, quantum: &QuantumUnit) -> Result<()> {
    let mut queue: VecDeque<usize> = (0..workers.len()).collect();

    while let Some(index) = queue.pop_front() {
        let worker = &mut workers[index];
        let turn = slice.min(worker.remaining());

        for _ in 0..turn {
            worker.grant().map_err(FatalError::from)?;
            quantum.run();
        }

        if worker.remaining() > 0 {
            queue.push_back(index);
        } else {
            worker.close_gate();
        }
    }

    Ok(())
}
