/*!
 * Worker Controller Tests
 * Fork real workers, drive their gates and read back their timing records
 */

use super::common::{permitted_cores, pick_core};
use dispatch_kernel::core::limits::EXIT_GATE_CLOSED;
use dispatch_kernel::process::{affinity, priority, LogSinkKind};
use dispatch_kernel::{
    ControllerConfig, DispatchGate, GateError, LogTag, PriorityClass, Quanta, TimingRecord,
    WorkerController, WorkerExit, WorkerHandle, WorkerSpec, WorkerState,
};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    log: PathBuf,
    controller: WorkerController,
}

impl Harness {
    fn new(iterations: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("records.log");
        let config = ControllerConfig::default()
            .with_quantum_iterations(iterations)
            .with_log_tag(LogTag::new("TAG").unwrap())
            .with_announce(false)
            .with_log_sink(LogSinkKind::File { path: log.clone() });

        Self {
            _dir: dir,
            log,
            controller: WorkerController::new(config),
        }
    }

    fn spawn(&self, name: &str, quanta: Quanta, core: usize) -> WorkerHandle {
        let gate = DispatchGate::open().unwrap();
        self.controller
            .spawn(WorkerSpec::new(name, quanta, gate), core)
            .unwrap()
    }

    fn lines(&self) -> Vec<String> {
        read_lines(&self.log)
    }
}

/// Poll for the worker's exit; kill and reap it if `limit` passes first
fn exit_within(worker: &mut WorkerHandle, limit: Duration) -> Option<WorkerExit> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if let Some(exit) = worker.try_wait().unwrap() {
            return Some(exit);
        }
        thread::sleep(Duration::from_millis(10));
    }

    let _ = worker.kill();
    let _ = worker.wait();
    None
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .split_inclusive('\n')
        .map(str::to_string)
        .collect()
}

#[test]
#[serial]
fn test_three_quanta_yield_one_record() {
    let harness = Harness::new(10_000);
    let core = pick_core(1);

    let mut worker = harness.spawn("A", 3, core);
    assert_eq!(worker.state(), WorkerState::Ready);
    assert_eq!(worker.core(), core);
    assert_eq!(
        priority::current_class(worker.pid()).unwrap(),
        Some(PriorityClass::Idle)
    );
    assert_eq!(affinity::current_cores(worker.pid()).unwrap(), vec![core]);

    for _ in 0..3 {
        worker.grant().unwrap();
    }
    assert_eq!(worker.granted(), 3);
    assert_eq!(worker.remaining(), 0);

    assert_eq!(worker.wait().unwrap(), WorkerExit::Completed);
    assert_eq!(worker.state(), WorkerState::Done);

    let lines = harness.lines();
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert!(line.starts_with("[TAG] "));
    assert!(line.ends_with('\n'));

    let fields: Vec<&str> = line.split_whitespace().collect();
    assert_eq!(fields.len(), 4);
    for stamp in &fields[2..] {
        let (secs, nanos) = stamp.split_once('.').unwrap();
        assert!(secs.len() >= 9);
        assert_eq!(nanos.len(), 9);
    }

    let (tag, record) = TimingRecord::parse_line(line).unwrap();
    assert_eq!(tag, "TAG");
    assert_eq!(record.pid, worker.pid().as_raw());
    assert!(record.start <= record.end);
}

#[test]
#[serial]
fn test_extra_token_has_no_effect() {
    let harness = Harness::new(10_000);

    let mut worker = harness.spawn("A", 3, pick_core(1));
    worker.grant_many(4).unwrap();

    assert_eq!(worker.wait().unwrap(), WorkerExit::Completed);
    assert_eq!(harness.lines().len(), 1);

    // Reaped workers refuse further tokens instead of blocking
    assert!(matches!(worker.grant(), Err(GateError::Closed)));
    assert_eq!(harness.lines().len(), 1);
}

#[test]
#[serial]
fn test_gated_workers_never_run() {
    let harness = Harness::new(10_000);
    let cores = permitted_cores();
    let second = cores.get(1).copied().unwrap_or(cores[0]);

    let mut first = harness.spawn("A", 2, cores[0]);
    let mut other = harness.spawn("B", 2, second);

    thread::sleep(Duration::from_millis(300));

    assert_eq!(first.try_wait().unwrap(), None);
    assert_eq!(other.try_wait().unwrap(), None);
    assert!(harness.lines().is_empty());

    // EOF is the only way out of an ungranted gate
    first.close_gate();
    other.close_gate();

    assert_eq!(other.wait().unwrap(), WorkerExit::Failed(EXIT_GATE_CLOSED));
    assert_eq!(first.wait().unwrap(), WorkerExit::Failed(EXIT_GATE_CLOSED));
    assert!(harness.lines().is_empty());
}

#[test]
#[serial]
fn test_gates_opened_before_any_spawn_each_reach_eof() {
    let harness = Harness::new(10_000);
    let cores = permitted_cores();

    // Every gate exists before the first fork, so each worker starts out
    // holding both ends of all sibling gates
    let gates: Vec<DispatchGate> = (0..3).map(|_| DispatchGate::open().unwrap()).collect();
    let mut workers: Vec<WorkerHandle> = gates
        .into_iter()
        .enumerate()
        .map(|(i, gate)| {
            harness
                .controller
                .spawn(WorkerSpec::new(format!("W{i}"), 2, gate), cores[i % cores.len()])
                .unwrap()
        })
        .collect();

    workers[0].close_gate();
    assert_eq!(
        exit_within(&mut workers[0], Duration::from_secs(5)),
        Some(WorkerExit::Failed(EXIT_GATE_CLOSED))
    );
    assert_eq!(workers[1].try_wait().unwrap(), None);
    assert_eq!(workers[2].try_wait().unwrap(), None);

    for worker in &mut workers[1..] {
        worker.close_gate();
    }
    for worker in &mut workers[1..] {
        assert_eq!(
            exit_within(worker, Duration::from_secs(5)),
            Some(WorkerExit::Failed(EXIT_GATE_CLOSED))
        );
    }
    assert!(harness.lines().is_empty());
}

#[test]
#[serial]
fn test_partial_grant_emits_no_record() {
    let harness = Harness::new(10_000);

    let mut worker = harness.spawn("C", 3, pick_core(1));
    worker.grant().unwrap();
    worker.close_gate();

    assert_eq!(worker.wait().unwrap(), WorkerExit::Failed(EXIT_GATE_CLOSED));
    assert!(harness.lines().is_empty());
}

#[test]
#[serial]
fn test_more_quanta_never_finish_faster() {
    let harness = Harness::new(200_000);
    let core = pick_core(1);

    let mut elapsed = Vec::new();
    for quanta in [1, 40] {
        let mut worker = harness.spawn("M", quanta, core);
        worker.grant_many(quanta).unwrap();
        assert_eq!(worker.wait().unwrap(), WorkerExit::Completed);

        let lines = harness.lines();
        let (_, record) = TimingRecord::parse_line(lines.last().unwrap()).unwrap();
        assert_eq!(record.pid, worker.pid().as_raw());
        elapsed.push(record.elapsed());
    }

    assert_eq!(harness.lines().len(), 2);
    assert!(elapsed[0] <= elapsed[1], "{elapsed:?}");
}

#[test]
#[serial]
fn test_rejected_core_is_recoverable() {
    let harness = Harness::new(10);
    let gate = DispatchGate::open().unwrap();

    let err = harness
        .controller
        .spawn(WorkerSpec::new("X", 1, gate), affinity::usable_cores())
        .unwrap_err();

    assert!(!err.is_fatal());
    assert!(harness.lines().is_empty());
}
