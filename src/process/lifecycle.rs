/*!
 * Worker Lifecycle
 *
 * State machine run inside a worker process:
 *
 * ```text
 * Created -> Bound -> Ready -> Running -> (Ready | Done)
 * ```
 *
 * `Created` and `Bound` are observed by the dispatcher while it confines the
 * new process; the worker itself starts in `Ready`. Each token authorizes
 * exactly one quantum. The timing record is emitted once, on the transition
 * to `Done`, and only after both timestamps were read successfully.
 */

use super::config::ControllerConfig;
use super::quantum::QuantumUnit;
use super::sink::frame;
use super::timing::{LogTag, Timestamp, TimingRecord};
use super::traits::{Clock, LogSink, TokenSource};
use crate::core::errors::FatalError;
use crate::core::types::Quanta;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Forked, not yet confined
    Created,
    /// Demoted and pinned to its core
    Bound,
    /// Blocked on its gate
    Ready,
    /// Executing one quantum
    Running,
    /// Quanta exhausted, record emitted
    Done,
}

/// Worker-side lifecycle over a private copy of the worker spec
#[derive(Debug)]
pub struct WorkerLifecycle {
    name: String,
    pid: Pid,
    initial: Quanta,
    remaining: Quanta,
    quantum: QuantumUnit,
    tag: LogTag,
    announce: bool,
    state: WorkerState,
    start: Option<Timestamp>,
    record: Option<TimingRecord>,
}

impl WorkerLifecycle {
    pub fn new(name: impl Into<String>, pid: Pid, quanta: Quanta, config: &ControllerConfig) -> Self {
        Self {
            name: name.into(),
            pid,
            initial: quanta,
            remaining: quanta,
            quantum: config.quantum,
            tag: config.log_tag.clone(),
            announce: config.announce,
            state: WorkerState::Ready,
            start: None,
            record: None,
        }
    }

    #[inline]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    #[inline]
    pub fn remaining(&self) -> Quanta {
        self.remaining
    }

    /// Quanta executed so far
    #[inline]
    pub fn consumed(&self) -> Quanta {
        self.initial.saturating_sub(self.remaining)
    }

    #[inline]
    pub fn record(&self) -> Option<&TimingRecord> {
        self.record.as_ref()
    }

    /// Wait for one token and run one quantum
    ///
    /// Once `Done`, further calls consume nothing and return `Done`. A zero
    /// quantum count behaves like one; the controller rejects it before forking.
    pub fn step<T, C, S>(&mut self, tokens: &mut T, clock: &C, sink: &S) -> Result<WorkerState, FatalError>
    where
        T: TokenSource + ?Sized,
        C: Clock + ?Sized,
        S: LogSink + ?Sized,
    {
        if self.state == WorkerState::Done {
            return Ok(self.state);
        }

        self.state = WorkerState::Ready;
        tokens.acquire()?;

        let start = match self.start {
            Some(start) => start,
            None => {
                let start = clock.now().map_err(FatalError::TimingFailure)?;
                self.start = Some(start);
                if self.announce {
                    eprintln!("{} {}", self.name, self.pid);
                }
                start
            }
        };

        self.state = WorkerState::Running;
        self.quantum.run();
        self.remaining = self.remaining.saturating_sub(1);
        trace!(worker = %self.name, remaining = self.remaining, "Quantum finished");

        if self.remaining > 0 {
            self.state = WorkerState::Ready;
            return Ok(self.state);
        }

        let end = clock.now().map_err(FatalError::TimingFailure)?;
        let record = TimingRecord::new(self.pid.as_raw(), start, end);

        let buf = frame(&record.to_line(&self.tag));
        if let Err(e) = sink.emit(buf.len(), &buf) {
            warn!(worker = %self.name, pid = record.pid, error = %e, "Log sink rejected timing record");
        }
        debug!(
            worker = %self.name,
            pid = record.pid,
            elapsed_ns = record.elapsed().as_nanos() as u64,
            "Worker finished"
        );

        self.record = Some(record);
        self.state = WorkerState::Done;
        Ok(self.state)
    }

    /// Step until every quantum has run, returning the emitted record
    pub fn run<T, C, S>(mut self, tokens: &mut T, clock: &C, sink: &S) -> Result<TimingRecord, FatalError>
    where
        T: TokenSource + ?Sized,
        C: Clock + ?Sized,
        S: LogSink + ?Sized,
    {
        loop {
            if self.step(tokens, clock, sink)? == WorkerState::Done {
                if let Some(record) = self.record {
                    return Ok(record);
                }
            }
        }
    }
}
