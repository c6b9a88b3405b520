/*!
 * Worker Controller
 *
 * Forks one worker per spec, confines it (idle class, single core) before
 * returning, and hands the dispatcher a handle holding the gate's signal end.
 * The child drops every descriptor it inherited except stdio and its own
 * gate's wait end, runs the worker lifecycle over its own copy of the spec
 * and exits with a status describing how it ended.
 */

use super::affinity;
use super::config::ControllerConfig;
use super::gate::{DispatchGate, GateError, GateResult, GateSignal};
use super::lifecycle::{WorkerLifecycle, WorkerState};
use super::priority;
use super::timing::RealtimeClock;
use super::traits::LogSink;
use crate::core::errors::{ControllerResult, FatalError, RecoverableError};
use crate::core::limits::EXIT_SUCCESS;
use crate::core::types::{CoreId, Quanta};
use crate::monitoring::OperationSpan;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, getpid, ForkResult, Pid};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Input for one worker; consumed by [`WorkerController::spawn`]
#[derive(Debug)]
pub struct WorkerSpec {
    name: String,
    quanta: Quanta,
    gate: DispatchGate,
}

impl WorkerSpec {
    pub fn new(name: impl Into<String>, quanta: Quanta, gate: DispatchGate) -> Self {
        Self {
            name: name.into(),
            quanta,
            gate,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn quanta(&self) -> Quanta {
        self.quanta
    }
}

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Exited with status 0 after emitting its record
    Completed,
    /// Exited with a non-zero status
    Failed(i32),
    /// Killed by a signal
    Signaled(Signal),
}

impl WorkerExit {
    /// Decode a wait status; `None` while the process is still alive
    pub fn from_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, EXIT_SUCCESS) => Some(Self::Completed),
            WaitStatus::Exited(_, code) => Some(Self::Failed(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Self::Signaled(signal)),
            _ => None,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Dispatcher-side handle to a live worker
#[derive(Debug)]
pub struct WorkerHandle {
    pid: Pid,
    name: String,
    core: CoreId,
    quanta: Quanta,
    granted: Quanta,
    gate: Option<GateSignal>,
    state: WorkerState,
    exit: Option<WorkerExit>,
}

impl WorkerHandle {
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Quantum count the worker was created with
    #[inline]
    pub fn quanta(&self) -> Quanta {
        self.quanta
    }

    /// Tokens written to the gate so far
    #[inline]
    pub fn granted(&self) -> Quanta {
        self.granted
    }

    /// Tokens still needed, by the dispatcher's own count
    #[inline]
    pub fn remaining(&self) -> Quanta {
        self.quanta.saturating_sub(self.granted)
    }

    /// Last state observed from the dispatcher side
    #[inline]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Authorize one quantum
    pub fn grant(&mut self) -> GateResult<()> {
        self.gate.as_ref().ok_or(GateError::Closed)?.grant()?;
        self.granted = self.granted.saturating_add(1);
        Ok(())
    }

    /// Authorize `count` quanta at once
    pub fn grant_many(&mut self, count: Quanta) -> GateResult<()> {
        self.gate
            .as_ref()
            .ok_or(GateError::Closed)?
            .grant_many(count as usize)?;
        self.granted = self.granted.saturating_add(count);
        Ok(())
    }

    /// Close the signal end; a worker still waiting sees EOF
    pub fn close_gate(&mut self) {
        if self.gate.take().is_some() {
            debug!(worker = %self.name, pid = self.pid.as_raw(), "Gate closed");
        }
    }

    /// Reap the worker if it has exited
    pub fn try_wait(&mut self) -> Result<Option<WorkerExit>, Errno> {
        if let Some(exit) = self.exit {
            return Ok(Some(exit));
        }

        let status = waitpid(self.pid, Some(WaitPidFlag::WNOHANG))?;
        Ok(WorkerExit::from_status(status).map(|exit| self.finish(exit)))
    }

    /// Block until the worker exits and reap it
    pub fn wait(&mut self) -> Result<WorkerExit, Errno> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }

        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(exit) = WorkerExit::from_status(status) {
                        return Ok(self.finish(exit));
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Send SIGKILL; reap with [`WorkerHandle::wait`]
    pub fn kill(&self) -> Result<(), Errno> {
        if self.exit.is_some() {
            return Ok(());
        }
        kill(self.pid, Signal::SIGKILL)
    }

    fn finish(&mut self, exit: WorkerExit) -> WorkerExit {
        self.exit = Some(exit);
        self.state = WorkerState::Done;
        self.gate = None;

        match exit {
            WorkerExit::Completed => {
                info!(worker = %self.name, pid = self.pid.as_raw(), "Worker completed")
            }
            other => {
                warn!(worker = %self.name, pid = self.pid.as_raw(), exit = ?other, "Worker ended abnormally")
            }
        }
        exit
    }

    /// Kill and reap a worker that could not be confined
    fn abort(&mut self) {
        if let Err(e) = self.kill() {
            error!(pid = self.pid.as_raw(), error = %e, "Failed to kill unconfined worker");
            return;
        }
        if let Err(e) = self.wait() {
            error!(pid = self.pid.as_raw(), error = %e, "Failed to reap unconfined worker");
        }
    }
}

/// Demotes and pins a freshly forked worker
type Confinement = fn(Pid, CoreId) -> ControllerResult<()>;

/// Creates and confines worker processes
pub struct WorkerController {
    config: ControllerConfig,
    sink: Arc<dyn LogSink>,
    confinement: Confinement,
}

impl WorkerController {
    /// Controller writing records to the sink named in `config`
    pub fn new(config: ControllerConfig) -> Self {
        let sink = config.log_sink.build();
        Self::with_sink(config, sink)
    }

    /// Controller writing records to `sink`, ignoring `config.log_sink`
    pub fn with_sink(config: ControllerConfig, sink: Arc<dyn LogSink>) -> Self {
        Self {
            config,
            sink,
            confinement: demote_and_bind,
        }
    }

    #[cfg(test)]
    fn with_confinement(mut self, confinement: Confinement) -> Self {
        self.confinement = confinement;
        self
    }

    #[inline]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Fork a worker for `spec`, idle-class and pinned to `core`
    ///
    /// Input errors are reported before any process exists. Once forked, a
    /// failure to demote or pin kills and reaps the child and is fatal.
    pub fn spawn(&self, spec: WorkerSpec, core: CoreId) -> ControllerResult<WorkerHandle> {
        if spec.quanta == 0 {
            return Err(RecoverableError::InvalidQuantumCount { name: spec.name }.into());
        }
        affinity::validate_core(core)?;

        // SAFETY: the caller may be multi-threaded (test harnesses are) and the
        // child inherits only this thread. No other thread may hold the
        // allocator, stderr or tracing subscriber locks at the fork, since the
        // child allocates, writes to stderr and logs before it exits. The child
        // never returns from `run_worker`.
        match unsafe { fork() }.map_err(FatalError::ProcessCreationFailed)? {
            ForkResult::Child => self.run_worker(spec),
            ForkResult::Parent { child } => {
                let span = OperationSpan::new("confine", spec.name());
                span.record_pid(child.as_raw());
                let _entered = span.enter();
                self.confine(child, spec, core)
            }
        }
    }

    fn confine(&self, child: Pid, spec: WorkerSpec, core: CoreId) -> ControllerResult<WorkerHandle> {
        let WorkerSpec { name, quanta, gate } = spec;

        let mut handle = WorkerHandle {
            pid: child,
            name,
            core,
            quanta,
            granted: 0,
            gate: None,
            state: WorkerState::Created,
            exit: None,
        };

        if let Err(err) = (self.confinement)(child, core) {
            error!(worker = %handle.name, pid = child.as_raw(), core, error = %err, "Worker confinement failed");
            handle.abort();
            return Err(err);
        }
        handle.state = WorkerState::Bound;

        handle.gate = Some(gate.into_signal_end());
        handle.state = WorkerState::Ready;

        info!(worker = %handle.name, pid = child.as_raw(), core, quanta, "Worker created");
        Ok(handle)
    }

    fn run_worker(&self, spec: WorkerSpec) -> ! {
        let WorkerSpec { name, quanta, gate } = spec;
        let mut tokens = gate.into_wait_end();
        if let Err(e) = tokens.isolate() {
            warn!(pid = getpid().as_raw(), error = %e, "Failed to close inherited descriptors");
        }

        let lifecycle = WorkerLifecycle::new(name, getpid(), quanta, &self.config);
        let code = match lifecycle.run(&mut tokens, &RealtimeClock, self.sink.as_ref()) {
            Ok(_) => EXIT_SUCCESS,
            Err(e) => {
                error!(pid = getpid().as_raw(), error = %e, "Worker aborted");
                e.exit_code()
            }
        };

        drop(tokens);
        std::process::exit(code)
    }
}

fn demote_and_bind(pid: Pid, core: CoreId) -> ControllerResult<()> {
    priority::set_idle(pid).map_err(RecoverableError::escalate)?;
    affinity::bind(pid, core)
}
