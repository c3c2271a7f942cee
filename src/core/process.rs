//! Process supervision - Launching, probing and terminating the mining software

use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, error, info, warn};

use super::error::{Error, Result};
use super::miner::LaunchSpec;
use super::retry::{BoundedRetry, Sleeper};
use crate::platform;

/// Kill attempts after the first signal before giving up on a worker
pub const MAX_KILL_ATTEMPTS: u32 = 1000;

/// Pause between kill attempts
pub const KILL_BACKOFF: Duration = Duration::from_secs(10);

/// The operating system side of supervision
pub trait ProcessBackend {
    /// Start a process and return its pid
    fn spawn(&mut self, spec: &LaunchSpec) -> Result<u32>;

    /// Whether `pid` still refers to a live process
    fn is_alive(&mut self, pid: u32) -> bool;

    /// Send a kill signal and wait for the process to be reaped
    fn kill(&mut self, pid: u32);
}

/// The one child this backend started
struct Worker {
    child: Child,
    exit: Option<ExitStatus>,
}

impl Worker {
    fn pid(&self) -> u32 {
        self.child.id()
    }
}

/// Real processes, probed through `sysinfo`
pub struct OsProcesses {
    system: System,
    worker: Option<Worker>,
}

impl OsProcesses {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            worker: None,
        }
    }

    fn worker_mut(&mut self, pid: u32) -> Option<&mut Worker> {
        self.worker.as_mut().filter(|w| w.pid() == pid)
    }

    /// Ask the OS whether the pid is in the process table and not a zombie
    fn os_reports_alive(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new(),
        );
        match self.system.process(pid) {
            Some(process) => process.status() != ProcessStatus::Zombie,
            None => false,
        }
    }
}

impl Default for OsProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessBackend for OsProcesses {
    fn spawn(&mut self, spec: &LaunchSpec) -> Result<u32> {
        let mut cmd = Command::new(&spec.path);

        // The software sees its display name as argv[0]
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.arg0(spec.display_name());
        }

        cmd.args(spec.arguments());

        let child = cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| Error::Spawn {
                path: spec.path.clone(),
                source,
            })?;

        let pid = child.id();
        self.worker = Some(Worker { child, exit: None });
        Ok(pid)
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        if let Some(worker) = self.worker_mut(pid) {
            if worker.exit.is_some() {
                return false;
            }
            match worker.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Process {} exited with {}", pid, status);
                    worker.exit = Some(status);
                    return false;
                }
                Ok(None) => {}
                Err(e) => warn!("Error checking process status: {}", e),
            }
        }
        self.os_reports_alive(pid)
    }

    fn kill(&mut self, pid: u32) {
        let Some(worker) = self.worker_mut(pid) else {
            if let Err(e) = platform::kill_process(pid) {
                debug!("Kill signal for process {} failed: {}", pid, e);
            }
            return;
        };

        // A reaped pid may already belong to another process
        if worker.exit.is_some() {
            debug!("Process {} already exited, nothing to kill", pid);
            return;
        }

        if let Err(e) = worker.child.kill() {
            debug!("Kill signal for process {} failed: {}", pid, e);
        }
        match worker.child.wait() {
            Ok(status) => worker.exit = Some(status),
            Err(e) => warn!("Failed to wait for process {}: {}", pid, e),
        }
    }
}

impl Drop for OsProcesses {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            if worker.exit.is_none() {
                info!("Stopping mining process {} on shutdown", worker.pid());
                let _ = worker.child.kill();
                let _ = worker.child.wait();
            }
        }
    }
}

/// Lifecycle of the supervised worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No worker process
    Stopped,
    /// Worker was launched and last seen alive
    Running { pid: u32 },
    /// Worker disappeared without being asked to
    Crashed { pid: u32 },
    /// Termination in progress
    StopRequested { pid: u32 },
}

impl WorkerState {
    pub fn pid(&self) -> Option<u32> {
        match *self {
            Self::Stopped => None,
            Self::Running { pid } | Self::Crashed { pid } | Self::StopRequested { pid } => {
                Some(pid)
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Running { .. } => "Running",
            Self::Crashed { .. } => "Crashed",
            Self::StopRequested { .. } => "Stopping",
        }
    }
}

/// Owns the single worker process slot
pub struct Supervisor<B, S> {
    backend: B,
    sleeper: S,
    retry: BoundedRetry,
    state: WorkerState,
}

impl<B: ProcessBackend, S: Sleeper> Supervisor<B, S> {
    pub fn new(backend: B, sleeper: S) -> Self {
        Self {
            backend,
            sleeper,
            retry: BoundedRetry::new(MAX_KILL_ATTEMPTS, KILL_BACKOFF),
            state: WorkerState::Stopped,
        }
    }

    /// Replace the kill retry budget
    #[cfg(test)]
    pub fn with_retry(mut self, retry: BoundedRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Start the worker. Any worker still recorded is terminated first so at
    /// most one child exists.
    pub fn launch(&mut self, spec: &LaunchSpec) -> Result<u32> {
        if self.state != WorkerState::Stopped {
            warn!(
                "Launch requested while worker is {}; terminating it first",
                self.state.label()
            );
            self.terminate()?;
        }

        info!(
            "Starting mining software {:?} with {:?}",
            spec.path, spec.args
        );
        let pid = self.backend.spawn(spec)?;
        info!("Spawned mining process with PID {}", pid);
        self.state = WorkerState::Running { pid };
        Ok(pid)
    }

    /// Check whether the worker is still alive
    pub fn probe(&mut self) -> bool {
        let WorkerState::Running { pid } = self.state else {
            return false;
        };
        if self.backend.is_alive(pid) {
            true
        } else {
            warn!("Mining process {} is no longer running", pid);
            self.state = WorkerState::Crashed { pid };
            false
        }
    }

    /// Kill the worker and make sure it is gone
    ///
    /// After the first kill the pid is probed again; a survivor is killed
    /// again every [`KILL_BACKOFF`] up to [`MAX_KILL_ATTEMPTS`] times before
    /// this gives up with [`Error::Unkillable`].
    pub fn terminate(&mut self) -> Result<()> {
        let Some(pid) = self.state.pid() else {
            return Ok(());
        };

        info!("Stopping mining process {}", pid);
        self.state = WorkerState::StopRequested { pid };
        self.backend.kill(pid);

        if self.backend.is_alive(pid) {
            let outcome = self.retry.run(
                &self.sleeper,
                &mut self.backend,
                |backend, attempt| {
                    warn!(
                        "Previous mining process has not stopped. Attempting to kill the \
                         process again (attempt {})...",
                        attempt
                    );
                    backend.kill(pid);
                },
                |backend| !backend.is_alive(pid),
            );

            if let Err(exhausted) = outcome {
                error!(
                    "Unable to close mining process {} after {} attempts",
                    pid, exhausted.attempts
                );
                return Err(Error::Unkillable {
                    pid,
                    attempts: exhausted.attempts,
                });
            }
        }

        info!("Mining process {} stopped", pid);
        self.state = WorkerState::Stopped;
        Ok(())
    }

    /// Terminate whatever is running and launch `spec`
    pub fn respawn(&mut self, spec: &LaunchSpec) -> Result<u32> {
        self.terminate()?;
        self.launch(spec)
    }
}
