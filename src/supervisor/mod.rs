/// Upload worker supervision
/// - start/stop/adopt state machine over a single worker process
/// - process-tree shutdown: descendants snapshotted first, SIGTERM, bounded wait, SIGKILL
/// - PID record kept in step with the running state so supervision survives a restart
///
/// The state lock is only held to copy or replace the state, never across a
/// spawn, signal or wait. Operations are sequenced by a separate guard that
/// the monitor never waits on: a tick that finds an operation in flight is
/// skipped.

pub mod monitor;

#[cfg(test)]
pub(crate) mod testing;

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStatus, PanelSettings, UploadConfig, WorkerSettings};
use crate::error::{StoreError, SupervisorError};
use crate::events::{ChangeCause, EventSender, PanelEvent, WorkerEvent, WorkerStatus};
use crate::pid_store::PidStore;
use crate::process::{ProcessControl, ProcessHandle};

pub use monitor::spawn_monitor;

// Liveness polling step while waiting for a terminated tree to exit
const EXIT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct SupervisorState {
    handle: Option<ProcessHandle>,
    status: WorkerStatus,
}

/// Copy of the supervisor state handed out to readers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub status: WorkerStatus,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    AlreadyStopped,
    /// `forced` is set when part of the tree needed SIGKILL
    Stopped { pid: u32, forced: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdoptOutcome {
    AlreadySupervising { pid: Option<u32> },
    NothingRecorded,
    /// Recorded PID no longer exists
    StaleRecord { pid: u32 },
    /// Recorded PID was reused by something that is not the worker
    UnrelatedProcess { pid: u32, name: String },
    Adopted { pid: u32 },
}

pub struct Supervisor {
    processes: Arc<dyn ProcessControl>,
    store: PidStore,
    worker: WorkerSettings,
    env_file: PathBuf,
    grace_period: Duration,
    kill_confirm: Duration,
    operation: tokio::sync::Mutex<()>,
    state: Mutex<SupervisorState>,
    events: EventSender,
}

impl Supervisor {
    pub fn new(
        settings: &PanelSettings,
        processes: Arc<dyn ProcessControl>,
        events: EventSender,
    ) -> Self {
        Self {
            processes,
            store: PidStore::new(settings.pid_file.clone()),
            worker: settings.worker.clone(),
            env_file: settings.env_file.clone(),
            grace_period: settings.grace_period(),
            kill_confirm: settings.kill_confirm(),
            operation: tokio::sync::Mutex::new(()),
            state: Mutex::new(SupervisorState {
                handle: None,
                status: WorkerStatus::Stopped,
            }),
            events,
        }
    }

    /// Current status without waiting for an in-flight operation
    pub fn status(&self) -> WorkerSnapshot {
        let state = self.state.lock();
        WorkerSnapshot {
            status: state.status,
            pid: state.handle.as_ref().map(|h| h.pid),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status().status == WorkerStatus::Running
    }

    /// Whether the upload settings allow a start
    pub fn config_status(&self) -> ConfigStatus {
        UploadConfig::check(&self.env_file)
    }

    pub fn store(&self) -> &PidStore {
        &self.store
    }

    /// The supervised handle, if the worker is believed to be running
    fn running_handle(&self) -> Option<ProcessHandle> {
        let state = self.state.lock();
        match (state.status, state.handle.as_ref()) {
            (WorkerStatus::Running, Some(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    fn transition(&self, status: WorkerStatus, handle: Option<ProcessHandle>, cause: ChangeCause) {
        let pid = handle.as_ref().map(|h| h.pid);
        {
            let mut state = self.state.lock();
            state.status = status;
            state.handle = handle;
        }

        // The panel may already be gone during shutdown
        let _ = self
            .events
            .send(PanelEvent::Worker(WorkerEvent::new(status, pid, cause)));
    }

    /// Launch the worker and record its PID
    pub async fn start(&self) -> Result<u32, SupervisorError> {
        let _operation = self.operation.lock().await;

        if let Some(handle) = self.running_handle() {
            warn!("Start requested while worker PID {} is running", handle.pid);
            return Err(SupervisorError::AlreadyRunning { pid: handle.pid });
        }

        let config = self.config_status();
        if !config.is_ready() {
            return Err(SupervisorError::NotConfigured {
                missing: config.missing_keys(),
            });
        }

        let command = self.worker.command()?;
        let handle = self.processes.spawn(&command).map_err(|e| {
            error!("Failed to start upload worker: {}", e);
            e
        })?;

        if let Err(e) = self.store.write(handle.pid) {
            error!("Could not record worker PID {}, killing it: {}", handle.pid, e);
            self.processes.signal_kill(&handle);
            return Err(e.into());
        }

        let pid = handle.pid;
        self.transition(WorkerStatus::Running, Some(handle), ChangeCause::Started);
        info!("Upload worker started (PID: {})", pid);
        Ok(pid)
    }

    /// Terminate the worker and its descendants; no-op when nothing is running
    pub async fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        let _operation = self.operation.lock().await;

        let Some(handle) = self.running_handle() else {
            return Ok(StopOutcome::AlreadyStopped);
        };

        // Exited, or the PID now belongs to another process: walking its tree
        // would reach processes that were never ours
        if !self.processes.is_alive(&handle) {
            info!("Worker PID {} already exited, nothing to terminate", handle.pid);
            self.store.clear()?;
            self.transition(WorkerStatus::Stopped, None, ChangeCause::ExitedExternally);
            return Ok(StopOutcome::AlreadyStopped);
        }

        self.transition(
            WorkerStatus::Stopping,
            Some(handle.clone()),
            ChangeCause::StopRequested,
        );

        let (survivors, forced) = self.terminate_tree(&handle).await;
        let unconfirmed: Vec<u32> = survivors.iter().map(|h| h.pid).collect();

        if unconfirmed.contains(&handle.pid) {
            error!(
                "Worker PID {} survived SIGKILL, still supervising it",
                handle.pid
            );
            self.transition(WorkerStatus::Running, Some(handle), ChangeCause::StopFailed);
            return Err(SupervisorError::TerminationUnconfirmed { pids: unconfirmed });
        }

        let cleared = self.store.clear();
        self.transition(WorkerStatus::Stopped, None, ChangeCause::Stopped);
        info!("Upload worker stopped (PID: {})", handle.pid);

        if let Err(e) = cleared {
            error!("Worker stopped but its PID record remains: {}", e);
            return Err(e.into());
        }
        if !unconfirmed.is_empty() {
            error!("Descendants {:?} of worker did not exit", unconfirmed);
            return Err(SupervisorError::TerminationUnconfirmed { pids: unconfirmed });
        }

        Ok(StopOutcome::Stopped {
            pid: handle.pid,
            forced,
        })
    }

    /// Resume supervision of a worker left running by a previous session
    pub async fn adopt_from_store(&self) -> Result<AdoptOutcome, SupervisorError> {
        let _operation = self.operation.lock().await;

        let current = self.status();
        if current.status != WorkerStatus::Stopped {
            return Ok(AdoptOutcome::AlreadySupervising { pid: current.pid });
        }

        let Some(pid) = self.store.read() else {
            // Also removes a corrupt record
            self.store.clear()?;
            return Ok(AdoptOutcome::NothingRecorded);
        };

        let Some(descriptor) = self.processes.describe(pid) else {
            info!("Recorded worker PID {} is gone, clearing stale record", pid);
            self.store.clear()?;
            return Ok(AdoptOutcome::StaleRecord { pid });
        };

        if !descriptor.matches_family(&self.worker.identity)
            || !descriptor.runs_script(&self.worker.script)
        {
            warn!(
                "Recorded PID {} now belongs to unrelated process '{}', leaving it alone",
                pid, descriptor.name
            );
            self.store.clear()?;
            return Ok(AdoptOutcome::UnrelatedProcess {
                pid,
                name: descriptor.name,
            });
        }

        let handle = ProcessHandle::adopted(pid, descriptor.started_at);
        if !self.processes.is_alive(&handle) {
            self.store.clear()?;
            return Ok(AdoptOutcome::StaleRecord { pid });
        }

        self.transition(WorkerStatus::Running, Some(handle), ChangeCause::Adopted);
        info!("Adopted running upload worker (PID: {})", pid);
        Ok(AdoptOutcome::Adopted { pid })
    }

    /// One monitor tick: notice a worker that exited on its own.
    /// Returns true when a transition to `Stopped` happened.
    pub async fn reconcile(&self) -> Result<bool, StoreError> {
        // An operation in flight owns the worker; look again next tick
        let Ok(_operation) = self.operation.try_lock() else {
            debug!("Supervisor operation in progress, skipping liveness check");
            return Ok(false);
        };

        let Some(handle) = self.running_handle() else {
            return Ok(false);
        };

        if self.processes.is_alive(&handle) {
            return Ok(false);
        }

        // State stays Running until the record is gone, so a failed clear is retried
        self.store.clear()?;
        self.transition(WorkerStatus::Stopped, None, ChangeCause::ExitedExternally);
        info!("Upload worker (PID: {}) exited, status updated", handle.pid);
        Ok(true)
    }

    /// Returns the members still alive after SIGKILL, and whether SIGKILL was needed
    async fn terminate_tree(&self, root: &ProcessHandle) -> (Vec<ProcessHandle>, bool) {
        // Children first: once the parent dies they may no longer be discoverable
        let mut tree = self.processes.children(root);
        info!(
            "Stopping worker PID {} and {} descendant(s)",
            root.pid,
            tree.len()
        );

        for child in &tree {
            self.processes.signal_terminate(child);
        }
        self.processes.signal_terminate(root);
        tree.push(root.clone());

        let remaining = self.wait_for_exit(tree, self.grace_period).await;
        if remaining.is_empty() {
            return (remaining, false);
        }

        warn!(
            "PIDs {:?} still running after {:?}, sending SIGKILL",
            remaining.iter().map(|h| h.pid).collect::<Vec<_>>(),
            self.grace_period
        );
        for member in &remaining {
            self.processes.signal_kill(member);
        }

        (self.wait_for_exit(remaining, self.kill_confirm).await, true)
    }

    async fn wait_for_exit(
        &self,
        mut pending: Vec<ProcessHandle>,
        timeout: Duration,
    ) -> Vec<ProcessHandle> {
        let deadline = Instant::now() + timeout;
        loop {
            pending.retain(|member| self.processes.is_alive(member));

            let now = Instant::now();
            if pending.is_empty() || now >= deadline {
                return pending;
            }
            tokio::time::sleep(EXIT_POLL.min(deadline - now)).await;
        }
    }
}
