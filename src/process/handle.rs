use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::SpawnError;

/// A process believed to be the worker, or one of its descendants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    /// True when this instance spawned it, false when adopted or enumerated
    pub launched_by_self: bool,
    /// OS start time (seconds since the epoch) used to tell a reused PID apart
    pub started_at: Option<u64>,
}

impl ProcessHandle {
    pub fn launched(pid: u32, started_at: Option<u64>) -> Self {
        Self {
            pid,
            launched_by_self: true,
            started_at,
        }
    }

    pub fn adopted(pid: u32, started_at: Option<u64>) -> Self {
        Self {
            pid,
            launched_by_self: false,
            started_at,
        }
    }

    /// Whether `descriptor` still describes the process this handle was taken from
    pub fn same_process(&self, descriptor: &ProcessDescriptor) -> bool {
        if descriptor.pid != self.pid {
            return false;
        }
        match (self.started_at, descriptor.started_at) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        }
    }
}

/// Best-effort description of a live process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    pub pid: u32,
    pub name: String,
    pub exe: Option<PathBuf>,
    /// Empty when the OS does not expose it (e.g. another user's process)
    pub cmd: Vec<String>,
    pub started_at: Option<u64>,
}

impl ProcessDescriptor {
    /// Advisory identity check: the process name or executable file name
    /// contains one of `families` (case-insensitive). An empty list matches anything.
    pub fn matches_family(&self, families: &[String]) -> bool {
        if families.is_empty() {
            return true;
        }

        let name = self.name.to_lowercase();
        let exe_name = self
            .exe
            .as_ref()
            .and_then(|exe| exe.file_name())
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        families.iter().map(|f| f.to_lowercase()).any(|family| {
            !family.is_empty() && (name.contains(&family) || exe_name.contains(&family))
        })
    }

    /// Whether the command line names `script`. An unknown command line passes,
    /// since the family check has already narrowed the candidates.
    pub fn runs_script(&self, script: &Path) -> bool {
        let Some(wanted) = script.file_name() else {
            return true;
        };
        self.cmd.is_empty()
            || self
                .cmd
                .iter()
                .any(|arg| Path::new(arg).file_name() == Some(wanted))
    }
}

/// Fully resolved worker command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

/// OS process operations the supervisor relies on.
///
/// Signalling is best-effort and idempotent: a target that is already gone is
/// a no-op, not an error.
pub trait ProcessControl: Send + Sync {
    fn spawn(&self, command: &WorkerCommand) -> Result<ProcessHandle, SpawnError>;

    /// Non-blocking liveness check, false once the PID belongs to someone else
    fn is_alive(&self, handle: &ProcessHandle) -> bool;

    fn describe(&self, pid: u32) -> Option<ProcessDescriptor>;

    /// Live descendants of `handle` at the moment of the call
    fn children(&self, handle: &ProcessHandle) -> Vec<ProcessHandle>;

    fn signal_terminate(&self, handle: &ProcessHandle);

    fn signal_kill(&self, handle: &ProcessHandle);
}
