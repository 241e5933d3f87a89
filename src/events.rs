use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::mpsc;

/// Lifecycle status of the upload worker as seen by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Running => "running",
            WorkerStatus::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Started,
    Adopted,
    StopRequested,
    /// Termination could not be confirmed, the worker is still supervised
    StopFailed,
    Stopped,
    ExitedExternally,
}

/// Immutable snapshot posted whenever the worker status changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEvent {
    pub status: WorkerStatus,
    pub pid: Option<u32>,
    pub cause: ChangeCause,
    pub at: DateTime<Utc>,
}

impl WorkerEvent {
    pub fn new(status: WorkerStatus, pid: Option<u32>, cause: ChangeCause) -> Self {
        Self {
            status,
            pid,
            cause,
            at: Utc::now(),
        }
    }
}

/// Messages consumed by the foreground panel task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    Worker(WorkerEvent),
    HelperExited { helper: String, success: bool },
}

pub type EventSender = mpsc::UnboundedSender<PanelEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PanelEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
