use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why the worker could not be launched
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("worker executable or script not found: {0}")]
    NotFound(String),

    #[error("permission denied launching {0}")]
    Denied(String),

    #[error("failed to launch worker: {0}")]
    Other(#[source] io::Error),
}

impl SpawnError {
    /// Classifies a spawn failure for `what` (the program being launched)
    pub fn from_io(what: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => SpawnError::NotFound(what.to_string()),
            io::ErrorKind::PermissionDenied => SpawnError::Denied(what.to_string()),
            _ => SpawnError::Other(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write PID record {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove PID record {path:?}: {source}")]
    Clear {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("upload worker is already running (PID {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("upload settings incomplete, missing: {}", missing.join(", "))]
    NotConfigured { missing: Vec<&'static str> },

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not confirm termination of PIDs {pids:?}")]
    TerminationUnconfirmed { pids: Vec<u32> },
}
