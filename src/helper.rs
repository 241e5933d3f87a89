use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::WorkerSettings;
use crate::error::SpawnError;
use crate::events::{EventSender, PanelEvent};

/// Launches auxiliary tool windows (setup, problem browser) as independent processes
pub struct HelperLauncher {
    worker: WorkerSettings,
    base_dir: PathBuf,
    events: EventSender,
}

impl HelperLauncher {
    pub fn new(worker: WorkerSettings, base_dir: impl Into<PathBuf>, events: EventSender) -> Self {
        Self {
            worker,
            base_dir: base_dir.into(),
            events,
        }
    }

    /// Fire and forget
    pub fn open(&self, script: &str) -> Result<u32, SpawnError> {
        self.launch(script, false)
    }

    /// Launch and post `HelperExited` once the tool closes
    pub fn open_and_wait(&self, script: &str) -> Result<u32, SpawnError> {
        self.launch(script, true)
    }

    fn launch(&self, script: &str, notify: bool) -> Result<u32, SpawnError> {
        let path = self.base_dir.join(script);
        if !path.is_file() {
            return Err(SpawnError::NotFound(path.display().to_string()));
        }

        let interpreter = self.worker.interpreter()?;
        let mut child = Command::new(&interpreter)
            .arg(&path)
            .current_dir(&self.base_dir)
            .spawn()
            .map_err(|e| SpawnError::from_io(script, e))?;
        let pid = child.id().unwrap_or_default();
        info!("Opened helper {} (PID: {})", script, pid);

        // Always reaped; only reported when the caller asked
        let events = self.events.clone();
        let helper = script.to_string();
        tokio::spawn(async move {
            let success = match child.wait().await {
                Ok(status) => {
                    debug!("Helper {} exited with {}", helper, status);
                    status.success()
                }
                Err(e) => {
                    warn!("Failed waiting for helper {}: {}", helper, e);
                    false
                }
            };
            if notify {
                let _ = events.send(PanelEvent::HelperExited { helper, success });
            }
        });

        Ok(pid)
    }
}
