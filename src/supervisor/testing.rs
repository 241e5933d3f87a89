//! Supervisor wired to the in-memory process table and a scratch directory

use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use super::Supervisor;
use crate::config::{PanelSettings, WorkerSettings};
use crate::events::{self, EventReceiver, PanelEvent, WorkerEvent};
use crate::process::fake::FakeProcesses;

pub(crate) const COMPLETE_ENV: &str =
    "GITHUB_TOKEN=ghp_abc\nGITHUB_USERNAME=octo\nGITHUB_REPO=solutions\nWATCH_FOLDER=/home/octo/algo\n";

pub(crate) struct Harness {
    pub dir: TempDir,
    pub processes: Arc<FakeProcesses>,
    pub supervisor: Arc<Supervisor>,
    pub events: EventReceiver,
}

pub(crate) fn settings_in(dir: &TempDir) -> PanelSettings {
    PanelSettings {
        pid_file: dir.path().join("upload_process.pid"),
        env_file: dir.path().join(".env"),
        profiles_dir: dir.path().join("profiles"),
        worker: WorkerSettings {
            // Any existing executable resolves; the fake never runs it
            interpreter: std::env::current_exe().ok(),
            script: dir.path().join("main_upload.py"),
            ..WorkerSettings::default()
        },
        grace_period_ms: 200,
        kill_confirm_ms: 200,
        poll_interval_ms: 50,
    }
}

pub(crate) fn harness() -> Harness {
    harness_with(FakeProcesses::new(), |_| {})
}

pub(crate) fn harness_with(
    processes: FakeProcesses,
    customize: impl FnOnce(&mut PanelSettings),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(".env"), COMPLETE_ENV).unwrap();
    fs::write(dir.path().join("main_upload.py"), "# worker\n").unwrap();

    let mut settings = settings_in(&dir);
    customize(&mut settings);

    let processes = Arc::new(processes);
    let (tx, events) = events::channel();
    let supervisor = Arc::new(Supervisor::new(&settings, processes.clone(), tx));

    Harness {
        dir,
        processes,
        supervisor,
        events,
    }
}

/// Drain the worker events posted so far
pub(crate) fn worker_events(events: &mut EventReceiver) -> Vec<WorkerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PanelEvent::Worker(event) = event {
            drained.push(event);
        }
    }
    drained
}
