//! In-memory process table for driving the supervisor in tests

use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::handle::{ProcessControl, ProcessDescriptor, ProcessHandle, WorkerCommand};
use crate::error::SpawnError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Terminate(u32),
    Kill(u32),
}

#[derive(Debug, Clone)]
struct FakeProcess {
    name: String,
    cmd: Vec<String>,
    parent: Option<u32>,
    started_at: u64,
    alive: bool,
    ignores_terminate: bool,
    ignores_kill: bool,
}

impl FakeProcess {
    fn new(name: &str, parent: Option<u32>, started_at: u64) -> Self {
        Self {
            name: name.to_string(),
            cmd: Vec::new(),
            parent,
            started_at,
            alive: true,
            ignores_terminate: false,
            ignores_kill: false,
        }
    }
}

#[derive(Default)]
struct Table {
    processes: BTreeMap<u32, FakeProcess>,
    next_pid: u32,
    spawn_failure: Option<fn() -> SpawnError>,
    worker_children: Vec<(String, bool)>,
    signals: Vec<Sent>,
    spawned: usize,
}

pub struct FakeProcesses {
    table: Mutex<Table>,
    worker_name: String,
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                next_pid: 4242,
                ..Table::default()
            }),
            worker_name: "python3".to_string(),
        }
    }

    /// Every spawned worker forks these helpers: (name, ignores SIGTERM)
    pub fn with_worker_children(self, children: &[(&str, bool)]) -> Self {
        self.table.lock().worker_children = children
            .iter()
            .map(|(name, stubborn)| (name.to_string(), *stubborn))
            .collect();
        self
    }

    pub fn fail_spawn_with(&self, failure: fn() -> SpawnError) {
        self.table.lock().spawn_failure = Some(failure);
    }

    /// Put a process not started by the supervisor into the table, command line unknown
    pub fn insert(&self, pid: u32, name: &str) {
        self.insert_with_cmd(pid, name, &[]);
    }

    pub fn insert_with_cmd(&self, pid: u32, name: &str, cmd: &[&str]) {
        let mut process = FakeProcess::new(name, Some(1), 1_000 + pid as u64);
        process.cmd = cmd.iter().map(|arg| arg.to_string()).collect();
        self.table.lock().processes.insert(pid, process);
    }

    /// The OS hands `pid` to a new, unrelated process
    pub fn reuse_pid(&self, pid: u32, name: &str) {
        let mut table = self.table.lock();
        let started_at = table
            .processes
            .get(&pid)
            .map(|p| p.started_at + 10_000)
            .unwrap_or(90_000 + pid as u64);
        table
            .processes
            .insert(pid, FakeProcess::new(name, Some(1), started_at));
    }

    pub fn insert_child(&self, pid: u32, parent: u32, name: &str) {
        self.table
            .lock()
            .processes
            .insert(pid, FakeProcess::new(name, Some(parent), 2_000 + pid as u64));
    }

    /// Ignores SIGTERM, still dies on SIGKILL
    pub fn make_stubborn(&self, pid: u32) {
        if let Some(p) = self.table.lock().processes.get_mut(&pid) {
            p.ignores_terminate = true;
        }
    }

    pub fn make_unkillable(&self, pid: u32) {
        if let Some(p) = self.table.lock().processes.get_mut(&pid) {
            p.ignores_terminate = true;
            p.ignores_kill = true;
        }
    }

    /// Out-of-band death, as if the operator killed it
    pub fn kill_externally(&self, pid: u32) {
        if let Some(p) = self.table.lock().processes.get_mut(&pid) {
            p.alive = false;
        }
    }

    pub fn alive(&self, pid: u32) -> bool {
        self.table
            .lock()
            .processes
            .get(&pid)
            .map(|p| p.alive)
            .unwrap_or(false)
    }

    pub fn live_pids(&self) -> Vec<u32> {
        self.table
            .lock()
            .processes
            .iter()
            .filter(|(_, p)| p.alive)
            .map(|(pid, _)| *pid)
            .collect()
    }

    pub fn signals(&self) -> Vec<Sent> {
        self.table.lock().signals.clone()
    }

    pub fn signalled(&self, pid: u32) -> bool {
        self.signals()
            .iter()
            .any(|s| matches!(s, Sent::Terminate(p) | Sent::Kill(p) if *p == pid))
    }

    pub fn spawn_count(&self) -> usize {
        self.table.lock().spawned
    }

    fn deliver(&self, handle: &ProcessHandle, sent: Sent) {
        // Same identity re-check as the OS-backed implementation
        if !self.is_alive(handle) {
            return;
        }

        let mut table = self.table.lock();
        table.signals.push(sent);
        if let Some(p) = table.processes.get_mut(&handle.pid) {
            let ignored = match sent {
                Sent::Terminate(_) => p.ignores_terminate,
                Sent::Kill(_) => p.ignores_kill,
            };
            if !ignored {
                p.alive = false;
            }
        }
    }
}

impl ProcessControl for FakeProcesses {
    fn spawn(&self, command: &WorkerCommand) -> Result<ProcessHandle, SpawnError> {
        let mut table = self.table.lock();
        if let Some(failure) = table.spawn_failure {
            return Err(failure());
        }

        let pid = table.next_pid;
        let started_at = 5_000 + pid as u64;
        let mut worker = FakeProcess::new(&self.worker_name, Some(std::process::id()), started_at);
        worker.cmd = std::iter::once(command.program.display().to_string())
            .chain(command.args.iter().map(|arg| arg.to_string_lossy().into_owned()))
            .collect();
        table.processes.insert(pid, worker);

        let helpers = table.worker_children.clone();
        for (offset, (name, stubborn)) in helpers.into_iter().enumerate() {
            let mut child = FakeProcess::new(&name, Some(pid), started_at + 1);
            child.ignores_terminate = stubborn;
            table.processes.insert(pid + 1 + offset as u32, child);
        }
        table.next_pid = pid + 100;
        table.spawned += 1;

        Ok(ProcessHandle::launched(pid, Some(started_at)))
    }

    fn is_alive(&self, handle: &ProcessHandle) -> bool {
        self.describe(handle.pid)
            .map(|d| handle.same_process(&d))
            .unwrap_or(false)
    }

    fn describe(&self, pid: u32) -> Option<ProcessDescriptor> {
        let table = self.table.lock();
        let p = table.processes.get(&pid).filter(|p| p.alive)?;
        Some(ProcessDescriptor {
            pid,
            name: p.name.clone(),
            exe: None,
            cmd: p.cmd.clone(),
            started_at: Some(p.started_at),
        })
    }

    fn children(&self, handle: &ProcessHandle) -> Vec<ProcessHandle> {
        if !self.is_alive(handle) {
            return Vec::new();
        }

        let table = self.table.lock();
        let mut found = Vec::new();
        let mut frontier = vec![handle.pid];
        while let Some(parent) = frontier.pop() {
            for (pid, p) in &table.processes {
                if p.alive && p.parent == Some(parent) {
                    frontier.push(*pid);
                    found.push(ProcessHandle::adopted(*pid, Some(p.started_at)));
                }
            }
        }
        found
    }

    fn signal_terminate(&self, handle: &ProcessHandle) {
        self.deliver(handle, Sent::Terminate(handle.pid));
    }

    fn signal_kill(&self, handle: &ProcessHandle) {
        self.deliver(handle, Sent::Kill(handle.pid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reused_pid_is_neither_signalled_nor_walked() {
        let processes = FakeProcesses::new();
        processes.insert(5000, "python3");
        let stale = ProcessHandle::adopted(5000, Some(6_000));

        processes.reuse_pid(5000, "bash");
        processes.insert_child(5001, 5000, "vim");

        assert!(!processes.is_alive(&stale));
        assert!(processes.children(&stale).is_empty());

        processes.signal_terminate(&stale);
        processes.signal_kill(&stale);
        assert!(processes.signals().is_empty());
        assert_eq!(processes.live_pids(), vec![5000, 5001]);
    }
}
