use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::process::{Child, Command};
use sysinfo::{Pid, ProcessStatus, System};
use tracing::{debug, info, warn};

use super::handle::{ProcessControl, ProcessDescriptor, ProcessHandle, WorkerCommand};
use crate::error::SpawnError;

/// Process control backed by the OS process table.
///
/// Children spawned here are retained so their exit can be observed (and the
/// zombie reaped) with `try_wait`; everything else is looked up through
/// sysinfo and validated against its recorded start time.
pub struct SystemProcesses {
    spawned: Mutex<HashMap<u32, Child>>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            spawned: Mutex::new(HashMap::new()),
        }
    }

    fn is_gone(status: ProcessStatus) -> bool {
        matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
    }

    #[cfg(unix)]
    fn send_signal(pid: u32, signal: libc::c_int) {
        // 0 and anything that wraps negative would address a process group
        if pid == 0 || pid > i32::MAX as u32 {
            warn!("Refusing to signal invalid PID {}", pid);
            return;
        }

        let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                debug!("PID {} already gone", pid);
            } else {
                warn!("Failed to send signal {} to PID {}: {}", signal, pid, err);
            }
        }
    }

    #[cfg(not(unix))]
    fn send_signal(pid: u32, graceful: bool) {
        use sysinfo::Signal;

        let mut sys = System::new();
        let spid = Pid::from_u32(pid);
        if !sys.refresh_process(spid) {
            debug!("PID {} already gone", pid);
            return;
        }
        if let Some(process) = sys.process(spid) {
            let delivered = if graceful {
                process.kill_with(Signal::Term).unwrap_or_else(|| process.kill())
            } else {
                process.kill()
            };
            if !delivered {
                warn!("Failed to signal PID {}", pid);
            }
        }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SystemProcesses {
    fn spawn(&self, command: &WorkerCommand) -> Result<ProcessHandle, SpawnError> {
        let program = command.program.display().to_string();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        // Own process group, so a Ctrl-C in the panel's terminal does not reach the worker
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        // Give the worker its own console window, it logs upload progress there
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NEW_CONSOLE: u32 = 0x00000010;
            cmd.creation_flags(CREATE_NEW_CONSOLE);
        }

        let child = cmd.spawn().map_err(|e| SpawnError::from_io(&program, e))?;
        let pid = child.id();
        let started_at = self.describe(pid).and_then(|d| d.started_at);

        self.spawned.lock().insert(pid, child);
        info!("Spawned {} {:?} with PID {}", program, command.args, pid);

        Ok(ProcessHandle::launched(pid, started_at))
    }

    fn is_alive(&self, handle: &ProcessHandle) -> bool {
        if handle.launched_by_self {
            let mut spawned = self.spawned.lock();
            if let Some(child) = spawned.get_mut(&handle.pid) {
                let outcome = child.try_wait();
                match outcome {
                    Ok(None) => return true,
                    Ok(Some(status)) => {
                        info!("PID {} exited with {}", handle.pid, status);
                        spawned.remove(&handle.pid);
                        return false;
                    }
                    Err(e) => {
                        warn!("Error checking status of PID {}: {}", handle.pid, e);
                    }
                }
            }
        }

        self.describe(handle.pid)
            .map(|descriptor| handle.same_process(&descriptor))
            .unwrap_or(false)
    }

    fn describe(&self, pid: u32) -> Option<ProcessDescriptor> {
        let mut sys = System::new();
        let spid = Pid::from_u32(pid);
        if !sys.refresh_process(spid) {
            return None;
        }

        let process = sys.process(spid)?;
        if Self::is_gone(process.status()) {
            return None;
        }

        Some(ProcessDescriptor {
            pid,
            name: process.name().to_string(),
            exe: process.exe().map(|p| p.to_path_buf()),
            cmd: process.cmd().to_vec(),
            started_at: Some(process.start_time()),
        })
    }

    fn children(&self, handle: &ProcessHandle) -> Vec<ProcessHandle> {
        // A reused PID's children belong to someone else
        if !self.is_alive(handle) {
            debug!("PID {} is not the recorded process, no descendants", handle.pid);
            return Vec::new();
        }

        let mut sys = System::new();
        sys.refresh_processes();

        let mut by_parent: HashMap<u32, Vec<(u32, u64)>> = HashMap::new();
        for (pid, process) in sys.processes() {
            if Self::is_gone(process.status()) {
                continue;
            }
            if let Some(parent) = process.parent() {
                by_parent
                    .entry(parent.as_u32())
                    .or_default()
                    .push((pid.as_u32(), process.start_time()));
            }
        }

        let mut descendants = Vec::new();
        let mut seen = HashSet::from([handle.pid]);
        let mut queue = VecDeque::from([handle.pid]);
        while let Some(parent) = queue.pop_front() {
            let Some(kids) = by_parent.get(&parent) else {
                continue;
            };
            for &(pid, started_at) in kids {
                if seen.insert(pid) {
                    queue.push_back(pid);
                    descendants.push(ProcessHandle::adopted(pid, Some(started_at)));
                }
            }
        }

        debug!("PID {} has {} live descendants", handle.pid, descendants.len());
        descendants
    }

    fn signal_terminate(&self, handle: &ProcessHandle) {
        if !self.is_alive(handle) {
            debug!("Skipping SIGTERM for PID {}, no longer running", handle.pid);
            return;
        }

        #[cfg(unix)]
        Self::send_signal(handle.pid, libc::SIGTERM);

        #[cfg(not(unix))]
        Self::send_signal(handle.pid, true);
    }

    fn signal_kill(&self, handle: &ProcessHandle) {
        if handle.launched_by_self {
            if let Some(child) = self.spawned.lock().get_mut(&handle.pid) {
                if let Err(e) = child.kill() {
                    debug!("Kill of PID {} failed: {}", handle.pid, e);
                }
                return;
            }
        }

        if !self.is_alive(handle) {
            debug!("Skipping SIGKILL for PID {}, no longer running", handle.pid);
            return;
        }

        #[cfg(unix)]
        Self::send_signal(handle.pid, libc::SIGKILL);

        #[cfg(not(unix))]
        Self::send_signal(handle.pid, false);
    }
}
