use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::app;
use crate::error::SpawnError;
use crate::process::WorkerCommand;

/// Panel settings, read from `autoupload.config.json` in the working directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    /// PID record of the running worker
    pub pid_file: PathBuf,

    /// Upload settings consumed by the worker
    pub env_file: PathBuf,

    /// Directory holding `<name>.env` profiles
    pub profiles_dir: PathBuf,

    pub worker: WorkerSettings,

    /// Wait after SIGTERM before escalating to SIGKILL
    pub grace_period_ms: u64,

    /// Wait after SIGKILL before giving up on confirmation
    pub kill_confirm_ms: u64,

    /// Monitor loop tick
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Interpreter used for the worker and helper tools; looked up on PATH when unset
    pub interpreter: Option<PathBuf>,

    pub script: PathBuf,

    pub args: Vec<String>,

    /// Executable family an adopted PID must belong to (advisory)
    pub identity: Vec<String>,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            pid_file: PathBuf::from(app::PID_FILE),
            env_file: PathBuf::from(app::ENV_FILE),
            profiles_dir: PathBuf::from(app::PROFILES_DIR),
            worker: WorkerSettings::default(),
            grace_period_ms: app::GRACE_PERIOD_MS,
            kill_confirm_ms: app::KILL_CONFIRM_MS,
            poll_interval_ms: app::POLL_INTERVAL_MS,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            interpreter: None,
            script: PathBuf::from(app::WORKER_SCRIPT),
            args: Vec::new(),
            identity: vec!["python".to_string()],
        }
    }
}

impl PanelSettings {
    /// Load settings from `path`, falling back to defaults
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    info!("Loaded panel settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    warn!("Ignoring malformed settings file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read settings file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn kill_confirm(&self) -> Duration {
        Duration::from_millis(self.kill_confirm_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl WorkerSettings {
    /// Resolve the interpreter, falling back to the Python on PATH
    pub fn interpreter(&self) -> Result<PathBuf, SpawnError> {
        if let Some(interpreter) = &self.interpreter {
            return which::which(interpreter)
                .map_err(|_| SpawnError::NotFound(interpreter.display().to_string()));
        }

        let candidates: &[&str] = if cfg!(target_os = "windows") {
            &["python", "py"]
        } else {
            &["python3", "python"]
        };

        candidates
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| SpawnError::NotFound(candidates.join(" / ")))
    }

    /// Build the worker command line: `<interpreter> <script> [args...]`
    pub fn command(&self) -> Result<WorkerCommand, SpawnError> {
        if !self.script.exists() {
            return Err(SpawnError::NotFound(self.script.display().to_string()));
        }

        let program = self.interpreter()?;
        let mut args = vec![OsString::from(self.script.as_os_str())];
        args.extend(self.args.iter().map(OsString::from));

        Ok(WorkerCommand { program, args })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    #[default]
    Realtime,
    Schedule,
    Hybrid,
}

impl UploadMode {
    pub fn label(&self) -> &'static str {
        match self {
            UploadMode::Realtime => "real-time watch",
            UploadMode::Schedule => "scheduled",
            UploadMode::Hybrid => "real-time + scheduled",
        }
    }
}

impl FromStr for UploadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "realtime" => Ok(UploadMode::Realtime),
            "schedule" => Ok(UploadMode::Schedule),
            "hybrid" => Ok(UploadMode::Hybrid),
            other => Err(format!("unknown upload mode '{}'", other)),
        }
    }
}

pub const REQUIRED_KEYS: [&str; 4] = ["GITHUB_TOKEN", "GITHUB_USERNAME", "GITHUB_REPO", "WATCH_FOLDER"];
const MODE_KEY: &str = "UPLOAD_MODE";

/// Upload settings the worker needs before it can be started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub token: String,
    pub username: String,
    pub repo: String,
    pub watch_folder: String,
    pub mode: UploadMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigStatus {
    /// No `.env` file
    Missing,
    Unreadable(String),
    Incomplete { missing: Vec<&'static str> },
    Ready(UploadConfig),
}

impl ConfigStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ConfigStatus::Ready(_))
    }

    /// Keys that block a start, every required key when there is no usable file
    pub fn missing_keys(&self) -> Vec<&'static str> {
        match self {
            ConfigStatus::Ready(_) => Vec::new(),
            ConfigStatus::Incomplete { missing } => missing.clone(),
            ConfigStatus::Missing | ConfigStatus::Unreadable(_) => REQUIRED_KEYS.to_vec(),
        }
    }
}

impl UploadConfig {
    /// Read `env_file` without touching the process environment
    pub fn check(env_file: &Path) -> ConfigStatus {
        let entries = match dotenvy::from_path_iter(env_file) {
            Ok(entries) => entries,
            Err(e) if e.not_found() => return ConfigStatus::Missing,
            Err(e) => {
                warn!("Failed to read {:?}: {}", env_file, e);
                return ConfigStatus::Unreadable(e.to_string());
            }
        };

        let mut values = HashMap::new();
        for entry in entries {
            match entry {
                Ok((key, value)) => {
                    values.insert(key, value);
                }
                Err(e) => warn!("Skipping malformed line in {:?}: {}", env_file, e),
            }
        }

        Self::from_values(&values)
    }

    fn from_values(values: &HashMap<String, String>) -> ConfigStatus {
        let lookup = |key: &str| {
            values
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let missing: Vec<&'static str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|&key| lookup(key).is_none())
            .collect();
        if !missing.is_empty() {
            return ConfigStatus::Incomplete { missing };
        }

        let mode = match lookup(MODE_KEY) {
            None => UploadMode::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}, using realtime", e);
                UploadMode::default()
            }),
        };

        ConfigStatus::Ready(UploadConfig {
            token: lookup("GITHUB_TOKEN").unwrap_or_default(),
            username: lookup("GITHUB_USERNAME").unwrap_or_default(),
            repo: lookup("GITHUB_REPO").unwrap_or_default(),
            watch_folder: lookup("WATCH_FOLDER").unwrap_or_default(),
            mode,
        })
    }
}
