use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Durable record of the PID the supervisor believes is the worker.
///
/// Presence of the record never implies the process is alive; callers
/// re-validate before trusting it.
#[derive(Debug, Clone)]
pub struct PidStore {
    path: PathBuf,
}

impl PidStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Replace the record atomically: temp file, fsync, rename
    pub fn write(&self, pid: u32) -> Result<(), StoreError> {
        let tmp = self.temp_path();
        let result = (|| -> io::Result<()> {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&tmp)?;
            file.write_all(pid.to_string().as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        match result {
            Ok(()) => {
                info!("Recorded worker PID {} in {:?}", pid, self.path);
                Ok(())
            }
            Err(source) => {
                let _ = fs::remove_file(&tmp);
                Err(StoreError::Write {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    /// The recorded PID; absent, unreadable and corrupt records all read as `None`
    pub fn read(&self) -> Option<u32> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read PID record {:?}: {}", self.path, e);
                return None;
            }
        };

        match contents.trim().parse::<u32>() {
            Ok(pid) if pid > 0 => Some(pid),
            _ => {
                warn!(
                    "PID record {:?} is corrupt ({:?}), treating as absent",
                    self.path,
                    contents.trim()
                );
                None
            }
        }
    }

    /// Remove the record; already absent is success
    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Cleared PID record {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Clear {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
