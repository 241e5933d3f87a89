use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::app::PROFILE_EXTENSION;

/// Outcome of switching to a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub success: bool,
    pub message: String,
}

impl Activation {
    fn ok(message: String) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

/// Named upload configurations the operator can switch between
pub trait ProfileProvider: Send + Sync {
    fn list_profiles(&self) -> Vec<String>;

    fn activate(&self, name: &str) -> Activation;
}

/// Profiles stored as `<dir>/<name>.env`; activation replaces the live `.env`
#[derive(Debug, Clone)]
pub struct EnvProfiles {
    dir: PathBuf,
    env_file: PathBuf,
}

impl EnvProfiles {
    pub fn new(dir: impl Into<PathBuf>, env_file: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            env_file: env_file.into(),
        }
    }

    fn profile_path(&self, name: &str) -> Option<PathBuf> {
        let plain = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && Path::new(name).components().count() == 1;
        plain.then(|| self.dir.join(format!("{}.{}", name, PROFILE_EXTENSION)))
    }

    fn install(&self, source: &Path) -> std::io::Result<()> {
        let mut tmp_name = self
            .env_file
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = self.env_file.with_file_name(tmp_name);

        fs::copy(source, &tmp)?;
        fs::rename(&tmp, &self.env_file).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            e
        })
    }
}

impl ProfileProvider for EnvProfiles {
    fn list_profiles(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read profiles directory {:?}: {}", self.dir, e);
                }
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().map_or(false, |ext| ext == PROFILE_EXTENSION))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }

    fn activate(&self, name: &str) -> Activation {
        let Some(source) = self.profile_path(name) else {
            return Activation::failed(format!("invalid profile name '{}'", name));
        };
        if !source.is_file() {
            return Activation::failed(format!("profile '{}' does not exist", name));
        }

        match self.install(&source) {
            Ok(()) => {
                info!("Activated profile '{}' from {:?}", name, source);
                Activation::ok(format!("profile '{}' is now active", name))
            }
            Err(e) => {
                warn!("Failed to activate profile '{}': {}", name, e);
                Activation::failed(format!("could not activate '{}': {}", name, e))
            }
        }
    }
}
