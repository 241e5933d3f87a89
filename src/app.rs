pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const SETTINGS_FILE: &str = "autoupload.config.json";
pub const PID_FILE: &str = "upload_process.pid";
pub const ENV_FILE: &str = ".env";
pub const PROFILES_DIR: &str = "profiles";
pub const PROFILE_EXTENSION: &str = "env";

pub const WORKER_SCRIPT: &str = "main_upload.py";
pub const SETUP_SCRIPT: &str = "setup_gui.py";
pub const PROBLEMS_SCRIPT: &str = "baekjoon_gui.py";

pub const GRACE_PERIOD_MS: u64 = 3000;
pub const KILL_CONFIRM_MS: u64 = 2000;
pub const POLL_INTERVAL_MS: u64 = 2000;
