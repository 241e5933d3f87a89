pub mod app;
pub mod config;
pub mod console;
pub mod error;
pub mod events;
pub mod helper;
pub mod pid_store;
pub mod process;
pub mod profiles;
pub mod supervisor;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::PanelSettings;
use console::ControlPanel;
use helper::HelperLauncher;
use process::SystemProcesses;
use profiles::EnvProfiles;
use supervisor::{spawn_monitor, Supervisor};

pub fn run() -> Result<()> {
    // Logs go to stderr so they never interleave with panel output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = PanelSettings::load(Path::new(app::SETTINGS_FILE));
    info!("Starting {} {}", app::APP_NAME, app::APP_VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let (tx, rx) = events::channel();
        let supervisor = Arc::new(Supervisor::new(
            &settings,
            Arc::new(SystemProcesses::new()),
            tx.clone(),
        ));

        // Pick up a worker left behind by a previous session
        match supervisor.adopt_from_store().await {
            Ok(outcome) => info!("Startup adoption: {:?}", outcome),
            Err(e) => warn!("Startup adoption failed: {}", e),
        }

        let monitor = spawn_monitor(supervisor.clone(), settings.poll_interval());

        let profiles = EnvProfiles::new(&settings.profiles_dir, &settings.env_file);
        let base_dir = settings
            .worker
            .script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Path::new(".").to_path_buf());
        let helpers = HelperLauncher::new(settings.worker.clone(), base_dir, tx);

        let result = ControlPanel::new(supervisor, profiles, helpers).run(rx).await;
        monitor.abort();
        result
    })
}
