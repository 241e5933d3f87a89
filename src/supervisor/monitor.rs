use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Supervisor;

/// Start the background liveness monitor.
///
/// Runs for the lifetime of the application: each tick asks the supervisor to
/// reconcile its state with the OS, and a failed tick backs off for one extra
/// interval before resuming. It never terminates the worker itself.
pub fn spawn_monitor(supervisor: Arc<Supervisor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Worker monitor started, polling every {:?}", interval);
        loop {
            let delay = match supervisor.reconcile().await {
                Ok(true) => {
                    debug!("Monitor observed worker exit");
                    interval
                }
                Ok(false) => interval,
                Err(e) => {
                    warn!("Worker monitor tick failed, retrying: {}", e);
                    interval * 2
                }
            };
            tokio::time::sleep(delay).await;
        }
    })
}
