/// Foreground control panel
/// Reads operator commands from stdin, drives the supervisor, and renders the
/// state-change messages posted by background tasks. This task is the only
/// place status is presented; background code never prints panel output.

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::app;
use crate::config::ConfigStatus;
use crate::error::SupervisorError;
use crate::events::{ChangeCause, EventReceiver, PanelEvent, WorkerEvent, WorkerStatus};
use crate::helper::HelperLauncher;
use crate::profiles::ProfileProvider;
use crate::supervisor::{StopOutcome, Supervisor, WorkerSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Start,
    Stop,
    Toggle,
    Profiles,
    Use(String),
    Setup,
    Problems,
    Help,
    /// Stop the worker if needed, then exit
    Quit,
    /// Exit and leave the worker running for the next session to adopt
    Detach,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Command::Empty;
        };

        match verb.to_ascii_lowercase().as_str() {
            "status" | "s" => Command::Status,
            "start" => Command::Start,
            "stop" => Command::Stop,
            "toggle" | "t" => Command::Toggle,
            "profiles" | "ls" => Command::Profiles,
            "use" | "profile" => match words.next() {
                Some(name) => Command::Use(name.to_string()),
                None => Command::Unknown(line.trim().to_string()),
            },
            "setup" => Command::Setup,
            "problems" => Command::Problems,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            "detach" => Command::Detach,
            _ => Command::Unknown(line.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Text for the settings block of the panel
pub fn describe_config(config: &ConfigStatus, profile: Option<&str>) -> Vec<String> {
    let suffix = profile
        .map(|p| format!(" (profile: {})", p))
        .unwrap_or_default();

    match config {
        ConfigStatus::Ready(cfg) => vec![
            format!("settings complete - ready to upload{}", suffix),
            format!("watch folder: {}", cfg.watch_folder),
            format!("repository: {}/{}", cfg.username, cfg.repo),
            format!("upload mode: {}", cfg.mode.label()),
        ],
        ConfigStatus::Incomplete { missing } => vec![
            format!("settings incomplete - run setup{}", suffix),
            format!("missing: {}", missing.join(", ")),
        ],
        ConfigStatus::Missing => vec![
            "no settings - run setup".to_string(),
            "watch folder: not set".to_string(),
            "repository: not set".to_string(),
            "upload mode: not set".to_string(),
        ],
        ConfigStatus::Unreadable(e) => vec![format!("settings unreadable: {}", e)],
    }
}

pub fn describe_worker(snapshot: &WorkerSnapshot, config_ready: bool) -> String {
    match (snapshot.status, snapshot.pid) {
        (WorkerStatus::Running, Some(pid)) => format!("upload: running (PID {})", pid),
        (WorkerStatus::Stopping, _) => "upload: stopping".to_string(),
        (_, _) if config_ready => "upload: stopped".to_string(),
        (_, _) => "upload: stopped (start disabled until settings are complete)".to_string(),
    }
}

fn describe_event(event: &WorkerEvent) -> String {
    let when = event.at.format("%H:%M:%S");
    let pid = event.pid.map(|p| format!(" (PID {})", p)).unwrap_or_default();
    match event.cause {
        ChangeCause::Started => format!("[{}] upload started{}", when, pid),
        ChangeCause::Adopted => format!("[{}] found running upload worker{}", when, pid),
        ChangeCause::StopRequested => format!("[{}] stopping upload{}", when, pid),
        ChangeCause::StopFailed => format!("[{}] upload worker did not stop{}", when, pid),
        ChangeCause::Stopped => format!("[{}] upload stopped", when),
        ChangeCause::ExitedExternally => format!("[{}] upload worker exited, status updated", when),
    }
}

pub struct ControlPanel<P: ProfileProvider> {
    supervisor: Arc<Supervisor>,
    profiles: P,
    helpers: HelperLauncher,
    current_profile: Option<String>,
}

impl<P: ProfileProvider> ControlPanel<P> {
    pub fn new(supervisor: Arc<Supervisor>, profiles: P, helpers: HelperLauncher) -> Self {
        Self {
            supervisor,
            profiles,
            helpers,
            current_profile: None,
        }
    }

    pub async fn run(mut self, mut events: EventReceiver) -> Result<()> {
        println!("{} {} - type 'help' for commands", app::APP_NAME, app::APP_VERSION);
        self.render_profiles();
        self.render_status();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            prompt();
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        info!("stdin closed, leaving the worker as it is");
                        break;
                    };
                    if self.handle(Command::parse(&line)).await == Flow::Exit {
                        break;
                    }
                }
                Some(event) = events.recv() => self.on_event(event),
            }
        }

        Ok(())
    }

    async fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Empty => {}
            Command::Status => self.render_status(),
            Command::Start => self.start().await,
            Command::Stop => self.stop().await,
            Command::Toggle => {
                if self.supervisor.is_running() {
                    self.stop().await
                } else {
                    self.start().await
                }
            }
            Command::Profiles => self.render_profiles(),
            Command::Use(name) => self.activate(&name),
            Command::Setup => match self.helpers.open_and_wait(app::SETUP_SCRIPT) {
                Ok(_) => println!("setup opened, status refreshes when it closes"),
                Err(e) => println!("cannot open setup: {}", e),
            },
            Command::Problems => {
                if let Err(e) = self.helpers.open(app::PROBLEMS_SCRIPT) {
                    println!("cannot open problem browser: {}", e);
                }
            }
            Command::Help => print_help(),
            Command::Quit => {
                if self.supervisor.is_running() {
                    println!("stopping upload before exit...");
                    self.stop().await;
                    if self.supervisor.is_running() {
                        println!("worker is still running; use 'detach' to exit anyway");
                        return Flow::Continue;
                    }
                }
                return Flow::Exit;
            }
            Command::Detach => {
                if let Some(pid) = self.supervisor.status().pid {
                    println!("leaving upload worker (PID {}) running", pid);
                }
                return Flow::Exit;
            }
            Command::Unknown(text) => println!("unknown command '{}', try 'help'", text),
        }
        Flow::Continue
    }

    async fn start(&mut self) {
        match self.supervisor.start().await {
            Ok(pid) => {
                let profile = self
                    .current_profile
                    .as_deref()
                    .map(|p| format!(", profile {}", p))
                    .unwrap_or_default();
                println!(
                    "upload started (PID {}{}); the worker console shows upload progress",
                    pid, profile
                );
            }
            Err(SupervisorError::AlreadyRunning { pid }) => {
                println!("upload is already running (PID {})", pid)
            }
            Err(e) => println!("cannot start upload: {}", e),
        }
    }

    async fn stop(&mut self) {
        match self.supervisor.stop().await {
            Ok(StopOutcome::Stopped { .. }) => println!("upload stopped"),
            Ok(StopOutcome::AlreadyStopped) => println!("upload is not running"),
            Err(e) => println!("cannot stop upload: {}", e),
        }
    }

    fn activate(&mut self, name: &str) {
        let result = self.profiles.activate(name);
        if result.success {
            self.current_profile = Some(name.to_string());
            println!("{}", result.message);
            if self.supervisor.is_running() {
                println!("restart the upload for the new profile to take effect");
            }
            self.render_status();
        } else {
            warn!("Profile activation failed: {}", result.message);
            println!("{}", result.message);
        }
    }

    fn on_event(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::Worker(event) => println!("\n{}", describe_event(&event)),
            PanelEvent::HelperExited { helper, .. } => {
                println!("\n{} closed, reloading", helper);
                self.render_profiles();
                self.render_status();
            }
        }
    }

    fn render_profiles(&self) {
        let names = self.profiles.list_profiles();
        if names.is_empty() {
            println!("profiles: none");
            return;
        }
        for name in names {
            let marker = if self.current_profile.as_deref() == Some(name.as_str()) {
                "*"
            } else {
                " "
            };
            println!(" {} {}", marker, name);
        }
    }

    fn render_status(&self) {
        let config = self.supervisor.config_status();
        for line in describe_config(&config, self.current_profile.as_deref()) {
            println!("{}", line);
        }
        println!(
            "{}",
            describe_worker(&self.supervisor.status(), config.is_ready())
        );
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_help() {
    println!("commands:");
    println!("  status            show settings and upload state");
    println!("  start | stop      start or stop the upload worker (toggle flips it)");
    println!("  profiles          list profiles");
    println!("  use <name>        activate a profile");
    println!("  setup             open the settings tool");
    println!("  problems          open the problem browser");
    println!("  quit              stop the upload and exit");
    println!("  detach            exit, leaving the upload running");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{UploadConfig, UploadMode};
    use crate::events::{self, WorkerStatus};
    use crate::profiles::EnvProfiles;
    use crate::supervisor::testing::harness;
    use std::fs;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  start "), Command::Start);
        assert_eq!(Command::parse("STOP"), Command::Stop);
        assert_eq!(Command::parse("use work"), Command::Use("work".to_string()));
        assert_eq!(Command::parse("use"), Command::Unknown("use".to_string()));
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("detach"), Command::Detach);
        assert_eq!(Command::parse("fly away"), Command::Unknown("fly away".to_string()));
    }

    #[test]
    fn test_describe_config() {
        let ready = ConfigStatus::Ready(UploadConfig {
            token: "ghp_abc".to_string(),
            username: "octo".to_string(),
            repo: "solutions".to_string(),
            watch_folder: "/home/octo/algo".to_string(),
            mode: UploadMode::Hybrid,
        });
        let lines = describe_config(&ready, Some("work"));
        assert_eq!(lines[0], "settings complete - ready to upload (profile: work)");
        assert_eq!(lines[2], "repository: octo/solutions");
        assert_eq!(lines[3], "upload mode: real-time + scheduled");

        let incomplete = ConfigStatus::Incomplete {
            missing: vec!["WATCH_FOLDER"],
        };
        assert_eq!(describe_config(&incomplete, None)[1], "missing: WATCH_FOLDER");
    }

    #[test]
    fn test_describe_worker() {
        let running = WorkerSnapshot {
            status: WorkerStatus::Running,
            pid: Some(4242),
        };
        assert_eq!(describe_worker(&running, true), "upload: running (PID 4242)");

        let stopped = WorkerSnapshot {
            status: WorkerStatus::Stopped,
            pid: None,
        };
        assert_eq!(describe_worker(&stopped, true), "upload: stopped");
        assert!(describe_worker(&stopped, false).contains("disabled"));
    }

    #[tokio::test]
    async fn test_quit_stops_running_worker() {
        let h = harness();
        let (tx, _rx) = events::channel();
        let helpers = HelperLauncher::new(Default::default(), h.dir.path(), tx);
        let profiles = EnvProfiles::new(h.dir.path().join("profiles"), h.dir.path().join(".env"));
        let mut panel = ControlPanel::new(h.supervisor.clone(), profiles, helpers);

        assert_eq!(panel.handle(Command::Toggle).await, Flow::Continue);
        assert!(h.supervisor.is_running());

        assert_eq!(panel.handle(Command::Quit).await, Flow::Exit);
        assert!(!h.supervisor.is_running());
        assert!(!h.processes.alive(4242));
    }

    #[tokio::test]
    async fn test_detach_leaves_worker_running() {
        let h = harness();
        let (tx, _rx) = events::channel();
        let helpers = HelperLauncher::new(Default::default(), h.dir.path(), tx);
        let profiles = EnvProfiles::new(h.dir.path().join("profiles"), h.dir.path().join(".env"));
        let mut panel = ControlPanel::new(h.supervisor.clone(), profiles, helpers);

        panel.handle(Command::Start).await;
        assert_eq!(panel.handle(Command::Detach).await, Flow::Exit);
        assert!(h.supervisor.is_running());
        assert_eq!(h.supervisor.store().read(), Some(4242));
    }

    #[tokio::test]
    async fn test_activate_profile_sets_current() {
        let h = harness();
        let profiles_dir = h.dir.path().join("profiles");
        fs::create_dir(&profiles_dir).unwrap();
        fs::write(profiles_dir.join("work.env"), "GITHUB_TOKEN=t\n").unwrap();

        let (tx, _rx) = events::channel();
        let helpers = HelperLauncher::new(Default::default(), h.dir.path(), tx);
        let profiles = EnvProfiles::new(profiles_dir, h.dir.path().join(".env"));
        let mut panel = ControlPanel::new(h.supervisor.clone(), profiles, helpers);

        panel.handle(Command::Use("work".to_string())).await;
        assert_eq!(panel.current_profile.as_deref(), Some("work"));
        assert!(!h.supervisor.config_status().is_ready());

        panel.handle(Command::Use("missing".to_string())).await;
        assert_eq!(panel.current_profile.as_deref(), Some("work"));
    }
}
