//! tmux pane bridge: capture, send, and an optional ttyd companion.
//!
//! The bridge owns every external resource it creates. Starting the
//! interactive session may clone the pane's tmux session into a grouped
//! session, zoom the pane, and spawn ttyd; `teardown` undoes exactly what
//! was done, best-effort, once.

pub mod runner;
pub mod tmux;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::binder;
use crate::config::BridgeSettings;

pub use runner::{CommandRunner, SystemRunner};

/// Returned as pane content when capture fails.
pub const CAPTURE_FAILED: &str = "[Error: Failed to capture tmux pane content]";

const COMPANION_STOP_GRACE: std::time::Duration = std::time::Duration::from_secs(2);
const STDERR_CAPTURE_LIMIT: usize = 4096;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("tmux integration not enabled")]
    Disabled,
    #[error("ttyd is not available")]
    Unavailable,
    #[error("command `{command}` failed: {detail}")]
    Execution { command: String, detail: String },
    #[error("command `{command}` timed out")]
    Timeout { command: String },
    #[error("no free port for ttyd in {first}-{last}")]
    PortExhausted { first: u16, last: u16 },
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ttyd exited during startup (code {code:?}): {stderr}")]
    CompanionExited { code: Option<i32>, stderr: String },
}

/// Lifecycle position of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgePhase {
    Disabled,
    Enabled,
    SessionActive { url: String },
}

/// Body of `GET /api/tmux/status`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub enabled: bool,
    pub pane_id: Option<String>,
    pub ttyd_url: Option<String>,
    pub ttyd_available: bool,
}

/// Result of starting the interactive session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InteractiveSession {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

struct Companion {
    url: String,
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

#[derive(Default)]
struct SessionState {
    companion: Option<Companion>,
    grouped_session: Option<String>,
    zoom_changed: bool,
    closed: bool,
}

pub struct TerminalBridge {
    pane_id: Option<String>,
    settings: BridgeSettings,
    runner: Arc<dyn CommandRunner>,
    ttyd_available: bool,
    /// Serialises `start_interactive_session` and `teardown`.
    start_guard: Mutex<()>,
    state: Mutex<SessionState>,
}

impl TerminalBridge {
    /// Build the bridge. ttyd is only probed when a pane is configured.
    pub async fn new(
        pane_id: Option<String>,
        settings: BridgeSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let ttyd_available = match &pane_id {
            Some(_) => runner.is_installed(&settings.ttyd_program).await,
            None => false,
        };
        Self {
            pane_id,
            settings,
            runner,
            ttyd_available,
            start_guard: Mutex::new(()),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            pane_id: None,
            settings: BridgeSettings::default(),
            runner: Arc::new(SystemRunner),
            ttyd_available: false,
            start_guard: Mutex::new(()),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn pane_id(&self) -> Option<&str> {
        self.pane_id.as_deref()
    }

    pub fn is_interactive_terminal_available(&self) -> bool {
        self.ttyd_available
    }

    pub async fn phase(&self) -> BridgePhase {
        let state = self.state.lock().await;
        if self.pane_id.is_none() || state.closed {
            return BridgePhase::Disabled;
        }
        match &state.companion {
            Some(companion) => BridgePhase::SessionActive {
                url: companion.url.clone(),
            },
            None => BridgePhase::Enabled,
        }
    }

    pub async fn status(&self) -> BridgeStatus {
        let ttyd_url = match self.phase().await {
            BridgePhase::SessionActive { url } => Some(url),
            _ => None,
        };
        BridgeStatus {
            enabled: self.pane_id.is_some(),
            pane_id: self.pane_id.clone(),
            ttyd_url,
            ttyd_available: self.ttyd_available,
        }
    }

    fn pane(&self) -> Result<&str, BridgeError> {
        self.pane_id.as_deref().ok_or(BridgeError::Disabled)
    }

    async fn tmux(&self, args: Vec<String>) -> Result<String, BridgeError> {
        self.runner
            .output(&self.settings.tmux_program, &args, self.settings.command_timeout)
            .await
    }

    /// Capture the last lines of the pane. Failures become pane content.
    pub async fn capture_content(&self) -> Result<String, BridgeError> {
        let pane = self.pane()?;
        match self.tmux(tmux::capture_pane(pane)).await {
            Ok(content) => Ok(content),
            Err(err) => {
                warn!(%err, pane, "capture-pane failed");
                Ok(CAPTURE_FAILED.to_string())
            }
        }
    }

    /// Type `text` into the pane, press Enter, then Enter again after a
    /// short pause so IMEs that need a commit keystroke still submit.
    pub async fn send_text(&self, text: &str) -> Result<(), BridgeError> {
        let pane = self.pane()?;
        let sanitized = tmux::sanitize_input(text);
        self.tmux(tmux::send_literal(pane, &sanitized)).await?;
        self.tmux(tmux::send_enter(pane)).await?;
        tokio::time::sleep(self.settings.send_enter_delay).await;
        self.tmux(tmux::send_enter(pane)).await?;
        Ok(())
    }

    /// Start ttyd against the pane, or return the running instance.
    pub async fn start_interactive_session(&self) -> Result<InteractiveSession, BridgeError> {
        let pane = self.pane()?;
        if !self.ttyd_available {
            return Err(BridgeError::Unavailable);
        }

        let _guard = self.start_guard.lock().await;
        {
            let state = self.state.lock().await;
            if state.closed {
                return Err(BridgeError::Disabled);
            }
            if let Some(companion) = &state.companion {
                return Ok(InteractiveSession {
                    url: companion.url.clone(),
                    warning: None,
                });
            }
        }

        let (target, warning) = self.prepare_target(pane).await;

        let companion = match self.spawn_companion(&target).await {
            Ok(companion) => companion,
            Err(err) => {
                self.release_grouped_session().await;
                return Err(err);
            }
        };

        let url = companion.url.clone();
        self.state.lock().await.companion = Some(companion);
        Ok(InteractiveSession { url, warning })
    }

    /// Pick the tmux target ttyd attaches to, preferring a grouped clone.
    async fn prepare_target(&self, pane: &str) -> (String, Option<String>) {
        let info = match self.tmux(tmux::pane_info(pane)).await {
            Ok(output) => tmux::parse_pane_info(&output),
            Err(err) => {
                warn!(%err, pane, "failed to read pane info");
                None
            }
        };
        let Some(info) = info else {
            let warning = format!("could not inspect pane {pane}; attaching to it directly");
            warn!("{}", warning);
            return (pane.to_string(), Some(warning));
        };

        match self.create_grouped_session(pane, &info).await {
            Ok(group) => (group, None),
            Err(err) => {
                self.release_grouped_session().await;
                let warning = format!(
                    "grouped session setup failed ({err}); attaching to session {}",
                    info.session
                );
                warn!("{}", warning);
                (info.session, Some(warning))
            }
        }
    }

    async fn create_grouped_session(
        &self,
        pane: &str,
        info: &tmux::PaneInfo,
    ) -> Result<String, BridgeError> {
        let group = format!("md-open-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);

        self.tmux(tmux::new_grouped_session(&group, &info.session))
            .await?;
        self.state.lock().await.grouped_session = Some(group.clone());
        info!(session = %group, original = %info.session, "created grouped tmux session");

        self.tmux(tmux::select_window(&group, &info.window_index))
            .await?;
        self.tmux(tmux::window_size_latest(&group)).await?;

        if !info.zoomed {
            self.tmux(tmux::toggle_zoom(pane)).await?;
            self.state.lock().await.zoom_changed = true;
        }
        Ok(group)
    }

    async fn spawn_companion(&self, target: &str) -> Result<Companion, BridgeError> {
        let port = binder::probe_free_port(
            self.settings.ttyd_port_base,
            self.settings.ttyd_port_attempts,
        )
        .map_err(|(first, last)| BridgeError::PortExhausted { first, last })?;

        let args = tmux::ttyd(port, &self.settings.tmux_program, target);
        let mut child = self.runner.spawn(&self.settings.ttyd_program, &args)?;
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain_stderr(pipe)));

        tokio::time::sleep(self.settings.companion_startup_delay).await;

        if let Ok(Some(status)) = child.try_wait() {
            let stderr = match stderr {
                Some(task) => {
                    match tokio::time::timeout(COMPANION_STOP_GRACE, task).await {
                        Ok(Ok(text)) => text,
                        _ => String::new(),
                    }
                }
                None => String::new(),
            };
            return Err(BridgeError::CompanionExited {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        let url = format!("http://localhost:{port}/");
        info!(%url, session = %target, "ttyd started");
        Ok(Companion { url, child, stderr })
    }

    /// Undo the grouped session and any zoom change made for it.
    async fn release_grouped_session(&self) {
        let (group, zoom_changed) = {
            let mut state = self.state.lock().await;
            let zoom_changed = std::mem::take(&mut state.zoom_changed);
            (state.grouped_session.take(), zoom_changed)
        };
        let Some(group) = group else {
            return;
        };

        if zoom_changed {
            if let Some(pane) = self.pane_id.as_deref() {
                self.restore_zoom(pane).await;
            }
        }
        if let Err(err) = self.tmux(tmux::kill_session(&group)).await {
            warn!(%err, session = %group, "failed to kill grouped session");
        }
    }

    async fn restore_zoom(&self, pane: &str) {
        match self.tmux(tmux::zoomed_flag(pane)).await {
            Ok(flag) if tmux::parse_flag(&flag) => {
                if let Err(err) = self.tmux(tmux::toggle_zoom(pane)).await {
                    warn!(%err, pane, "failed to restore pane zoom");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(%err, pane, "failed to read pane zoom state"),
        }
    }

    /// Stop ttyd and remove the grouped session. Runs once; later calls
    /// and failures are no-ops.
    pub async fn teardown(&self) {
        let _guard = self.start_guard.lock().await;
        let companion = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            state.companion.take()
        };

        if let Some(companion) = companion {
            stop_companion(companion).await;
        }
        self.release_grouped_session().await;
    }
}

async fn drain_stderr(pipe: tokio::process::ChildStderr) -> String {
    let mut captured = String::new();
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "ttyd", "{}", line);
        if captured.len() < STDERR_CAPTURE_LIMIT {
            captured.push_str(&line);
            captured.push('\n');
        }
    }
    captured
}

async fn stop_companion(mut companion: Companion) {
    if let Some(task) = companion.stderr.take() {
        task.abort();
    }
    drop(companion.child.stdin.take());
    drop(companion.child.stdout.take());

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = companion.child.id() {
            if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(%err, pid, "failed to signal ttyd");
            }
            if tokio::time::timeout(COMPANION_STOP_GRACE, companion.child.wait())
                .await
                .is_ok()
            {
                info!(url = %companion.url, "ttyd stopped");
                return;
            }
        }
    }

    match companion.child.kill().await {
        Ok(()) => info!(url = %companion.url, "ttyd killed"),
        Err(err) => warn!(%err, "failed to kill ttyd"),
    }
}
