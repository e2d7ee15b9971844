//! Startup configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TTYD_PORT: u16 = 7681;
pub const MAX_PORT_RETRIES: u16 = 100;

/// Validated server configuration. Read-only once the server starts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub documents: Vec<PathBuf>,
    pub host: IpAddr,
    pub port: u16,
    /// tmux pane to mirror, e.g. `%0`. `None` disables the bridge.
    pub tmux_pane: Option<String>,
    pub max_port_retries: u16,
    pub bridge: BridgeSettings,
}

impl ServerConfig {
    pub fn new(documents: Vec<PathBuf>) -> Self {
        Self {
            documents,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            tmux_pane: None,
            max_port_retries: MAX_PORT_RETRIES,
            bridge: BridgeSettings::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_tmux_pane(mut self, pane: impl Into<String>) -> Self {
        self.tmux_pane = Some(pane.into());
        self
    }
}

/// Knobs for the tmux / ttyd bridge.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub tmux_program: String,
    pub ttyd_program: String,
    /// First port tried for the ttyd companion.
    pub ttyd_port_base: u16,
    pub ttyd_port_attempts: u16,
    pub command_timeout: Duration,
    pub companion_startup_delay: Duration,
    pub send_enter_delay: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            tmux_program: "tmux".to_string(),
            ttyd_program: "ttyd".to_string(),
            ttyd_port_base: DEFAULT_TTYD_PORT,
            ttyd_port_attempts: MAX_PORT_RETRIES,
            command_timeout: Duration::from_secs(5),
            companion_startup_delay: Duration::from_secs(1),
            send_enter_delay: Duration::from_millis(100),
        }
    }
}
