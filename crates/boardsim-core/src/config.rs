//! Configuration for boardsim sessions.
//!
//! Every field has a default, so an empty JSON object (or no file at all) is
//! a valid configuration:
//!
//! ```json
//! {
//!   "toolchain": { "build": { "program": "make", "args": ["-j4"] } },
//!   "channel": { "bind": "127.0.0.1:40100", "peer": "127.0.0.1:40101" },
//!   "layout": { "leds": 16, "digits": 8 },
//!   "params": { "sim_delay": "1", "it_per_cycle": "10" },
//!   "stop_grace_ms": 500,
//!   "template_dir": "/usr/share/boardsim/template"
//! }
//! ```

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compile::{SimParams, ToolchainConfig};
use crate::display::BoardLayout;
use crate::error::{Error, Result};

/// Port the front end listens on.
pub const DEFAULT_BIND_PORT: u16 = 40100;

/// Port the simulator listens on.
pub const DEFAULT_PEER_PORT: u16 = 40101;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "BOARDSIM_CONFIG";

/// Addresses used by the datagram channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Local address to bind. Port 0 picks an ephemeral port.
    pub bind: SocketAddr,
    /// Address of the simulator's socket.
    pub peer: SocketAddr,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_BIND_PORT)),
            peer: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PEER_PORT)),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardsimConfig {
    pub toolchain: ToolchainConfig,
    pub channel: ChannelConfig,
    pub layout: BoardLayout,
    /// Default simulation parameters; the CLI may override them.
    pub params: SimParams,
    /// Time a simulator gets to exit after a polite termination request.
    pub stop_grace_ms: u64,
    /// Directory whose files are staged next to the user's sources.
    pub template_dir: Option<PathBuf>,
}

impl Default for BoardsimConfig {
    fn default() -> Self {
        Self {
            toolchain: ToolchainConfig::default(),
            channel: ChannelConfig::default(),
            layout: BoardLayout::default(),
            params: SimParams::default(),
            stop_grace_ms: 500,
            template_dir: None,
        }
    }
}

impl BoardsimConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// Locate and load the user's configuration.
    ///
    /// Looks at `$BOARDSIM_CONFIG`, then `<config dir>/boardsim/config.json`.
    /// A missing default file yields the defaults; a missing file named by
    /// the environment variable is an error.
    pub fn discover() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Per-user config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("boardsim").join("config.json"))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
