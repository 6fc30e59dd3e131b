//! Daemon settings
//!
//! Loaded from an optional TOML file and overridden by `APPNET__*`
//! environment variables, e.g. `APPNET__PEER__PORT=9443` or
//! `APPNET__DAEMONS__ROUTING_SERVICE=frr`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use appnet_config::DEFAULT_LOCK_TIMEOUT;
use appnet_core::types::PHYSICAL_PORT_PATTERN;
use appnet_core::{PortNaming, Result};
use appnet_ha::{FactoryDefaults, PeerSettings, DEFAULT_REBOOT_DELAY};
use appnet_routing::DaemonSettings;
use appnet_types::DeviceIdentity;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/appnet/appnet.toml";
pub const ENV_PREFIX: &str = "APPNET";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Directory holding interfaces.json, routing.json and ha.json
    pub state_dir: PathBuf,
    pub lock_timeout_secs: u64,
    pub reboot_delay_secs: u64,
    pub listen: SocketAddr,
    pub port_pattern: String,
    /// Display names for physical ports, e.g. `eth0 = "MGMT"`
    pub port_aliases: IndexMap<String, String>,
    pub daemons: DaemonSettings,
    pub peer: PeerSettings,
    pub factory: FactoryDefaults,
    pub identity: DeviceIdentity,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/var/lib/appnet"),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT.as_secs(),
            reboot_delay_secs: DEFAULT_REBOOT_DELAY.as_secs(),
            listen: SocketAddr::from(([0, 0, 0, 0], 8443)),
            port_pattern: PHYSICAL_PORT_PATTERN.to_string(),
            port_aliases: IndexMap::new(),
            daemons: DaemonSettings::default(),
            peer: PeerSettings::default(),
            factory: FactoryDefaults::default(),
            identity: DeviceIdentity {
                model: "appnet".to_string(),
                firmware_version: env!("CARGO_PKG_VERSION").to_string(),
                serial: None,
            },
        }
    }
}

impl AppSettings {
    /// Load `path` (or the default location when it exists) and apply
    /// environment overrides on top.
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, SettingsError> {
        let file = match path {
            Some(path) => config::File::from(path.to_path_buf()).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_PATH).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn reboot_delay(&self) -> Duration {
        Duration::from_secs(self.reboot_delay_secs)
    }

    pub fn port_naming(&self) -> Result<PortNaming> {
        PortNaming::new(&self.port_pattern, self.port_aliases.clone())
    }
}
