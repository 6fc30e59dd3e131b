//! High-availability model and the role based address rule.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::link::IpAssignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HaMode {
    ActiveActive,
    ActiveBackup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaRole {
    Primary,
    Backup,
}

impl HaRole {
    pub fn opposite(&self) -> Self {
        match self {
            HaRole::Primary => HaRole::Backup,
            HaRole::Backup => HaRole::Primary,
        }
    }
}

impl fmt::Display for HaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaRole::Primary => f.write_str("primary"),
            HaRole::Backup => f.write_str("backup"),
        }
    }
}

/// VRRP timing knobs handed through to the failover daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAliveTuning {
    /// Seconds between advertisements.
    pub advert_interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garp_master_delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preempt_delay: Option<u32>,
}

impl Default for KeepAliveTuning {
    fn default() -> Self {
        Self {
            advert_interval: 1,
            garp_master_delay: None,
            preempt_delay: None,
        }
    }
}

/// A link whose address follows the appliance role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredInterface {
    pub link: String,
    /// Address held while primary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ip: Option<IpNet>,
    /// Address held while backup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_ip: Option<IpNet>,
    /// Address the link held when HA was configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_ip: Option<IpAssignment>,
}

impl MonitoredInterface {
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            base_ip: None,
            peer_ip: None,
            interface_ip: None,
        }
    }

    pub fn with_base_ip(mut self, ip: IpNet) -> Self {
        self.base_ip = Some(ip);
        self
    }

    pub fn with_peer_ip(mut self, ip: IpNet) -> Self {
        self.peer_ip = Some(ip);
        self
    }

    pub fn role_address(&self, role: HaRole) -> Option<IpNet> {
        match role {
            HaRole::Primary => self.base_ip,
            HaRole::Backup => self.peer_ip,
        }
    }
}

/// Address a monitored link should carry for `role`.
///
/// The role address wins when configured; otherwise the link keeps `current`.
pub fn select_interface_ip(
    role: HaRole,
    monitored: &MonitoredInterface,
    current: Option<&IpAssignment>,
) -> Option<IpAssignment> {
    match monitored.role_address(role) {
        Some(net) => Some(IpAssignment::from(net)),
        None => current.cloned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaConfig {
    pub mode: HaMode,
    pub role: HaRole,
    /// Dedicated link carrying VRRP adverts and peer traffic.
    pub ha_link: String,
    pub peer_ip: IpAddr,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive: Option<KeepAliveTuning>,
    #[serde(default)]
    pub monitored: Vec<MonitoredInterface>,
}

impl HaConfig {
    pub fn monitored(&self, link: &str) -> Option<&MonitoredInterface> {
        self.monitored.iter().find(|m| m.link == link)
    }

    /// The HA link and every monitored link are owned by HA.
    pub fn owns_link(&self, link: &str) -> bool {
        self.ha_link == link || self.monitored(link).is_some()
    }

    /// Role appropriate address for `link`, falling back to `current`.
    pub fn resolve_ip(&self, link: &str, current: Option<&IpAssignment>) -> Option<IpAssignment> {
        match self.monitored(link) {
            Some(monitored) => select_interface_ip(self.role, monitored, current),
            None => current.cloned(),
        }
    }

    /// Configuration the peer adopts during a backup sync: same monitored
    /// set, opposite role, pointing back at `local_ip`.
    pub fn for_peer(&self, local_ip: IpAddr) -> HaConfig {
        HaConfig {
            role: self.role.opposite(),
            peer_ip: local_ip,
            monitored: self
                .monitored
                .iter()
                .map(|m| MonitoredInterface {
                    interface_ip: None,
                    ..m.clone()
                })
                .collect(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaState {
    Disabled,
    Enabled,
    Synced,
}

/// Persisted `ha.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HaDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ha: Option<HaConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

impl HaDocument {
    pub fn state(&self) -> HaState {
        match (&self.ha, &self.last_synced) {
            (None, _) => HaState::Disabled,
            (Some(_), None) => HaState::Enabled,
            (Some(_), Some(_)) => HaState::Synced,
        }
    }
}

/// What two nodes compare before agreeing to sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub model: String,
    pub firmware_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

impl DeviceIdentity {
    /// Serial numbers differ between nodes, model and firmware must not.
    pub fn compatible_with(&self, other: &DeviceIdentity) -> bool {
        self.model == other.model && self.firmware_version == other.firmware_version
    }
}
