//! iproute2 backed kernel access

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;

use appnet_core::backend::{KernelAddress, KernelLink, LinkBackend, NewLink};
use appnet_core::error::KernelError;
use appnet_core::{IpAssignment, LinkKind, LinkStats, MacAddr, NetworkError, OperState, Result};

/// Runs `ip` and `dhclient` for every kernel operation
pub struct IpCommandBackend {
    ip_path: String,
    dhclient_path: String,
    operation_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct IpLink {
    ifindex: u32,
    ifname: String,
    #[serde(default)]
    mtu: u32,
    #[serde(default)]
    operstate: Option<String>,
    #[serde(default)]
    link_type: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    master: Option<String>,
    /// Lower device, reported for VLANs
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    linkinfo: Option<IpLinkInfo>,
    #[serde(default)]
    stats64: Option<IpStats>,
}

#[derive(Debug, Default, Deserialize)]
struct IpLinkInfo {
    #[serde(default)]
    info_kind: Option<String>,
    #[serde(default)]
    info_data: Option<IpInfoData>,
    #[serde(default)]
    info_slave_data: Option<IpSlaveData>,
}

#[derive(Debug, Default, Deserialize)]
struct IpInfoData {
    #[serde(default)]
    id: Option<u16>,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IpSlaveData {
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IpStats {
    #[serde(default)]
    rx: IpCounters,
    #[serde(default)]
    tx: IpCounters,
}

#[derive(Debug, Default, Deserialize)]
struct IpCounters {
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    packets: u64,
    #[serde(default)]
    errors: u64,
    #[serde(default)]
    dropped: u64,
}

#[derive(Debug, Deserialize)]
struct IpAddrEntry {
    ifname: String,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    local: String,
    prefixlen: u8,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    dynamic: bool,
    #[serde(default)]
    secondary: bool,
}

/// Parse `ip -j -d -s link show` output
pub fn parse_links(json: &str) -> Result<Vec<KernelLink>> {
    let entries: Vec<IpLink> = serde_json::from_str(json).map_err(|e| {
        NetworkError::Kernel(KernelError::Parse {
            message: format!("ip link output: {}", e),
        })
    })?;

    Ok(entries.into_iter().map(to_kernel_link).collect())
}

fn to_kernel_link(entry: IpLink) -> KernelLink {
    let info = entry.linkinfo.unwrap_or_default();
    let kind = match (info.info_kind.as_deref(), entry.link_type.as_deref()) {
        (Some("vlan"), _) => LinkKind::Vlan,
        (Some("bridge"), _) => LinkKind::Bridge,
        (Some("bond"), _) => LinkKind::Bond,
        (Some(_), _) => LinkKind::Other,
        (None, Some("loopback")) => LinkKind::Loopback,
        (None, Some("ether")) => LinkKind::Physical,
        (None, _) => LinkKind::Other,
    };

    let data = info.info_data.unwrap_or_default();
    let mut link = KernelLink::new(entry.ifname, kind);
    link.index = entry.ifindex;
    link.mtu = entry.mtu;
    link.oper_state = entry
        .operstate
        .as_deref()
        .map(OperState::from_kernel)
        .unwrap_or(OperState::Unknown);
    link.hw_address = entry.address.as_deref().and_then(|a| a.parse::<MacAddr>().ok());
    link.master = entry.master;

    if kind == LinkKind::Vlan {
        link.parent = entry.link;
        link.vlan_id = data.id;
    }
    if kind == LinkKind::Bond {
        link.bond_mode = data.mode.as_deref().and_then(|m| m.parse().ok());
    }
    link.slave_state = info
        .info_slave_data
        .and_then(|s| s.state)
        .and_then(|s| s.parse().ok());

    if let Some(stats) = entry.stats64 {
        link.stats = LinkStats {
            rx_bytes: stats.rx.bytes,
            rx_packets: stats.rx.packets,
            rx_errors: stats.rx.errors,
            rx_dropped: stats.rx.dropped,
            tx_bytes: stats.tx.bytes,
            tx_packets: stats.tx.packets,
            tx_errors: stats.tx.errors,
            tx_dropped: stats.tx.dropped,
        };
    }
    link
}

/// Parse `ip -j addr show` output, skipping link-local addresses
pub fn parse_addresses(json: &str) -> Result<Vec<KernelAddress>> {
    let entries: Vec<IpAddrEntry> = serde_json::from_str(json).map_err(|e| {
        NetworkError::Kernel(KernelError::Parse {
            message: format!("ip addr output: {}", e),
        })
    })?;

    let mut addresses = Vec::new();
    for entry in entries {
        for info in entry.addr_info {
            if info.scope.as_deref() == Some("link") {
                continue;
            }
            let address = info.local.parse().map_err(|_| {
                NetworkError::Kernel(KernelError::Parse {
                    message: format!("invalid address {} on {}", info.local, entry.ifname),
                })
            })?;
            addresses.push(KernelAddress {
                link: entry.ifname.clone(),
                address,
                prefix_len: info.prefixlen,
                dynamic: info.dynamic,
                secondary: info.secondary,
            });
        }
    }
    Ok(addresses)
}

impl IpCommandBackend {
    pub fn new() -> Self {
        Self {
            ip_path: "/sbin/ip".to_string(),
            dhclient_path: "/sbin/dhclient".to_string(),
            operation_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_config(ip_path: String, dhclient_path: String, operation_timeout: Duration) -> Self {
        Self {
            ip_path,
            dhclient_path,
            operation_timeout,
        }
    }

    async fn execute(&self, program: &str, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", program, args.join(" "));
        debug!("Executing {}", command);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match timeout(self.operation_timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                warn!("{} failed with exit code {:?}: {}", command, output.status.code(), stderr);
                Err(NetworkError::Kernel(KernelError::CommandFailed {
                    command,
                    exit_code: output.status.code(),
                    stderr,
                }))
            }
            Ok(Err(e)) => Err(NetworkError::Kernel(KernelError::Spawn {
                command,
                message: e.to_string(),
            })),
            Err(_) => Err(NetworkError::Kernel(KernelError::Timeout {
                command,
                timeout_secs: self.operation_timeout.as_secs(),
            })),
        }
    }

    async fn ip(&self, args: &[&str]) -> Result<String> {
        self.execute(&self.ip_path, args).await
    }
}

impl Default for IpCommandBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkBackend for IpCommandBackend {
    async fn links(&self) -> Result<Vec<KernelLink>> {
        let output = self.ip(&["-j", "-d", "-s", "link", "show"]).await?;
        parse_links(&output)
    }

    async fn addresses(&self) -> Result<Vec<KernelAddress>> {
        let output = self.ip(&["-j", "addr", "show"]).await?;
        parse_addresses(&output)
    }

    async fn create_link(&self, link: &NewLink) -> Result<()> {
        match link {
            NewLink::Vlan {
                name,
                parent,
                vlan_id,
            } => {
                let id = vlan_id.to_string();
                self.ip(&["link", "add", "link", parent, "name", name, "type", "vlan", "id", &id])
                    .await?;
            }
            NewLink::Bridge { name } => {
                self.ip(&["link", "add", "name", name, "type", "bridge"]).await?;
            }
            NewLink::Bond { name, mode } => {
                self.ip(&["link", "add", "name", name, "type", "bond", "mode", mode.kernel_name()])
                    .await?;
            }
        }
        self.set_up(link.name(), true).await
    }

    async fn delete_link(&self, name: &str) -> Result<()> {
        self.ip(&["link", "delete", "dev", name]).await.map(|_| ())
    }

    async fn set_master(&self, link: &str, master: &str) -> Result<()> {
        // bonding refuses slaves that are up
        self.set_up(link, false).await?;
        self.ip(&["link", "set", "dev", link, "master", master]).await?;
        self.set_up(link, true).await
    }

    async fn clear_master(&self, link: &str) -> Result<()> {
        self.ip(&["link", "set", "dev", link, "nomaster"]).await?;
        self.set_up(link, true).await
    }

    async fn set_mtu(&self, link: &str, mtu: u32) -> Result<()> {
        let mtu = mtu.to_string();
        self.ip(&["link", "set", "dev", link, "mtu", &mtu]).await.map(|_| ())
    }

    async fn set_hw_address(&self, link: &str, mac: &MacAddr) -> Result<()> {
        let mac = mac.to_string();
        self.ip(&["link", "set", "dev", link, "address", &mac]).await.map(|_| ())
    }

    async fn set_up(&self, link: &str, up: bool) -> Result<()> {
        let state = if up { "up" } else { "down" };
        self.ip(&["link", "set", "dev", link, state]).await.map(|_| ())
    }

    async fn add_address(&self, link: &str, address: &IpAssignment) -> Result<()> {
        let address = address.to_string();
        self.ip(&["addr", "add", &address, "dev", link]).await.map(|_| ())
    }

    async fn delete_address(&self, link: &str, address: &IpAssignment) -> Result<()> {
        let address = address.to_string();
        self.ip(&["addr", "del", &address, "dev", link]).await.map(|_| ())
    }

    async fn flush_addresses(&self, link: &str) -> Result<()> {
        self.ip(&["addr", "flush", "dev", link]).await.map(|_| ())
    }

    async fn start_dhcp(&self, link: &str) -> Result<()> {
        self.execute(&self.dhclient_path, &["-nw", link]).await.map(|_| ())
    }

    async fn stop_dhcp(&self, link: &str) -> Result<()> {
        self.execute(&self.dhclient_path, &["-r", link]).await.map(|_| ())
    }
}
