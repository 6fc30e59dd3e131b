//! Kernel link/address access

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::types::{
    BondMode, IpAssignment, LinkKind, LinkStats, MacAddr, OperState, SlaveState,
};
use crate::Result;

/// A link exactly as the kernel reports it, before address resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelLink {
    pub name: String,
    pub index: u32,
    pub kind: LinkKind,
    pub hw_address: Option<MacAddr>,
    pub mtu: u32,
    pub oper_state: OperState,
    pub stats: LinkStats,
    pub master: Option<String>,
    pub parent: Option<String>,
    pub vlan_id: Option<u16>,
    pub bond_mode: Option<BondMode>,
    pub slave_state: Option<SlaveState>,
}

impl KernelLink {
    pub fn new(name: impl Into<String>, kind: LinkKind) -> Self {
        Self {
            name: name.into(),
            index: 0,
            kind,
            hw_address: None,
            mtu: 1500,
            oper_state: OperState::Down,
            stats: LinkStats::default(),
            master: None,
            parent: None,
            vlan_id: None,
            bond_mode: None,
            slave_state: None,
        }
    }
}

/// One entry of the kernel address table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelAddress {
    pub link: String,
    pub address: IpAddr,
    pub prefix_len: u8,
    /// Lease managed address (kernel `dynamic` flag)
    pub dynamic: bool,
    /// Kernel `secondary` flag; addresses without it are primary for their subnet
    pub secondary: bool,
}

impl KernelAddress {
    pub fn matches(&self, assignment: &IpAssignment) -> bool {
        self.address == assignment.address && self.prefix_len == assignment.prefix_len
    }
}

/// Composite link to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewLink {
    Vlan {
        name: String,
        parent: String,
        vlan_id: u16,
    },
    Bridge {
        name: String,
    },
    Bond {
        name: String,
        mode: BondMode,
    },
}

impl NewLink {
    pub fn name(&self) -> &str {
        match self {
            NewLink::Vlan { name, .. } | NewLink::Bridge { name } | NewLink::Bond { name, .. } => {
                name
            }
        }
    }

    pub fn kind(&self) -> LinkKind {
        match self {
            NewLink::Vlan { .. } => LinkKind::Vlan,
            NewLink::Bridge { .. } => LinkKind::Bridge,
            NewLink::Bond { .. } => LinkKind::Bond,
        }
    }
}

/// Everything the appliance needs from the kernel.
///
/// Each call maps to one netlink operation; nothing here is transactional.
#[async_trait]
pub trait LinkBackend: Send + Sync {
    async fn links(&self) -> Result<Vec<KernelLink>>;

    async fn addresses(&self) -> Result<Vec<KernelAddress>>;

    async fn create_link(&self, link: &NewLink) -> Result<()>;

    async fn delete_link(&self, name: &str) -> Result<()>;

    async fn set_master(&self, link: &str, master: &str) -> Result<()>;

    async fn clear_master(&self, link: &str) -> Result<()>;

    async fn set_mtu(&self, link: &str, mtu: u32) -> Result<()>;

    async fn set_hw_address(&self, link: &str, mac: &MacAddr) -> Result<()>;

    async fn set_up(&self, link: &str, up: bool) -> Result<()>;

    async fn add_address(&self, link: &str, address: &IpAssignment) -> Result<()>;

    async fn delete_address(&self, link: &str, address: &IpAssignment) -> Result<()>;

    async fn flush_addresses(&self, link: &str) -> Result<()>;

    async fn start_dhcp(&self, link: &str) -> Result<()>;

    async fn stop_dhcp(&self, link: &str) -> Result<()>;
}
