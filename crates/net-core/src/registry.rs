//! Live link registry
//!
//! Read-only view of the kernel link and address tables. Every query goes to
//! the backend; only the physical port list is cached, and only until the
//! next [`LinkRegistry::refresh`].

use indexmap::IndexMap;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::backend::{KernelAddress, KernelLink, LinkBackend};
use crate::error::NetworkError;
use crate::types::{AddressProtocol, HaConfig, IpAssignment, Link, LinkKind};
use crate::Result;

/// Query filter for [`LinkRegistry::list_links`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFilter {
    #[serde(default)]
    pub kind: Option<LinkKind>,
    #[serde(default)]
    pub name: Option<String>,
}

impl LinkFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(kind: LinkKind) -> Self {
        Self {
            kind: Some(kind),
            name: None,
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            kind: None,
            name: Some(name.into()),
        }
    }

    pub fn matches(&self, link: &KernelLink) -> bool {
        self.kind.map_or(true, |kind| link.kind == kind)
            && self.name.as_deref().map_or(true, |name| link.name == name)
    }
}

/// Physical port naming convention and display aliases
#[derive(Debug, Clone)]
pub struct PortNaming {
    pattern: Regex,
    aliases: IndexMap<String, String>,
}

impl PortNaming {
    pub fn new(pattern: &str, aliases: IndexMap<String, String>) -> Result<Self> {
        let pattern =
            Regex::new(pattern).map_err(|_| NetworkError::invalid("port_pattern", pattern))?;
        Ok(Self { pattern, aliases })
    }

    pub fn is_physical_port(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }
}

impl Default for PortNaming {
    fn default() -> Self {
        Self {
            pattern: Regex::new(crate::types::PHYSICAL_PORT_PATTERN)
                .unwrap_or_else(|_| unreachable!("built-in pattern is valid")),
            aliases: IndexMap::new(),
        }
    }
}

/// Pick the primary address among one link's kernel addresses.
///
/// A lease managed address wins, then the first address without the kernel
/// `secondary` flag. Everything else is returned as secondary.
pub fn resolve_addresses(addresses: &[&KernelAddress]) -> (Option<IpAssignment>, Vec<IpAssignment>) {
    let primary_index = addresses
        .iter()
        .position(|a| a.dynamic)
        .or_else(|| addresses.iter().position(|a| !a.secondary));

    let to_assignment = |a: &KernelAddress| {
        let protocol = if a.dynamic {
            AddressProtocol::Dhcp
        } else {
            AddressProtocol::Static
        };
        IpAssignment::new(a.address, a.prefix_len, protocol)
    };

    let primary = primary_index.map(|i| to_assignment(addresses[i]));
    let secondaries = addresses
        .iter()
        .enumerate()
        .filter(|(i, a)| {
            Some(*i) != primary_index
                && primary
                    .as_ref()
                    .map_or(true, |p| !a.matches(p))
        })
        .map(|(_, a)| to_assignment(*a))
        .collect();

    (primary, secondaries)
}

/// One composite link a member is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub owner: String,
    pub kind: LinkKind,
}

/// Who holds whom, aggregated over bridges, bonds and VLANs
#[derive(Debug, Clone, Default)]
pub struct AttachmentIndex {
    by_member: HashMap<String, Vec<Attachment>>,
}

impl AttachmentIndex {
    pub fn build(links: &[KernelLink]) -> Self {
        let kinds: HashMap<&str, LinkKind> =
            links.iter().map(|l| (l.name.as_str(), l.kind)).collect();
        let mut by_member: HashMap<String, Vec<Attachment>> = HashMap::new();

        for link in links {
            if let Some(master) = &link.master {
                by_member
                    .entry(link.name.clone())
                    .or_default()
                    .push(Attachment {
                        owner: master.clone(),
                        kind: kinds.get(master.as_str()).copied().unwrap_or(LinkKind::Other),
                    });
            }
            if let (LinkKind::Vlan, Some(parent)) = (link.kind, &link.parent) {
                by_member.entry(parent.clone()).or_default().push(Attachment {
                    owner: link.name.clone(),
                    kind: LinkKind::Vlan,
                });
            }
        }

        Self { by_member }
    }

    pub fn attachments(&self, member: &str) -> &[Attachment] {
        self.by_member
            .get(member)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_attached(&self, member: &str) -> bool {
        !self.attachments(member).is_empty()
    }

    /// Exclusive owner (bridge or bond) of `member`, VLANs do not count
    pub fn master_of(&self, member: &str) -> Option<&Attachment> {
        self.attachments(member)
            .iter()
            .find(|a| matches!(a.kind, LinkKind::Bridge | LinkKind::Bond))
    }

    /// Members of `owner`, sorted
    pub fn members_of(&self, owner: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .by_member
            .iter()
            .filter(|(_, attachments)| {
                attachments
                    .iter()
                    .any(|a| a.owner == owner && a.kind != LinkKind::Vlan)
            })
            .map(|(member, _)| member.clone())
            .collect();
        members.sort();
        members
    }
}

/// Physical port as presented to the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalInterface {
    #[serde(flatten)]
    pub link: Link,
    pub attached_to: Vec<Attachment>,
    pub ha_owned: bool,
    /// Free for every change: attached to nothing and not HA-owned
    pub editable: bool,
    /// Addresses may change; true also for a port that only carries VLANs
    pub addresses_editable: bool,
}

/// Snapshot of both kernel tables taken together
pub struct KernelSnapshot {
    pub links: Vec<KernelLink>,
    pub addresses: Vec<KernelAddress>,
}

impl KernelSnapshot {
    pub fn attachments(&self) -> AttachmentIndex {
        AttachmentIndex::build(&self.links)
    }
}

pub struct LinkRegistry {
    backend: Arc<dyn LinkBackend>,
    naming: RwLock<PortNaming>,
    physical_ports: RwLock<Option<Vec<String>>>,
}

impl LinkRegistry {
    pub fn new(backend: Arc<dyn LinkBackend>, naming: PortNaming) -> Self {
        Self {
            backend,
            naming: RwLock::new(naming),
            physical_ports: RwLock::new(None),
        }
    }

    pub fn backend(&self) -> &Arc<dyn LinkBackend> {
        &self.backend
    }

    /// Replace the naming convention and drop the port cache
    pub async fn set_naming(&self, naming: PortNaming) {
        *self.naming.write().await = naming;
        *self.physical_ports.write().await = None;
    }

    /// Re-read the kernel and rebuild the physical port cache
    pub async fn refresh(&self) -> Result<Vec<String>> {
        let links = self.backend.links().await?;
        let naming = self.naming.read().await;
        let ports: Vec<String> = links
            .iter()
            .filter(|l| l.kind == LinkKind::Physical && naming.is_physical_port(&l.name))
            .map(|l| l.name.clone())
            .collect();
        debug!("physical ports: {}", ports.join(", "));
        *self.physical_ports.write().await = Some(ports.clone());
        Ok(ports)
    }

    /// Cached physical port names
    pub async fn physical_ports(&self) -> Result<Vec<String>> {
        if let Some(ports) = self.physical_ports.read().await.as_ref() {
            return Ok(ports.clone());
        }
        self.refresh().await
    }

    pub async fn snapshot(&self) -> Result<KernelSnapshot> {
        Ok(KernelSnapshot {
            links: self.backend.links().await?,
            addresses: self.backend.addresses().await?,
        })
    }

    /// Live links matching `filter`, with addresses resolved
    pub async fn list_links(&self, filter: &LinkFilter) -> Result<Vec<Link>> {
        let snapshot = self.snapshot().await?;
        self.assemble(&snapshot, filter).await
    }

    pub async fn assemble(&self, snapshot: &KernelSnapshot, filter: &LinkFilter) -> Result<Vec<Link>> {
        let naming = self.naming.read().await;
        Ok(snapshot
            .links
            .iter()
            .filter(|l| filter.matches(l))
            .map(|l| Self::to_link(l, &snapshot.addresses, &naming))
            .collect())
    }

    /// One live link; absence is an error
    pub async fn link(&self, name: &str) -> Result<Link> {
        self.list_links(&LinkFilter::name(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NetworkError::not_found("link", name))
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.backend.links().await?.iter().any(|l| l.name == name))
    }

    pub async fn primary_address(&self, name: &str) -> Result<Option<IpAssignment>> {
        Ok(self.link(name).await?.primary)
    }

    pub async fn attachments(&self) -> Result<AttachmentIndex> {
        Ok(AttachmentIndex::build(&self.backend.links().await?))
    }

    /// Link currently holding `address`, if any
    pub async fn address_owner(&self, address: &IpAddr) -> Result<Option<String>> {
        Ok(self
            .backend
            .addresses()
            .await?
            .into_iter()
            .find(|a| &a.address == address)
            .map(|a| a.link))
    }

    /// Physical ports with their attachment and edit eligibility.
    ///
    /// Loopback and names outside the port convention are never listed.
    pub async fn physical_interfaces(&self, ha: Option<&HaConfig>) -> Result<Vec<PhysicalInterface>> {
        let snapshot = self.snapshot().await?;
        let index = snapshot.attachments();
        let naming = self.naming.read().await;

        Ok(snapshot
            .links
            .iter()
            .filter(|l| l.kind == LinkKind::Physical && naming.is_physical_port(&l.name))
            .map(|l| {
                let attached_to = index.attachments(&l.name).to_vec();
                let ha_owned = ha.map_or(false, |ha| ha.owns_link(&l.name));
                PhysicalInterface {
                    link: Self::to_link(l, &snapshot.addresses, &naming),
                    editable: attached_to.is_empty() && !ha_owned,
                    addresses_editable: index.master_of(&l.name).is_none() && !ha_owned,
                    attached_to,
                    ha_owned,
                }
            })
            .collect())
    }

    fn to_link(link: &KernelLink, addresses: &[KernelAddress], naming: &PortNaming) -> Link {
        let own: Vec<&KernelAddress> = addresses.iter().filter(|a| a.link == link.name).collect();
        let (primary, secondaries) = resolve_addresses(&own);

        Link {
            name: link.name.clone(),
            kind: link.kind,
            index: link.index,
            hw_address: link.hw_address.clone(),
            mtu: link.mtu,
            oper_state: link.oper_state,
            stats: link.stats.clone(),
            master: link.master.clone(),
            parent: link.parent.clone(),
            vlan_id: link.vlan_id,
            bond_mode: link.bond_mode,
            slave_state: link.slave_state,
            primary,
            secondaries,
            alias: naming.alias(&link.name).map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NewLink;
    use crate::memory::MemoryBackend;
    use crate::types::{BondMode, HaMode, HaRole};

    fn kernel_address(addr: &str, prefix: u8, dynamic: bool, secondary: bool) -> KernelAddress {
        KernelAddress {
            link: "eth0".to_string(),
            address: addr.parse().unwrap(),
            prefix_len: prefix,
            dynamic,
            secondary,
        }
    }

    #[test]
    fn test_dhcp_address_wins_over_flagged_primary() {
        let static_primary = kernel_address("10.0.0.1", 24, false, false);
        let lease = kernel_address("10.0.0.50", 24, true, true);
        let (primary, secondaries) = resolve_addresses(&[&static_primary, &lease]);

        let primary = primary.unwrap();
        assert_eq!(primary.to_string(), "10.0.0.50/24");
        assert_eq!(primary.protocol, AddressProtocol::Dhcp);
        assert_eq!(secondaries.len(), 1);
        assert_eq!(secondaries[0].to_string(), "10.0.0.1/24");
    }

    #[test]
    fn test_first_unflagged_address_is_primary() {
        let a = kernel_address("10.0.0.1", 24, false, false);
        let b = kernel_address("10.0.0.2", 24, false, true);
        let c = kernel_address("10.1.0.1", 24, false, false);
        let (primary, secondaries) = resolve_addresses(&[&a, &b, &c]);

        assert_eq!(primary.unwrap().to_string(), "10.0.0.1/24");
        assert_eq!(secondaries.len(), 2);
    }

    #[test]
    fn test_no_primary_without_candidates() {
        let only_secondary = kernel_address("10.0.0.2", 24, false, true);
        let (primary, secondaries) = resolve_addresses(&[&only_secondary]);
        assert!(primary.is_none());
        assert_eq!(secondaries.len(), 1);

        let (primary, secondaries) = resolve_addresses(&[]);
        assert!(primary.is_none());
        assert!(secondaries.is_empty());
    }

    #[tokio::test]
    async fn test_single_primary_after_lease_change() {
        let backend = Arc::new(MemoryBackend::with_ports(&["eth0"]));
        let registry = LinkRegistry::new(backend.clone(), PortNaming::default());

        backend
            .add_address("eth0", &"10.0.0.1/24".parse().unwrap())
            .await
            .unwrap();
        backend.set_dhcp_lease("eth0", "10.0.0.77/24".parse().unwrap());
        backend.start_dhcp("eth0").await.unwrap();

        let link = registry.link("eth0").await.unwrap();
        let primaries = link.addresses().filter(|a| Some(*a) == link.primary.as_ref()).count();
        assert_eq!(primaries, 1);
        assert_eq!(link.primary.unwrap().to_string(), "10.0.0.77/24");
    }

    #[tokio::test]
    async fn test_unknown_link_is_not_found() {
        let registry = LinkRegistry::new(
            Arc::new(MemoryBackend::with_ports(&["eth0"])),
            PortNaming::default(),
        );
        let err = registry.primary_address("eth9").await.unwrap_err();
        assert!(matches!(err, NetworkError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_physical_listing_excludes_loopback_and_foreign_names() {
        let backend = Arc::new(MemoryBackend::with_ports(&["eth0", "eth1", "wlan0"]));
        let mut aliases = IndexMap::new();
        aliases.insert("eth0".to_string(), "MGMT".to_string());
        let registry = LinkRegistry::new(
            backend.clone(),
            PortNaming::new(r"^eth[0-9]+$", aliases).unwrap(),
        );

        let ports = registry.physical_interfaces(None).await.unwrap();
        let names: Vec<&str> = ports.iter().map(|p| p.link.name.as_str()).collect();
        assert_eq!(names, vec!["eth0", "eth1"]);
        assert_eq!(ports[0].link.alias.as_deref(), Some("MGMT"));
        assert_eq!(registry.physical_ports().await.unwrap(), vec!["eth0", "eth1"]);
    }

    #[tokio::test]
    async fn test_attached_and_ha_owned_ports_are_not_editable() {
        let backend = Arc::new(MemoryBackend::with_ports(&["eth0", "eth1", "eth2", "eth3"]));
        backend
            .create_link(&NewLink::Bond {
                name: "BOND_A".to_string(),
                mode: BondMode::ActiveBackup,
            })
            .await
            .unwrap();
        backend.set_master("eth1", "BOND_A").await.unwrap();
        backend
            .create_link(&NewLink::Vlan {
                name: "VLAN_10".to_string(),
                parent: "eth2".to_string(),
                vlan_id: 10,
            })
            .await
            .unwrap();

        let ha = HaConfig {
            mode: HaMode::ActiveBackup,
            role: HaRole::Primary,
            ha_link: "eth3".to_string(),
            peer_ip: "172.16.0.2".parse().unwrap(),
            password: "secret".to_string(),
            keepalive: None,
            monitored: Vec::new(),
        };

        let registry = LinkRegistry::new(backend, PortNaming::default());
        let ports = registry.physical_interfaces(Some(&ha)).await.unwrap();
        let editable: Vec<(&str, bool)> = ports
            .iter()
            .map(|p| (p.link.name.as_str(), p.editable))
            .collect();
        assert_eq!(
            editable,
            vec![("eth0", true), ("eth1", false), ("eth2", false), ("eth3", false)]
        );
        assert_eq!(ports[1].attached_to[0].kind, LinkKind::Bond);
        assert_eq!(ports[2].attached_to[0].owner, "VLAN_10");

        let index = registry.attachments().await.unwrap();
        assert_eq!(index.members_of("BOND_A"), vec!["eth1"]);
        assert!(index.master_of("eth2").is_none());
    }
}
