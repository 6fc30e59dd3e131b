//! In-memory kernel used by tests and dry runs

use async_trait::async_trait;
use ipnet::IpNet;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::backend::{KernelAddress, KernelLink, LinkBackend, NewLink};
use crate::error::{KernelError, NetworkError};
use crate::types::{IpAssignment, LinkKind, MacAddr, OperState, SlaveState};
use crate::Result;

#[derive(Default)]
struct KernelState {
    links: Vec<KernelLink>,
    addresses: Vec<KernelAddress>,
    leases: HashMap<String, IpAssignment>,
    dhcp_clients: HashSet<String>,
    failures: HashSet<(String, String)>,
    one_shot_failures: HashSet<(String, String)>,
    operations: Vec<String>,
    next_index: u32,
}

/// Kernel link table kept in memory.
///
/// Follows the kernel rules the appliance depends on: an address added to a
/// subnet that already has an address on the link becomes secondary, deleting
/// a link releases its slaves and removes VLANs stacked on it, and deleting a
/// primary promotes the next secondary of the same subnet.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<KernelState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend preloaded with `lo` and the given physical ports
    pub fn with_ports(ports: &[&str]) -> Self {
        let backend = Self::new();
        {
            let mut state = backend.lock();
            let mut lo = KernelLink::new("lo", LinkKind::Loopback);
            lo.mtu = 65536;
            lo.oper_state = OperState::Up;
            Self::insert_link(&mut state, lo);
            for (i, port) in ports.iter().enumerate() {
                let mut link = KernelLink::new(*port, LinkKind::Physical);
                link.hw_address = format!("02:00:00:00:00:{:02x}", i + 1).parse().ok();
                link.oper_state = OperState::Up;
                Self::insert_link(&mut state, link);
            }
        }
        backend
    }

    /// Address handed out when DHCP is started on `link`
    pub fn set_dhcp_lease(&self, link: &str, lease: IpAssignment) {
        self.lock().leases.insert(link.to_string(), lease);
    }

    /// Make `operation` fail for `link` until cleared
    pub fn fail_on(&self, operation: &str, link: &str) {
        self.lock()
            .failures
            .insert((operation.to_string(), link.to_string()));
    }

    /// Make the next `operation` on `link` fail; later calls succeed
    pub fn fail_once(&self, operation: &str, link: &str) {
        self.lock()
            .one_shot_failures
            .insert((operation.to_string(), link.to_string()));
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failures.clear();
        state.one_shot_failures.clear();
    }

    /// Successful mutations in call order, e.g. `set_master eth1 BOND_A`
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    pub fn link(&self, name: &str) -> Option<KernelLink> {
        self.lock().links.iter().find(|l| l.name == name).cloned()
    }

    pub fn addresses_of(&self, name: &str) -> Vec<KernelAddress> {
        self.lock()
            .addresses
            .iter()
            .filter(|a| a.link == name)
            .cloned()
            .collect()
    }

    /// Inject an address as if configured outside this system
    pub fn insert_address(&self, address: KernelAddress) {
        self.lock().addresses.push(address);
    }

    pub fn dhcp_running(&self, link: &str) -> bool {
        self.lock().dhcp_clients.contains(link)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, KernelState> {
        // A panic while holding the lock can only come from a test assertion
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert_link(state: &mut KernelState, mut link: KernelLink) {
        state.next_index += 1;
        link.index = state.next_index;
        state.links.push(link);
    }

    fn check(state: &mut KernelState, operation: &str, link: &str) -> Result<()> {
        let key = (operation.to_string(), link.to_string());
        if state.failures.contains(&key) || state.one_shot_failures.remove(&key) {
            return Err(Self::error(operation, link, "injected failure"));
        }
        Ok(())
    }

    fn error(operation: &str, link: &str, message: &str) -> NetworkError {
        NetworkError::Kernel(KernelError::Operation {
            operation: operation.to_string(),
            link: link.to_string(),
            message: message.to_string(),
        })
    }

    fn find_mut<'a>(state: &'a mut KernelState, operation: &str, name: &str) -> Result<&'a mut KernelLink> {
        state
            .links
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| Self::error(operation, name, "Cannot find device"))
    }

    fn record(state: &mut KernelState, entry: String) {
        state.operations.push(entry);
    }

    fn same_subnet(a: &KernelAddress, b: &IpAssignment) -> bool {
        match IpNet::new(a.address, a.prefix_len) {
            Ok(net) => a.prefix_len == b.prefix_len && net.trunc().contains(&b.address),
            Err(_) => false,
        }
    }

    fn refresh_slave_states(state: &mut KernelState, bond: &str) {
        let active_backup = state
            .links
            .iter()
            .find(|l| l.name == bond)
            .and_then(|l| l.bond_mode)
            .map(|mode| mode == crate::types::BondMode::ActiveBackup)
            .unwrap_or(false);
        let mut first = true;
        for link in state
            .links
            .iter_mut()
            .filter(|l| l.master.as_deref() == Some(bond))
        {
            link.slave_state = if !active_backup || first {
                Some(SlaveState::Active)
            } else {
                Some(SlaveState::Backup)
            };
            first = false;
        }
    }
}

#[async_trait]
impl LinkBackend for MemoryBackend {
    async fn links(&self) -> Result<Vec<KernelLink>> {
        Ok(self.lock().links.clone())
    }

    async fn addresses(&self) -> Result<Vec<KernelAddress>> {
        Ok(self.lock().addresses.clone())
    }

    async fn create_link(&self, link: &NewLink) -> Result<()> {
        let mut state = self.lock();
        let name = link.name();
        Self::check(&mut state, "create_link", name)?;
        if state.links.iter().any(|l| l.name == name) {
            return Err(Self::error("create_link", name, "File exists"));
        }

        let mut created = KernelLink::new(name, link.kind());
        match link {
            NewLink::Vlan {
                parent, vlan_id, ..
            } => {
                let lower = state
                    .links
                    .iter()
                    .find(|l| &l.name == parent)
                    .ok_or_else(|| Self::error("create_link", parent, "Cannot find device"))?;
                created.mtu = lower.mtu;
                created.hw_address = lower.hw_address.clone();
                created.parent = Some(parent.clone());
                created.vlan_id = Some(*vlan_id);
            }
            NewLink::Bridge { .. } => {}
            NewLink::Bond { mode, .. } => created.bond_mode = Some(*mode),
        }
        Self::insert_link(&mut state, created);
        Self::record(&mut state, format!("create_link {}", name));
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "delete_link", name)?;
        let kind = Self::find_mut(&mut state, "delete_link", name)?.kind;
        if !kind.is_composite() {
            return Err(Self::error("delete_link", name, "Operation not supported"));
        }

        let stacked: Vec<String> = state
            .links
            .iter()
            .filter(|l| l.parent.as_deref() == Some(name))
            .map(|l| l.name.clone())
            .collect();
        state
            .links
            .retain(|l| l.name != name && !stacked.contains(&l.name));
        state
            .addresses
            .retain(|a| a.link != name && !stacked.contains(&a.link));
        for link in state.links.iter_mut() {
            if link.master.as_deref() == Some(name) {
                link.master = None;
                link.slave_state = None;
            }
        }
        Self::record(&mut state, format!("delete_link {}", name));
        Ok(())
    }

    async fn set_master(&self, link: &str, master: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "set_master", link)?;
        let master_kind = Self::find_mut(&mut state, "set_master", master)?.kind;
        if !matches!(master_kind, LinkKind::Bridge | LinkKind::Bond) {
            return Err(Self::error("set_master", master, "Operation not supported"));
        }
        let slave = Self::find_mut(&mut state, "set_master", link)?;
        if let Some(current) = &slave.master {
            if current != master {
                return Err(Self::error("set_master", link, "Device or resource busy"));
            }
        }
        slave.master = Some(master.to_string());
        if master_kind == LinkKind::Bond {
            Self::refresh_slave_states(&mut state, master);
        }
        Self::record(&mut state, format!("set_master {} {}", link, master));
        Ok(())
    }

    async fn clear_master(&self, link: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "clear_master", link)?;
        let slave = Self::find_mut(&mut state, "clear_master", link)?;
        let previous = slave.master.take();
        slave.slave_state = None;
        if let Some(bond) = previous {
            Self::refresh_slave_states(&mut state, &bond);
        }
        Self::record(&mut state, format!("clear_master {}", link));
        Ok(())
    }

    async fn set_mtu(&self, link: &str, mtu: u32) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "set_mtu", link)?;
        Self::find_mut(&mut state, "set_mtu", link)?.mtu = mtu;
        Self::record(&mut state, format!("set_mtu {} {}", link, mtu));
        Ok(())
    }

    async fn set_hw_address(&self, link: &str, mac: &MacAddr) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "set_hw_address", link)?;
        Self::find_mut(&mut state, "set_hw_address", link)?.hw_address = Some(mac.clone());
        Self::record(&mut state, format!("set_hw_address {} {}", link, mac));
        Ok(())
    }

    async fn set_up(&self, link: &str, up: bool) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "set_up", link)?;
        Self::find_mut(&mut state, "set_up", link)?.oper_state =
            if up { OperState::Up } else { OperState::Down };
        Self::record(&mut state, format!("set_up {} {}", link, up));
        Ok(())
    }

    async fn add_address(&self, link: &str, address: &IpAssignment) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "add_address", link)?;
        Self::find_mut(&mut state, "add_address", link)?;
        let on_link: Vec<&KernelAddress> =
            state.addresses.iter().filter(|a| a.link == link).collect();
        if on_link.iter().any(|a| a.matches(address)) {
            return Err(Self::error("add_address", link, "Address already assigned"));
        }
        let secondary = on_link.iter().any(|a| Self::same_subnet(a, address));
        state.addresses.push(KernelAddress {
            link: link.to_string(),
            address: address.address,
            prefix_len: address.prefix_len,
            dynamic: false,
            secondary,
        });
        Self::record(&mut state, format!("add_address {} {}", link, address));
        Ok(())
    }

    async fn delete_address(&self, link: &str, address: &IpAssignment) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "delete_address", link)?;
        let position = state
            .addresses
            .iter()
            .position(|a| a.link == link && a.matches(address))
            .ok_or_else(|| Self::error("delete_address", link, "Cannot assign requested address"))?;
        let removed = state.addresses.remove(position);
        if !removed.secondary {
            if let Some(promoted) = state.addresses.iter_mut().find(|a| {
                a.link == link
                    && a.secondary
                    && Self::same_subnet(
                        &removed,
                        &IpAssignment::static_address(a.address, a.prefix_len),
                    )
            }) {
                promoted.secondary = false;
            }
        }
        Self::record(&mut state, format!("delete_address {} {}", link, address));
        Ok(())
    }

    async fn flush_addresses(&self, link: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "flush_addresses", link)?;
        Self::find_mut(&mut state, "flush_addresses", link)?;
        state.addresses.retain(|a| a.link != link);
        Self::record(&mut state, format!("flush_addresses {}", link));
        Ok(())
    }

    async fn start_dhcp(&self, link: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "start_dhcp", link)?;
        Self::find_mut(&mut state, "start_dhcp", link)?;
        state.dhcp_clients.insert(link.to_string());
        if let Some(lease) = state.leases.get(link).cloned() {
            let secondary = state
                .addresses
                .iter()
                .any(|a| a.link == link && Self::same_subnet(a, &lease));
            state.addresses.push(KernelAddress {
                link: link.to_string(),
                address: lease.address,
                prefix_len: lease.prefix_len,
                dynamic: true,
                secondary,
            });
        }
        Self::record(&mut state, format!("start_dhcp {}", link));
        Ok(())
    }

    async fn stop_dhcp(&self, link: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&mut state, "stop_dhcp", link)?;
        state.dhcp_clients.remove(link);
        state.addresses.retain(|a| !(a.link == link && a.dynamic));
        Self::record(&mut state, format!("stop_dhcp {}", link));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_address_in_subnet_is_secondary() {
        let backend = MemoryBackend::with_ports(&["eth0"]);
        backend
            .add_address("eth0", &"10.0.0.1/24".parse().unwrap())
            .await
            .unwrap();
        backend
            .add_address("eth0", &"10.0.0.2/24".parse().unwrap())
            .await
            .unwrap();
        backend
            .add_address("eth0", &"10.1.0.1/24".parse().unwrap())
            .await
            .unwrap();

        let flags: Vec<bool> = backend
            .addresses_of("eth0")
            .iter()
            .map(|a| a.secondary)
            .collect();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[tokio::test]
    async fn test_deleting_primary_promotes_secondary() {
        let backend = MemoryBackend::with_ports(&["eth0"]);
        let first: IpAssignment = "10.0.0.1/24".parse().unwrap();
        backend.add_address("eth0", &first).await.unwrap();
        backend
            .add_address("eth0", &"10.0.0.2/24".parse().unwrap())
            .await
            .unwrap();

        backend.delete_address("eth0", &first).await.unwrap();

        let remaining = backend.addresses_of("eth0");
        assert_eq!(remaining.len(), 1);
        assert!(!remaining[0].secondary);
    }

    #[tokio::test]
    async fn test_delete_bond_releases_slaves() {
        let backend = MemoryBackend::with_ports(&["eth1", "eth2"]);
        backend
            .create_link(&NewLink::Bond {
                name: "BOND_A".to_string(),
                mode: crate::types::BondMode::ActiveBackup,
            })
            .await
            .unwrap();
        backend.set_master("eth1", "BOND_A").await.unwrap();
        backend.set_master("eth2", "BOND_A").await.unwrap();
        assert_eq!(
            backend.link("eth2").unwrap().slave_state,
            Some(SlaveState::Backup)
        );

        backend.delete_link("BOND_A").await.unwrap();
        assert!(backend.link("BOND_A").is_none());
        assert_eq!(backend.link("eth1").unwrap().master, None);
    }

    #[tokio::test]
    async fn test_physical_links_cannot_be_deleted() {
        let backend = MemoryBackend::with_ports(&["eth0"]);
        assert!(backend.delete_link("eth0").await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = MemoryBackend::with_ports(&["eth0"]);
        backend.fail_on("set_mtu", "eth0");
        assert!(backend.set_mtu("eth0", 9000).await.is_err());
        backend.clear_failures();
        assert!(backend.set_mtu("eth0", 9000).await.is_ok());
        assert_eq!(backend.operations(), vec!["set_mtu eth0 9000"]);
    }

    #[tokio::test]
    async fn test_one_shot_failure() {
        let backend = MemoryBackend::with_ports(&["eth0"]);
        backend.fail_once("set_mtu", "eth0");
        assert!(backend.set_mtu("eth0", 9000).await.is_err());
        assert!(backend.set_mtu("eth0", 9000).await.is_ok());
    }
}
