use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

use crate::error::SharedTypeError;

/// Kind of a kernel-visible link as far as the appliance cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Physical,
    Vlan,
    Bridge,
    Bond,
    Loopback,
    Other,
}

impl LinkKind {
    pub fn is_composite(&self) -> bool {
        matches!(self, LinkKind::Vlan | LinkKind::Bridge | LinkKind::Bond)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Physical => "physical",
            LinkKind::Vlan => "vlan",
            LinkKind::Bridge => "bridge",
            LinkKind::Bond => "bond",
            LinkKind::Loopback => "loopback",
            LinkKind::Other => "other",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkKind {
    type Err = SharedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "physical" => Ok(LinkKind::Physical),
            "vlan" => Ok(LinkKind::Vlan),
            "bridge" => Ok(LinkKind::Bridge),
            "bond" => Ok(LinkKind::Bond),
            "loopback" => Ok(LinkKind::Loopback),
            "other" => Ok(LinkKind::Other),
            other => Err(SharedTypeError::Unsupported(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperState {
    Up,
    Down,
    #[default]
    Unknown,
}

impl OperState {
    /// Maps the kernel's `operstate` string.
    pub fn from_kernel(state: &str) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "UP" => OperState::Up,
            "DOWN" | "LOWERLAYERDOWN" | "NOTPRESENT" | "DORMANT" => OperState::Down,
            _ => OperState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondMode {
    #[serde(rename = "balance-rr")]
    RoundRobin,
    #[serde(rename = "active-backup")]
    ActiveBackup,
    #[serde(rename = "balance-xor")]
    Xor,
    #[serde(rename = "broadcast")]
    Broadcast,
    #[serde(rename = "802.3ad")]
    Ieee8023ad,
    #[serde(rename = "balance-tlb")]
    BalanceTlb,
    #[serde(rename = "balance-alb")]
    BalanceAlb,
}

impl BondMode {
    /// Name understood by `ip link add ... type bond mode <name>`.
    pub fn kernel_name(&self) -> &'static str {
        match self {
            BondMode::RoundRobin => "balance-rr",
            BondMode::ActiveBackup => "active-backup",
            BondMode::Xor => "balance-xor",
            BondMode::Broadcast => "broadcast",
            BondMode::Ieee8023ad => "802.3ad",
            BondMode::BalanceTlb => "balance-tlb",
            BondMode::BalanceAlb => "balance-alb",
        }
    }
}

impl fmt::Display for BondMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kernel_name())
    }
}

impl FromStr for BondMode {
    type Err = SharedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" | "balance-rr" => Ok(BondMode::RoundRobin),
            "1" | "active-backup" => Ok(BondMode::ActiveBackup),
            "2" | "balance-xor" => Ok(BondMode::Xor),
            "3" | "broadcast" => Ok(BondMode::Broadcast),
            "4" | "802.3ad" => Ok(BondMode::Ieee8023ad),
            "5" | "balance-tlb" => Ok(BondMode::BalanceTlb),
            "6" | "balance-alb" => Ok(BondMode::BalanceAlb),
            other => Err(SharedTypeError::Unsupported(other.to_string())),
        }
    }
}

/// Bonding state of a single slave as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaveState {
    Active,
    Backup,
}

impl FromStr for SlaveState {
    type Err = SharedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(SlaveState::Active),
            "BACKUP" => Ok(SlaveState::Backup),
            other => Err(SharedTypeError::Unsupported(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressProtocol {
    #[default]
    Static,
    Dhcp,
}

impl fmt::Display for AddressProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressProtocol::Static => f.write_str("static"),
            AddressProtocol::Dhcp => f.write_str("dhcp"),
        }
    }
}

/// An address held by a link, either as its primary address or as an alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpAssignment {
    pub address: IpAddr,
    pub prefix_len: u8,
    #[serde(default)]
    pub protocol: AddressProtocol,
}

impl IpAssignment {
    pub fn new(address: IpAddr, prefix_len: u8, protocol: AddressProtocol) -> Self {
        Self {
            address,
            prefix_len,
            protocol,
        }
    }

    pub fn static_address(address: IpAddr, prefix_len: u8) -> Self {
        Self::new(address, prefix_len, AddressProtocol::Static)
    }

    pub fn max_prefix_len(address: &IpAddr) -> u8 {
        match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    /// Host address with prefix, e.g. `10.0.0.1/24`.
    pub fn to_ipnet(&self) -> Result<IpNet, SharedTypeError> {
        IpNet::new(self.address, self.prefix_len).map_err(|_| SharedTypeError::OutOfRange {
            field: "prefix_len",
            value: self.prefix_len.to_string(),
        })
    }

    /// Same address and prefix, ignoring how it was obtained.
    pub fn same_address(&self, other: &IpAssignment) -> bool {
        self.address == other.address && self.prefix_len == other.prefix_len
    }

    pub fn is_dhcp(&self) -> bool {
        self.protocol == AddressProtocol::Dhcp
    }
}

impl From<IpNet> for IpAssignment {
    fn from(net: IpNet) -> Self {
        IpAssignment::static_address(net.addr(), net.prefix_len())
    }
}

impl FromStr for IpAssignment {
    type Err = SharedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s.split_once('/').ok_or(SharedTypeError::InvalidValue {
            field: "ip_address",
            value: s.to_string(),
        })?;
        let address = addr
            .parse::<IpAddr>()
            .map_err(|_| SharedTypeError::InvalidValue {
                field: "ip_address",
                value: s.to_string(),
            })?;
        let prefix_len = prefix
            .parse::<u8>()
            .map_err(|_| SharedTypeError::InvalidValue {
                field: "prefix_len",
                value: prefix.to_string(),
            })?;
        if prefix_len > Self::max_prefix_len(&address) {
            return Err(SharedTypeError::OutOfRange {
                field: "prefix_len",
                value: prefix.to_string(),
            });
        }
        Ok(IpAssignment::static_address(address, prefix_len))
    }
}

impl fmt::Display for IpAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacAddr(pub MacAddress);

struct MacAddrVisitor;

impl<'de> serde::de::Visitor<'de> for MacAddrVisitor {
    type Value = MacAddr;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a MAC address string")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse::<MacAddress>()
            .map(MacAddr)
            .map_err(|_| E::custom(format!("invalid MAC address: {}", v)))
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(MacAddrVisitor)
    }
}

impl Serialize for MacAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl FromStr for MacAddr {
    type Err = SharedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<MacAddress>()
            .map(MacAddr)
            .map_err(|_| SharedTypeError::InvalidValue {
                field: "mac_address",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // mac_address prints upper case, the kernel and our documents use lower case
        write!(f, "{}", self.0.to_string().to_ascii_lowercase())
    }
}

/// Live view of one kernel link, including its resolved addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub kind: LinkKind,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub hw_address: Option<MacAddr>,
    pub mtu: u32,
    #[serde(default)]
    pub oper_state: OperState,
    #[serde(default)]
    pub stats: LinkStats,
    /// Bridge or bond this link is enslaved to.
    #[serde(default)]
    pub master: Option<String>,
    /// Lower link of a VLAN.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub vlan_id: Option<u16>,
    #[serde(default)]
    pub bond_mode: Option<BondMode>,
    #[serde(default)]
    pub slave_state: Option<SlaveState>,
    #[serde(default)]
    pub primary: Option<IpAssignment>,
    #[serde(default)]
    pub secondaries: Vec<IpAssignment>,
    /// Display name from the port alias table.
    #[serde(default)]
    pub alias: Option<String>,
}

impl Link {
    pub fn new(name: impl Into<String>, kind: LinkKind) -> Self {
        Self {
            name: name.into(),
            kind,
            index: 0,
            hw_address: None,
            mtu: 1500,
            oper_state: OperState::Unknown,
            stats: LinkStats::default(),
            master: None,
            parent: None,
            vlan_id: None,
            bond_mode: None,
            slave_state: None,
            primary: None,
            secondaries: Vec::new(),
            alias: None,
        }
    }

    /// Every address on the link, primary first.
    pub fn addresses(&self) -> impl Iterator<Item = &IpAssignment> {
        self.primary.iter().chain(self.secondaries.iter())
    }

    pub fn holds_address(&self, address: &IpAddr) -> bool {
        self.addresses().any(|assignment| &assignment.address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assignment() {
        let ip: IpAssignment = "192.168.1.10/24".parse().unwrap();
        assert_eq!(ip.prefix_len, 24);
        assert_eq!(ip.protocol, AddressProtocol::Static);
        assert_eq!(ip.to_string(), "192.168.1.10/24");

        assert!("192.168.1.10".parse::<IpAssignment>().is_err());
        assert!("192.168.1.10/33".parse::<IpAssignment>().is_err());
        assert!("fd00::1/64".parse::<IpAssignment>().is_ok());
    }

    #[test]
    fn parse_mac() {
        let mac: MacAddr = "AA:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
        assert!("aa:bb:cc".parse::<MacAddr>().is_err());
    }

    #[test]
    fn bond_mode_names() {
        assert_eq!("1".parse::<BondMode>().unwrap(), BondMode::ActiveBackup);
        assert_eq!("802.3ad".parse::<BondMode>().unwrap().kernel_name(), "802.3ad");
        assert!("fastest".parse::<BondMode>().is_err());
    }

    #[test]
    fn oper_state_from_kernel() {
        assert_eq!(OperState::from_kernel("UP"), OperState::Up);
        assert_eq!(OperState::from_kernel("LOWERLAYERDOWN"), OperState::Down);
        assert_eq!(OperState::from_kernel("UNKNOWN"), OperState::Unknown);
    }
}
