//! Persisted routing document.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

fn default_distance() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub interface: String,
    pub destination: IpAddr,
    /// Prefix length of the destination network.
    pub mask: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
    #[serde(default = "default_distance")]
    pub distance: u8,
}

impl StaticRoute {
    pub fn key(&self) -> RouteKey {
        RouteKey {
            interface: self.interface.clone(),
            destination: self.destination,
            mask: self.mask,
        }
    }
}

/// Identity of a static route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub interface: String,
    pub destination: IpAddr,
    pub mask: u8,
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} via {}", self.destination, self.mask, self.interface)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpNeighbor {
    pub address: IpAddr,
    pub remote_as: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpConfig {
    pub asn: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_id: Option<Ipv4Addr>,
    #[serde(default)]
    pub neighbors: Vec<BgpNeighbor>,
    #[serde(default)]
    pub networks: Vec<IpNet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfNetwork {
    pub network: IpNet,
    #[serde(default)]
    pub area: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_id: Option<Ipv4Addr>,
    #[serde(default)]
    pub networks: Vec<OspfNetwork>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingDocument {
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgp: Option<BgpConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ospf: Option<OspfConfig>,
}

impl RoutingDocument {
    pub fn route(&self, key: &RouteKey) -> Option<&StaticRoute> {
        self.static_routes.iter().find(|route| &route.key() == key)
    }

    pub fn is_empty(&self) -> bool {
        self.static_routes.is_empty() && self.bgp.is_none() && self.ospf.is_none()
    }
}
