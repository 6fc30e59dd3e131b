//! FRR configuration synthesis

use std::fmt::Write;
use std::net::IpAddr;

use appnet_types::{
    BgpConfig, HaConfig, IpAssignment, Link, LinkKind, OspfConfig, RoutingDocument, StaticRoute,
};

/// Render frr.conf from the routing document and the live links.
///
/// Interfaces are emitted in name order with their static addresses;
/// monitored links carry the role appropriate address instead of the one
/// currently in the kernel. DHCP leases are left to the DHCP client.
pub fn render_routing_config(
    routing: &RoutingDocument,
    links: &[Link],
    ha: Option<&HaConfig>,
) -> String {
    let mut out = String::new();
    out.push_str("! Generated by appnet. Changes will be overwritten.\n");
    out.push_str("frr defaults traditional\n");
    out.push_str("log syslog informational\n");
    out.push_str("!\n");

    let mut sorted: Vec<&Link> = links
        .iter()
        .filter(|l| l.kind != LinkKind::Loopback)
        .collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    for link in sorted {
        let addresses = interface_addresses(link, ha);
        if addresses.is_empty() {
            continue;
        }
        let _ = writeln!(out, "interface {}", link.name);
        for address in addresses {
            let keyword = if address.address.is_ipv4() { "ip" } else { "ipv6" };
            let _ = writeln!(out, " {} address {}/{}", keyword, address.address, address.prefix_len);
        }
        out.push_str("exit\n");
        out.push_str("!\n");
    }

    let mut routes: Vec<&StaticRoute> = routing.static_routes.iter().collect();
    routes.sort_by_key(|r| r.key());
    if !routes.is_empty() {
        for route in routes {
            out.push_str(&static_route_line(route));
            out.push('\n');
        }
        out.push_str("!\n");
    }

    if let Some(ospf) = &routing.ospf {
        out.push_str(&ospf_block(ospf));
    }
    if let Some(bgp) = &routing.bgp {
        out.push_str(&bgp_block(bgp));
    }

    out.push_str("line vty\n");
    out.push_str("!\n");
    out
}

fn interface_addresses(link: &Link, ha: Option<&HaConfig>) -> Vec<IpAssignment> {
    let primary = match ha {
        Some(ha) => ha.resolve_ip(&link.name, link.primary.as_ref()),
        None => link.primary.clone(),
    };

    let mut addresses = Vec::new();
    if let Some(primary) = primary.filter(|p| !p.is_dhcp()) {
        addresses.push(primary);
    }
    for secondary in &link.secondaries {
        if secondary.is_dhcp() || addresses.iter().any(|a| a.same_address(secondary)) {
            continue;
        }
        addresses.push(secondary.clone());
    }
    addresses
}

/// `ip route <dest>/<mask> <gateway|iface> <distance>`
pub fn static_route_line(route: &StaticRoute) -> String {
    let keyword = match route.destination {
        IpAddr::V4(_) => "ip",
        IpAddr::V6(_) => "ipv6",
    };
    let via = match &route.gateway {
        Some(gateway) => gateway.to_string(),
        None => route.interface.clone(),
    };
    format!(
        "{} route {}/{} {} {}",
        keyword, route.destination, route.mask, via, route.distance
    )
}

fn ospf_block(ospf: &OspfConfig) -> String {
    let mut block = String::from("router ospf\n");
    if let Some(router_id) = ospf.router_id {
        let _ = writeln!(block, " ospf router-id {}", router_id);
    }

    let mut networks: Vec<_> = ospf.networks.iter().collect();
    networks.sort_by(|a, b| (a.area, a.network).cmp(&(b.area, b.network)));
    for network in networks {
        let _ = writeln!(block, " network {} area {}", network.network, network.area);
    }
    block.push_str("exit\n");
    block.push_str("!\n");
    block
}

fn bgp_block(bgp: &BgpConfig) -> String {
    let mut block = format!("router bgp {}\n", bgp.asn);
    if let Some(router_id) = bgp.router_id {
        let _ = writeln!(block, " bgp router-id {}", router_id);
    }

    let mut neighbors: Vec<_> = bgp.neighbors.iter().collect();
    neighbors.sort_by_key(|n| n.address);
    for neighbor in &neighbors {
        let _ = writeln!(block, " neighbor {} remote-as {}", neighbor.address, neighbor.remote_as);
        if let Some(description) = &neighbor.description {
            let _ = writeln!(block, " neighbor {} description {}", neighbor.address, description);
        }
    }

    let mut networks: Vec<_> = bgp.networks.iter().collect();
    networks.sort();

    for (family, v4) in [("ipv4", true), ("ipv6", false)] {
        let family_neighbors: Vec<_> = neighbors
            .iter()
            .filter(|n| n.address.is_ipv4() == v4)
            .collect();
        let family_networks: Vec<_> = networks
            .iter()
            .filter(|n| matches!(n, ipnet::IpNet::V4(_)) == v4)
            .collect();
        if family_neighbors.is_empty() && family_networks.is_empty() {
            continue;
        }

        block.push_str(" !\n");
        let _ = writeln!(block, " address-family {} unicast", family);
        for network in family_networks {
            let _ = writeln!(block, "  network {}", network);
        }
        for neighbor in family_neighbors {
            let _ = writeln!(block, "  neighbor {} activate", neighbor.address);
        }
        block.push_str(" exit-address-family\n");
    }

    block.push_str("exit\n");
    block.push_str("!\n");
    block
}
