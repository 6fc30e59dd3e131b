//! Checks an HA configuration against the live kernel state

use std::collections::HashSet;
use std::net::IpAddr;

use ipnet::IpNet;

use appnet_core::error::{ConflictError, ValidationError};
use appnet_core::registry::KernelSnapshot;
use appnet_core::{LinkKind, NetworkError, Result};
use appnet_routing::MAX_MONITORED_INTERFACES;
use appnet_types::{HaConfig, MonitoredInterface};

pub struct HaValidator;

impl HaValidator {
    pub fn validate(config: &HaConfig, snapshot: &KernelSnapshot, physical_ports: &[String]) -> Result<()> {
        if config.password.is_empty() {
            return Err(NetworkError::Validation(ValidationError::MissingField {
                field: "password".to_string(),
            }));
        }

        Self::validate_ha_link(&config.ha_link, snapshot, physical_ports)?;
        Self::validate_peer_ip(&config.peer_ip, snapshot)?;

        if let Some(tuning) = &config.keepalive {
            if tuning.advert_interval == 0 || tuning.advert_interval > 255 {
                return Err(NetworkError::invalid(
                    "advert_interval",
                    tuning.advert_interval.to_string(),
                ));
            }
        }

        if config.monitored.len() > MAX_MONITORED_INTERFACES {
            return Err(NetworkError::invalid(
                "monitored",
                format!(
                    "{} interfaces, at most {}",
                    config.monitored.len(),
                    MAX_MONITORED_INTERFACES
                ),
            ));
        }

        let mut links = HashSet::new();
        let mut addresses = HashSet::new();
        for entry in &config.monitored {
            if !links.insert(entry.link.as_str()) {
                return Err(NetworkError::Conflict(ConflictError::DuplicateKey {
                    key: entry.link.clone(),
                }));
            }
            Self::validate_monitored(config, entry, snapshot)?;
            for ip in [entry.base_ip, entry.peer_ip].into_iter().flatten() {
                if !addresses.insert(ip.addr()) {
                    return Err(NetworkError::Conflict(ConflictError::DuplicateKey {
                        key: ip.addr().to_string(),
                    }));
                }
            }
        }
        Ok(())
    }

    /// The HA link must be a free physical port
    fn validate_ha_link(name: &str, snapshot: &KernelSnapshot, physical_ports: &[String]) -> Result<()> {
        let link = snapshot
            .links
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| NetworkError::not_found("interface", name))?;
        if link.kind != LinkKind::Physical || !physical_ports.iter().any(|p| p == name) {
            return Err(NetworkError::Validation(ValidationError::WrongKind {
                name: name.to_string(),
                expected: LinkKind::Physical.to_string(),
                actual: link.kind.to_string(),
            }));
        }
        if let Some(attachment) = snapshot.attachments().attachments(name).first() {
            return Err(NetworkError::Conflict(ConflictError::MemberOwned {
                member: name.to_string(),
                owner: attachment.owner.clone(),
            }));
        }
        Ok(())
    }

    fn validate_peer_ip(peer: &IpAddr, snapshot: &KernelSnapshot) -> Result<()> {
        let v4 = match peer {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => return Err(NetworkError::invalid("peer_ip", peer.to_string())),
        };
        if v4.is_unspecified() || v4.is_loopback() || v4.is_multicast() || v4.is_broadcast() {
            return Err(NetworkError::invalid("peer_ip", peer.to_string()));
        }
        if let Some(local) = snapshot.addresses.iter().find(|a| &a.address == peer) {
            return Err(NetworkError::Conflict(ConflictError::AddressInUse {
                address: peer.to_string(),
                owner: local.link.clone(),
            }));
        }
        Ok(())
    }

    fn validate_monitored(config: &HaConfig, entry: &MonitoredInterface, snapshot: &KernelSnapshot) -> Result<()> {
        if entry.link == config.ha_link {
            return Err(NetworkError::invalid("monitored", entry.link.clone()));
        }
        if !snapshot.links.iter().any(|l| l.name == entry.link) {
            return Err(NetworkError::not_found("interface", entry.link.clone()));
        }

        if let (Some(base), Some(peer)) = (&entry.base_ip, &entry.peer_ip) {
            if base.addr() == peer.addr() {
                return Err(NetworkError::invalid(
                    "peer_ip",
                    format!("{} equals base_ip on {}", peer, entry.link),
                ));
            }
        }

        for (field, ip) in [("base_ip", entry.base_ip), ("peer_ip", entry.peer_ip)] {
            if let Some(ip) = ip {
                Self::validate_role_address(field, &ip)?;
                if let Some(owner) = snapshot
                    .addresses
                    .iter()
                    .find(|a| a.address == ip.addr() && a.link != entry.link)
                {
                    return Err(NetworkError::Conflict(ConflictError::AddressInUse {
                        address: ip.addr().to_string(),
                        owner: owner.link.clone(),
                    }));
                }
            }
        }
        Ok(())
    }

    fn validate_role_address(field: &str, ip: &IpNet) -> Result<()> {
        let valid = match ip {
            IpNet::V4(net) => {
                (1..=32).contains(&net.prefix_len())
                    && !net.addr().is_unspecified()
                    && !net.addr().is_multicast()
                    && !net.addr().is_broadcast()
            }
            IpNet::V6(_) => false,
        };
        if !valid {
            return Err(NetworkError::invalid(field, ip.to_string()));
        }
        Ok(())
    }
}
