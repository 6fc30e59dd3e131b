//! Link settings shared by every mutation path and their validation

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::{NetworkError, ValidationError};
use crate::types::{
    ConfigSpecificFields, IpAssignment, LinkKind, MacAddr, BOND_PREFIX, BRIDGE_PREFIX,
    MAX_LINK_NAME_LEN, MAX_MTU, MIN_MTU, VLAN_PREFIX,
};
use crate::Result;

/// How a link obtains its primary address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressConfig {
    Static(IpAssignment),
    Dhcp,
}

/// Optional settings applied after a link exists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkSettings {
    #[serde(default)]
    pub hw_address: Option<MacAddr>,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub address: Option<AddressConfig>,
    #[serde(default)]
    pub specific: Option<ConfigSpecificFields>,
}

impl LinkSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hw_address(mut self, mac: MacAddr) -> Self {
        self.hw_address = Some(mac);
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    pub fn with_static_address(mut self, address: IpAssignment) -> Self {
        self.address = Some(AddressConfig::Static(address));
        self
    }

    pub fn with_dhcp(mut self) -> Self {
        self.address = Some(AddressConfig::Dhcp);
        self
    }

    pub fn with_specific(mut self, specific: ConfigSpecificFields) -> Self {
        self.specific = Some(specific);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(mtu) = self.mtu {
            InterfaceValidator::validate_mtu(mtu)?;
        }
        if let Some(AddressConfig::Static(ref assignment)) = self.address {
            InterfaceValidator::validate_assignment(assignment)?;
        }
        Ok(())
    }
}

/// Interface validation functions
pub struct InterfaceValidator;

impl InterfaceValidator {
    /// Validate a kernel interface name
    pub fn validate_name(name: &str) -> Result<()> {
        let invalid = |reason: &str| -> Result<()> {
            Err(NetworkError::Validation(ValidationError::InvalidName {
                name: name.to_string(),
                reason: reason.to_string(),
            }))
        };

        if name.is_empty() {
            return invalid("empty");
        }

        if name.len() > MAX_LINK_NAME_LEN {
            return invalid("longer than 15 characters");
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return invalid("only letters, digits, '_', '-' and '.' are allowed");
        }

        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return invalid("must start with a letter");
        }

        Ok(())
    }

    /// Prefix a composite link of `kind` must carry
    pub fn composite_prefix(kind: LinkKind) -> Option<&'static str> {
        match kind {
            LinkKind::Vlan => Some(VLAN_PREFIX),
            LinkKind::Bridge => Some(BRIDGE_PREFIX),
            LinkKind::Bond => Some(BOND_PREFIX),
            _ => None,
        }
    }

    /// Validate the naming convention of links created by this system
    pub fn validate_composite_name(name: &str, kind: LinkKind) -> Result<()> {
        let prefix = Self::composite_prefix(kind).ok_or_else(|| {
            NetworkError::invalid("kind", format!("{} is not a composite link", kind))
        })?;

        if !name.starts_with(prefix) || name.len() == prefix.len() {
            return Err(NetworkError::Validation(ValidationError::InvalidName {
                name: name.to_string(),
                reason: format!("{} names must be '{}' followed by a suffix", kind, prefix),
            }));
        }

        // '.' is reserved for kernel style VLAN names
        if name.contains('.') {
            return Err(NetworkError::Validation(ValidationError::InvalidName {
                name: name.to_string(),
                reason: "'.' is not allowed".to_string(),
            }));
        }

        Self::validate_name(name)
    }

    pub fn validate_mtu(mtu: u32) -> Result<()> {
        if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
            return Err(NetworkError::invalid("mtu", mtu.to_string()));
        }
        Ok(())
    }

    /// Validate a host address usable on an appliance port
    pub fn validate_host_address(address: &IpAddr) -> Result<()> {
        let bad = address.is_unspecified()
            || address.is_loopback()
            || address.is_multicast()
            || matches!(address, IpAddr::V4(v4) if v4.is_broadcast());
        if bad {
            return Err(NetworkError::invalid("ip_address", address.to_string()));
        }
        Ok(())
    }

    pub fn validate_assignment(assignment: &IpAssignment) -> Result<()> {
        Self::validate_host_address(&assignment.address)?;

        let max = IpAssignment::max_prefix_len(&assignment.address);
        if assignment.prefix_len == 0 || assignment.prefix_len > max {
            return Err(NetworkError::invalid(
                "prefix_len",
                assignment.prefix_len.to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_vlan_id(vlan_id: u16) -> Result<()> {
        if vlan_id == 0 || vlan_id > 4094 {
            return Err(NetworkError::invalid("vlan_id", vlan_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_name_validation() {
        assert!(InterfaceValidator::validate_name("eth0").is_ok());
        assert!(InterfaceValidator::validate_name("br-test").is_ok());
        assert!(InterfaceValidator::validate_name("bond_0").is_ok());

        assert!(InterfaceValidator::validate_name("").is_err());
        assert!(InterfaceValidator::validate_name("0eth").is_err());
        assert!(InterfaceValidator::validate_name("eth@0").is_err());
        assert!(InterfaceValidator::validate_name("very-long-interface-name").is_err());
    }

    #[test]
    fn test_composite_name_convention() {
        assert!(InterfaceValidator::validate_composite_name("VLAN_100", LinkKind::Vlan).is_ok());
        assert!(InterfaceValidator::validate_composite_name("BR_lan", LinkKind::Bridge).is_ok());
        assert!(InterfaceValidator::validate_composite_name("BOND_up", LinkKind::Bond).is_ok());

        assert!(InterfaceValidator::validate_composite_name("VLAN_", LinkKind::Vlan).is_err());
        assert!(InterfaceValidator::validate_composite_name("eth0.100", LinkKind::Vlan).is_err());
        assert!(InterfaceValidator::validate_composite_name("BR_lan", LinkKind::Bond).is_err());
        assert!(
            InterfaceValidator::validate_composite_name("BOND_0123456789a", LinkKind::Bond)
                .is_err()
        );
        assert!(InterfaceValidator::validate_composite_name("eth0", LinkKind::Physical).is_err());
    }

    #[test]
    fn test_assignment_validation() {
        let ok: IpAssignment = "192.168.50.5/24".parse().unwrap();
        assert!(InterfaceValidator::validate_assignment(&ok).is_ok());

        let zero_prefix: IpAssignment = "192.168.50.5/0".parse().unwrap();
        assert!(InterfaceValidator::validate_assignment(&zero_prefix).is_err());

        let loopback: IpAssignment = "127.0.0.1/8".parse().unwrap();
        assert!(InterfaceValidator::validate_assignment(&loopback).is_err());
    }

    #[test]
    fn test_settings_validation() {
        assert!(LinkSettings::new().with_mtu(9000).validate().is_ok());
        assert!(LinkSettings::new().with_mtu(20).validate().is_err());
        assert!(LinkSettings::new().with_dhcp().validate().is_ok());
    }

    #[test]
    fn test_vlan_id_range() {
        assert!(InterfaceValidator::validate_vlan_id(1).is_ok());
        assert!(InterfaceValidator::validate_vlan_id(4094).is_ok());
        assert!(InterfaceValidator::validate_vlan_id(0).is_err());
        assert!(InterfaceValidator::validate_vlan_id(4095).is_err());
    }
}
