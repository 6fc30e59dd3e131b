//! Bridge interface rules

use serde::{Deserialize, Serialize};

use crate::backend::NewLink;
use crate::error::{ConflictError, NetworkError};
use crate::interface::{InterfaceValidator, LinkSettings};
use crate::membership::{validate_candidates, MemberChange};
use crate::registry::KernelSnapshot;
use crate::types::{ConfigSpecificFields, HaConfig, Link, LinkKind};
use crate::Result;

/// Bridge creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default, flatten)]
    pub settings: LinkSettings,
}

impl BridgeRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
            settings: LinkSettings::default(),
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.ports.push(port.into());
        self
    }

    pub fn with_settings(mut self, settings: LinkSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn to_new_link(&self) -> NewLink {
        NewLink::Bridge {
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeUpdate {
    #[serde(default)]
    pub ports: Option<MemberChange>,
    #[serde(default, flatten)]
    pub settings: LinkSettings,
}

/// Listed bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeView {
    #[serde(flatten)]
    pub link: Link,
    pub ports: Vec<Link>,
    pub specific: Option<ConfigSpecificFields>,
}

/// Bridge management rules
pub struct BridgeManager;

impl BridgeManager {
    pub fn validate_request(request: &BridgeRequest) -> Result<()> {
        InterfaceValidator::validate_composite_name(&request.name, LinkKind::Bridge)?;
        for port in &request.ports {
            InterfaceValidator::validate_name(port)?;
        }
        request.settings.validate()
    }

    pub fn check_create(
        request: &BridgeRequest,
        snapshot: &KernelSnapshot,
        physical_ports: &[String],
        ha: Option<&HaConfig>,
    ) -> Result<()> {
        if snapshot.links.iter().any(|l| l.name == request.name) {
            return Err(NetworkError::Conflict(ConflictError::NameInUse {
                name: request.name.clone(),
            }));
        }
        validate_candidates(&request.name, &request.ports, snapshot, physical_ports, ha)
    }

    pub fn is_bridge(link: &Link) -> bool {
        link.kind == LinkKind::Bridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::KernelLink;

    fn snapshot() -> KernelSnapshot {
        let mut slave = KernelLink::new("eth1", LinkKind::Physical);
        slave.master = Some("BOND_A".to_string());
        KernelSnapshot {
            links: vec![
                KernelLink::new("eth0", LinkKind::Physical),
                slave,
                KernelLink::new("eth2", LinkKind::Physical),
                KernelLink::new("BOND_A", LinkKind::Bond),
            ],
            addresses: Vec::new(),
        }
    }

    fn ports() -> Vec<String> {
        vec!["eth0".to_string(), "eth1".to_string(), "eth2".to_string()]
    }

    #[test]
    fn test_bridge_request_validation() {
        let request = BridgeRequest::new("BR_lan").with_port("eth0");
        assert!(BridgeManager::validate_request(&request).is_ok());

        let request = BridgeRequest::new("vmbr0").with_port("eth0");
        assert!(BridgeManager::validate_request(&request).is_err());
    }

    #[test]
    fn test_bond_slave_cannot_become_bridge_port() {
        let request = BridgeRequest::new("BR_lan").with_port("eth0").with_port("eth1");
        let err = BridgeManager::check_create(&request, &snapshot(), &ports(), None).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Conflict(ConflictError::MemberOwned { .. })
        ));
    }

    #[test]
    fn test_empty_bridge_is_allowed() {
        let request = BridgeRequest::new("BR_empty");
        assert!(BridgeManager::check_create(&request, &snapshot(), &ports(), None).is_ok());
    }
}
