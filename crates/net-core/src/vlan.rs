//! VLAN interface rules

use serde::{Deserialize, Serialize};

use crate::backend::NewLink;
use crate::error::{ConflictError, NetworkError, ValidationError};
use crate::interface::{InterfaceValidator, LinkSettings};
use crate::registry::KernelSnapshot;
use crate::types::{ConfigSpecificFields, HaConfig, Link, LinkKind};
use crate::Result;

/// VLAN creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanRequest {
    pub name: String,
    /// Lower link carrying the tagged frames
    pub parent: String,
    pub vlan_id: u16,
    #[serde(default, flatten)]
    pub settings: LinkSettings,
}

impl VlanRequest {
    pub fn new(name: impl Into<String>, parent: impl Into<String>, vlan_id: u16) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            vlan_id,
            settings: LinkSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LinkSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn to_new_link(&self) -> NewLink {
        NewLink::Vlan {
            name: self.name.clone(),
            parent: self.parent.clone(),
            vlan_id: self.vlan_id,
        }
    }
}

/// Parent and tag identify a VLAN and cannot change; only settings can
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VlanUpdate {
    #[serde(default, flatten)]
    pub settings: LinkSettings,
}

/// Listed VLAN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanView {
    #[serde(flatten)]
    pub link: Link,
    pub parent_link: Option<Link>,
    pub specific: Option<ConfigSpecificFields>,
}

/// VLAN management rules
pub struct VlanManager;

impl VlanManager {
    /// Checks that need no kernel state
    pub fn validate_request(request: &VlanRequest) -> Result<()> {
        InterfaceValidator::validate_composite_name(&request.name, LinkKind::Vlan)?;
        InterfaceValidator::validate_name(&request.parent)?;
        InterfaceValidator::validate_vlan_id(request.vlan_id)?;
        request.settings.validate()
    }

    /// Checks against the live link table
    pub fn check_create(
        request: &VlanRequest,
        snapshot: &KernelSnapshot,
        ha: Option<&HaConfig>,
    ) -> Result<()> {
        if snapshot.links.iter().any(|l| l.name == request.name) {
            return Err(NetworkError::Conflict(ConflictError::NameInUse {
                name: request.name.clone(),
            }));
        }

        let parent = snapshot
            .links
            .iter()
            .find(|l| l.name == request.parent)
            .ok_or_else(|| NetworkError::not_found("link", request.parent.clone()))?;

        if !matches!(
            parent.kind,
            LinkKind::Physical | LinkKind::Bond | LinkKind::Bridge
        ) {
            return Err(NetworkError::Validation(ValidationError::WrongKind {
                name: parent.name.clone(),
                expected: "physical, bond or bridge".to_string(),
                actual: parent.kind.to_string(),
            }));
        }

        // An enslaved port only passes frames to its master
        if let Some(master) = &parent.master {
            return Err(NetworkError::Conflict(ConflictError::MemberOwned {
                member: parent.name.clone(),
                owner: master.clone(),
            }));
        }

        if ha.map_or(false, |ha| ha.ha_link == parent.name) {
            return Err(NetworkError::Conflict(ConflictError::HaOwned {
                name: parent.name.clone(),
            }));
        }

        if let Some(existing) = snapshot.links.iter().find(|l| {
            l.kind == LinkKind::Vlan
                && l.parent.as_deref() == Some(request.parent.as_str())
                && l.vlan_id == Some(request.vlan_id)
        }) {
            return Err(NetworkError::Conflict(ConflictError::DuplicateVlan {
                parent: request.parent.clone(),
                vlan_id: request.vlan_id,
                existing: existing.name.clone(),
            }));
        }

        Ok(())
    }

    pub fn is_vlan(link: &Link) -> bool {
        link.kind == LinkKind::Vlan
    }
}
