//! Bond interface rules

use serde::{Deserialize, Serialize};

use crate::backend::NewLink;
use crate::error::{ConflictError, NetworkError, ValidationError};
use crate::interface::{InterfaceValidator, LinkSettings};
use crate::membership::{validate_candidates, MemberChange, MembershipDiff};
use crate::registry::KernelSnapshot;
use crate::types::{
    BondMode, ConfigSpecificFields, HaConfig, Link, LinkKind, SlaveState, MIN_BOND_SLAVES,
};
use crate::Result;

fn default_mode() -> BondMode {
    BondMode::ActiveBackup
}

/// Bond creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondRequest {
    pub name: String,
    #[serde(default = "default_mode")]
    pub mode: BondMode,
    #[serde(default)]
    pub slaves: Vec<String>,
    #[serde(default, flatten)]
    pub settings: LinkSettings,
}

impl BondRequest {
    pub fn new(name: impl Into<String>, mode: BondMode) -> Self {
        Self {
            name: name.into(),
            mode,
            slaves: Vec::new(),
            settings: LinkSettings::default(),
        }
    }

    pub fn with_slave(mut self, slave: impl Into<String>) -> Self {
        self.slaves.push(slave.into());
        self
    }

    pub fn with_settings(mut self, settings: LinkSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn to_new_link(&self) -> NewLink {
        NewLink::Bond {
            name: self.name.clone(),
            mode: self.mode,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BondUpdate {
    #[serde(default)]
    pub slaves: Option<MemberChange>,
    #[serde(default, flatten)]
    pub settings: LinkSettings,
}

/// One slave and its bonding state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondSlave {
    #[serde(flatten)]
    pub link: Link,
    pub state: Option<SlaveState>,
}

/// Listed bond
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondView {
    #[serde(flatten)]
    pub link: Link,
    pub slaves: Vec<BondSlave>,
    pub specific: Option<ConfigSpecificFields>,
}

/// Bond management rules
pub struct BondManager;

impl BondManager {
    /// Checks that need no kernel state, including the slave count
    pub fn validate_request(request: &BondRequest) -> Result<()> {
        InterfaceValidator::validate_composite_name(&request.name, LinkKind::Bond)?;

        if request.slaves.len() < MIN_BOND_SLAVES {
            return Err(NetworkError::Validation(ValidationError::TooFewMembers {
                name: request.name.clone(),
                required: MIN_BOND_SLAVES,
                actual: request.slaves.len(),
            }));
        }

        for slave in &request.slaves {
            InterfaceValidator::validate_name(slave)?;
        }

        request.settings.validate()
    }

    pub fn check_create(
        request: &BondRequest,
        snapshot: &KernelSnapshot,
        physical_ports: &[String],
        ha: Option<&HaConfig>,
    ) -> Result<()> {
        if snapshot.links.iter().any(|l| l.name == request.name) {
            return Err(NetworkError::Conflict(ConflictError::NameInUse {
                name: request.name.clone(),
            }));
        }
        validate_candidates(&request.name, &request.slaves, snapshot, physical_ports, ha)
    }

    /// A bond must keep at least two slaves after `diff`
    pub fn check_remaining(name: &str, current: &[String], diff: &MembershipDiff) -> Result<()> {
        let remaining = diff.apply(current).len();
        if remaining < MIN_BOND_SLAVES {
            return Err(NetworkError::Conflict(ConflictError::MinimumMembers {
                name: name.to_string(),
                required: MIN_BOND_SLAVES,
                remaining,
            }));
        }
        Ok(())
    }

    pub fn is_bond(link: &Link) -> bool {
        link.kind == LinkKind::Bond
    }
}
