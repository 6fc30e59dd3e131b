//! Persisted interface document.

use serde::{Deserialize, Serialize};

use crate::link::{BondMode, IpAssignment, Link, LinkKind, MacAddr};

/// Per-interface metadata the kernel has no notion of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSpecificFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_zone: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// One interface as stored in `interfaces.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub name: String,
    pub kind: LinkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_address: Option<MacAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<IpAssignment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondaries: Vec<IpAssignment>,
    /// Bridge ports or bond slaves.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_mode: Option<BondMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific: Option<ConfigSpecificFields>,
}

impl InterfaceRecord {
    pub fn new(name: impl Into<String>, kind: LinkKind) -> Self {
        Self {
            name: name.into(),
            kind,
            hw_address: None,
            mtu: None,
            primary: None,
            secondaries: Vec::new(),
            members: Vec::new(),
            parent: None,
            vlan_id: None,
            bond_mode: None,
            specific: None,
        }
    }

    /// Snapshot of a live link. `members` comes from the caller since a link
    /// only knows its own master, not its slaves.
    pub fn from_link(link: &Link, members: Vec<String>) -> Self {
        Self {
            name: link.name.clone(),
            kind: link.kind,
            hw_address: link.hw_address.clone(),
            mtu: Some(link.mtu),
            primary: link.primary.clone(),
            secondaries: link.secondaries.clone(),
            members,
            parent: link.parent.clone(),
            vlan_id: link.vlan_id,
            bond_mode: link.bond_mode,
            specific: None,
        }
    }

    pub fn with_specific(mut self, specific: ConfigSpecificFields) -> Self {
        self.specific = Some(specific);
        self
    }

    /// Folds `incoming` into `self`.
    ///
    /// | field          | policy          |
    /// |----------------|-----------------|
    /// | `kind`         | replace         |
    /// | `hw_address`   | replace         |
    /// | `mtu`          | replace         |
    /// | `primary`      | replace         |
    /// | `secondaries`  | replace         |
    /// | `members`      | replace         |
    /// | `parent`       | replace         |
    /// | `vlan_id`      | replace         |
    /// | `bond_mode`    | replace         |
    /// | `specific`     | leave-if-absent |
    ///
    /// `name` is the key and never changes.
    pub fn merge(&mut self, incoming: InterfaceRecord) {
        self.kind = incoming.kind;
        self.hw_address = incoming.hw_address;
        self.mtu = incoming.mtu;
        self.primary = incoming.primary;
        self.secondaries = incoming.secondaries;
        self.members = incoming.members;
        self.parent = incoming.parent;
        self.vlan_id = incoming.vlan_id;
        self.bond_mode = incoming.bond_mode;
        if incoming.specific.is_some() {
            self.specific = incoming.specific;
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.specific.as_ref().map(|s| s.disabled).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfacesDocument {
    #[serde(default)]
    pub interfaces: Vec<InterfaceRecord>,
}

impl InterfacesDocument {
    pub fn get(&self, name: &str) -> Option<&InterfaceRecord> {
        self.interfaces.iter().find(|record| record.name == name)
    }

    pub fn of_kind(&self, kind: LinkKind) -> impl Iterator<Item = &InterfaceRecord> {
        self.interfaces.iter().filter(move |record| record.kind == kind)
    }
}
