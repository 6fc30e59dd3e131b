//! Ordinary interface updates for physical ports

use log::info;
use serde::{Deserialize, Serialize};

use appnet_core::error::ConflictError;
use appnet_core::registry::{AttachmentIndex, PhysicalInterface};
use appnet_core::{
    InterfaceValidator, IpAssignment, Link, LinkKind, LinkSettings, NetworkError, Result,
};

use crate::compensation::{Compensation, Compensations};
use crate::context::LinkContext;
use crate::settings::{apply_link_settings, check_settings_against};

/// Requested change to one physical port
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalUpdate {
    #[serde(default, flatten)]
    pub settings: LinkSettings,
    /// Secondary addresses to add
    #[serde(default)]
    pub add_aliases: Vec<IpAssignment>,
    /// Secondary addresses to remove
    #[serde(default)]
    pub remove_aliases: Vec<IpAssignment>,
}

pub struct PhysicalApplier {
    context: LinkContext,
}

impl PhysicalApplier {
    pub fn new(context: LinkContext) -> Self {
        Self { context }
    }

    pub async fn list(&self) -> Result<Vec<PhysicalInterface>> {
        let ha = self.context.ha_config().await?;
        self.context.registry.physical_interfaces(ha.as_ref()).await
    }

    pub async fn update(&self, name: &str, update: PhysicalUpdate, caller: &str) -> Result<Link> {
        let current = self.context.registry.link(name).await?;
        self.ensure_port(name, current.kind).await?;

        update.settings.validate()?;
        for alias in update.add_aliases.iter().chain(update.remove_aliases.iter()) {
            InterfaceValidator::validate_assignment(alias)?;
        }

        let ha = self.context.ha_config().await?;
        LinkContext::guard_ha(ha.as_ref(), name)?;

        let snapshot = self.context.registry.snapshot().await?;
        let index = snapshot.attachments();
        Self::guard_attachments(&index, name, &update)?;
        check_settings_against(&snapshot, name, &update.settings)?;

        for alias in &update.add_aliases {
            LinkContext::ensure_address_free(&snapshot, name, &alias.address)?;
            if current.holds_address(&alias.address) {
                return Err(NetworkError::Conflict(ConflictError::AddressInUse {
                    address: alias.address.to_string(),
                    owner: name.to_string(),
                }));
            }
        }
        for alias in &update.remove_aliases {
            if !current.secondaries.iter().any(|s| s.same_address(alias)) {
                return Err(NetworkError::not_found("alias", format!("{} on {}", alias, name)));
            }
        }

        info!("{} updating {}", caller, name);

        let mut compensations = Compensations::new();
        let result = async {
            let backend = self.context.backend();
            apply_link_settings(backend, &current, &update.settings, &mut compensations).await?;

            for alias in &update.remove_aliases {
                backend.delete_address(name, alias).await?;
                compensations.push(Compensation::AddAddress {
                    link: name.to_string(),
                    address: alias.clone(),
                });
            }
            for alias in &update.add_aliases {
                backend.add_address(name, alias).await?;
                compensations.push(Compensation::DeleteAddress {
                    link: name.to_string(),
                    address: alias.clone(),
                });
            }

            self.context
                .persist(name, update.settings.specific.clone(), caller)
                .await
        }
        .await;
        self.context.settle(compensations, result).await
    }

    pub async fn add_alias(&self, name: &str, alias: IpAssignment, caller: &str) -> Result<Link> {
        let update = PhysicalUpdate {
            add_aliases: vec![alias],
            ..Default::default()
        };
        self.update(name, update, caller).await
    }

    pub async fn delete_alias(&self, name: &str, alias: IpAssignment, caller: &str) -> Result<Link> {
        let update = PhysicalUpdate {
            remove_aliases: vec![alias],
            ..Default::default()
        };
        self.update(name, update, caller).await
    }

    async fn ensure_port(&self, name: &str, kind: LinkKind) -> Result<()> {
        LinkContext::ensure_kind(name, kind, LinkKind::Physical)?;
        if !self.context.registry.physical_ports().await?.iter().any(|p| p == name) {
            return Err(NetworkError::not_found("physical interface", name));
        }
        Ok(())
    }

    /// Enslaved ports take no configuration of their own. A VLAN parent keeps
    /// its addresses editable but its MTU and hardware address are fixed while
    /// VLANs ride on it.
    fn guard_attachments(index: &AttachmentIndex, name: &str, update: &PhysicalUpdate) -> Result<()> {
        if let Some(master) = index.master_of(name) {
            return Err(NetworkError::Conflict(ConflictError::MemberOwned {
                member: name.to_string(),
                owner: master.owner.clone(),
            }));
        }

        let changes_link = update.settings.mtu.is_some() || update.settings.hw_address.is_some();
        if changes_link {
            if let Some(vlan) = index.attachments(name).first() {
                return Err(NetworkError::Conflict(ConflictError::MemberOwned {
                    member: name.to_string(),
                    owner: vlan.owner.clone(),
                }));
            }
        }
        Ok(())
    }
}
