//! VLAN create/update/delete/list against the kernel

use log::{info, warn};

use appnet_core::error::ConflictError;
use appnet_core::vlan::{VlanManager, VlanRequest, VlanUpdate, VlanView};
use appnet_core::{KernelSnapshot, LinkFilter, LinkKind, NetworkError, Result};

use crate::compensation::{Compensation, Compensations};
use crate::context::LinkContext;
use crate::settings::{apply_link_settings, check_settings_against};

pub struct VlanApplier {
    context: LinkContext,
}

impl VlanApplier {
    pub fn new(context: LinkContext) -> Self {
        Self { context }
    }

    pub async fn create(&self, request: VlanRequest, caller: &str) -> Result<VlanView> {
        VlanManager::validate_request(&request)?;

        let snapshot = self.context.registry.snapshot().await?;
        let ha = self.context.ha_config().await?;
        VlanManager::check_create(&request, &snapshot, ha.as_ref())?;
        check_settings_against(&snapshot, &request.name, &request.settings)?;

        info!(
            "{} creating {} on {} (id {})",
            caller, request.name, request.parent, request.vlan_id
        );

        let mut compensations = Compensations::new();
        let result = self.create_steps(&request, &mut compensations, caller).await;
        self.context.settle(compensations, result).await?;

        self.view(&request.name).await
    }

    async fn create_steps(
        &self,
        request: &VlanRequest,
        compensations: &mut Compensations,
        caller: &str,
    ) -> Result<()> {
        let backend = self.context.backend();
        backend.create_link(&request.to_new_link()).await?;
        compensations.push(Compensation::DeleteLink(request.name.clone()));

        let created = self.context.registry.link(&request.name).await?;
        apply_link_settings(backend, &created, &request.settings, compensations).await?;

        self.context
            .persist(&request.name, request.settings.specific.clone(), caller)
            .await?;
        Ok(())
    }

    pub async fn update(&self, name: &str, update: VlanUpdate, caller: &str) -> Result<VlanView> {
        let current = self.context.registry.link(name).await?;
        LinkContext::ensure_kind(name, current.kind, LinkKind::Vlan)?;
        update.settings.validate()?;

        let ha = self.context.ha_config().await?;
        LinkContext::guard_ha(ha.as_ref(), name)?;

        let snapshot = self.context.registry.snapshot().await?;
        check_settings_against(&snapshot, name, &update.settings)?;

        info!("{} updating {}", caller, name);

        let mut compensations = Compensations::new();
        let result = async {
            apply_link_settings(
                self.context.backend(),
                &current,
                &update.settings,
                &mut compensations,
            )
            .await?;
            self.context
                .persist(name, update.settings.specific.clone(), caller)
                .await
        }
        .await;
        self.context.settle(compensations, result).await?;

        self.view(name).await
    }

    pub async fn delete(&self, name: &str, caller: &str) -> Result<()> {
        let current = self.context.registry.link(name).await?;
        LinkContext::ensure_kind(name, current.kind, LinkKind::Vlan)?;

        let ha = self.context.ha_config().await?;
        LinkContext::guard_ha(ha.as_ref(), name)?;

        info!("{} deleting {}", caller, name);
        let backend = self.context.backend();
        if current.primary.as_ref().map_or(false, |p| p.is_dhcp()) {
            if let Err(e) = backend.stop_dhcp(name).await {
                warn!("Failed to stop DHCP client on {}: {}", name, e);
            }
        }
        backend.delete_link(name).await?;
        self.context.store.forget_interface(name, caller).await?;
        Ok(())
    }

    /// Every live VLAN, or the one named
    pub async fn list(&self, name: Option<&str>) -> Result<Vec<VlanView>> {
        let snapshot = self.context.registry.snapshot().await?;
        let all = self
            .context
            .registry
            .assemble(&snapshot, &LinkFilter::all())
            .await?;
        let persisted = self.context.store.interfaces().await?;

        let views: Vec<VlanView> = all
            .iter()
            .filter(|l| l.kind == LinkKind::Vlan)
            .filter(|l| name.map_or(true, |n| l.name == n))
            .map(|l| VlanView {
                link: l.clone(),
                parent_link: l
                    .parent
                    .as_ref()
                    .and_then(|p| all.iter().find(|other| &other.name == p))
                    .cloned(),
                specific: persisted.get(&l.name).and_then(|r| r.specific.clone()),
            })
            .collect();

        if let Some(name) = name {
            if views.is_empty() {
                return Err(NetworkError::not_found("vlan", name));
            }
        }
        Ok(views)
    }

    async fn view(&self, name: &str) -> Result<VlanView> {
        self.list(Some(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NetworkError::not_found("vlan", name))
    }
}

/// VLANs stacked on `link`; a bridge or bond carrying any cannot be deleted
pub(crate) fn ensure_no_stacked_vlans(snapshot: &KernelSnapshot, link: &str) -> Result<()> {
    if let Some(vlan) = snapshot
        .links
        .iter()
        .find(|l| l.kind == LinkKind::Vlan && l.parent.as_deref() == Some(link))
    {
        return Err(NetworkError::Conflict(ConflictError::MemberOwned {
            member: link.to_string(),
            owner: vlan.name.clone(),
        }));
    }
    Ok(())
}
