//! Bond create/update/delete/list against the kernel

use log::{info, warn};

use appnet_core::bond::{BondManager, BondRequest, BondSlave, BondUpdate, BondView};
use appnet_core::membership::validate_candidates;
use appnet_core::{fetch_add_remove_from_list, LinkFilter, LinkKind, NetworkError, Result};

use crate::compensation::{Compensation, Compensations};
use crate::context::LinkContext;
use crate::members::{apply_diff, attach};
use crate::settings::{apply_link_settings, check_settings_against};
use crate::vlan::ensure_no_stacked_vlans;

pub struct BondApplier {
    context: LinkContext,
}

impl BondApplier {
    pub fn new(context: LinkContext) -> Self {
        Self { context }
    }

    pub async fn create(&self, request: BondRequest, caller: &str) -> Result<BondView> {
        // slave count is checked here, before the kernel is touched
        BondManager::validate_request(&request)?;

        let snapshot = self.context.registry.snapshot().await?;
        let ports = self.context.registry.physical_ports().await?;
        let ha = self.context.ha_config().await?;
        BondManager::check_create(&request, &snapshot, &ports, ha.as_ref())?;
        check_settings_against(&snapshot, &request.name, &request.settings)?;

        info!(
            "{} creating {} ({}) with slaves [{}]",
            caller,
            request.name,
            request.mode,
            request.slaves.join(", ")
        );

        let mut compensations = Compensations::new();
        let result = async {
            let backend = self.context.backend();
            backend.create_link(&request.to_new_link()).await?;
            compensations.push(Compensation::DeleteLink(request.name.clone()));

            attach(backend, &request.name, &request.slaves, &mut compensations).await?;

            let created = self.context.registry.link(&request.name).await?;
            apply_link_settings(backend, &created, &request.settings, &mut compensations).await?;

            self.context
                .persist(&request.name, request.settings.specific.clone(), caller)
                .await
        }
        .await;
        self.context.settle(compensations, result).await?;

        self.view(&request.name).await
    }

    pub async fn update(&self, name: &str, update: BondUpdate, caller: &str) -> Result<BondView> {
        let current = self.context.registry.link(name).await?;
        LinkContext::ensure_kind(name, current.kind, LinkKind::Bond)?;
        update.settings.validate()?;

        let ha = self.context.ha_config().await?;
        LinkContext::guard_ha(ha.as_ref(), name)?;

        let snapshot = self.context.registry.snapshot().await?;
        check_settings_against(&snapshot, name, &update.settings)?;

        let diff = match &update.slaves {
            Some(change) => {
                let slaves = snapshot.attachments().members_of(name);
                let diff = fetch_add_remove_from_list(&slaves, change)?;
                BondManager::check_remaining(name, &slaves, &diff)?;
                let ports = self.context.registry.physical_ports().await?;
                validate_candidates(name, &diff.to_add, &snapshot, &ports, ha.as_ref())?;
                Some(diff)
            }
            None => None,
        };

        info!("{} updating {}", caller, name);

        let mut compensations = Compensations::new();
        let result = async {
            let backend = self.context.backend();
            if let Some(diff) = &diff {
                apply_diff(backend, name, diff, &mut compensations).await?;
            }
            apply_link_settings(backend, &current, &update.settings, &mut compensations).await?;
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
        LinkContext::ensure_kind(name, current.kind, LinkKind::Bond)?;

        let ha = self.context.ha_config().await?;
        LinkContext::guard_ha(ha.as_ref(), name)?;
        ensure_no_stacked_vlans(&self.context.registry.snapshot().await?, name)?;

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

    /// Bonds with every slave's bonding state
    pub async fn list(&self, name: Option<&str>) -> Result<Vec<BondView>> {
        let snapshot = self.context.registry.snapshot().await?;
        let all = self
            .context
            .registry
            .assemble(&snapshot, &LinkFilter::all())
            .await?;
        let persisted = self.context.store.interfaces().await?;

        let views: Vec<BondView> = all
            .iter()
            .filter(|l| l.kind == LinkKind::Bond)
            .filter(|l| name.map_or(true, |n| l.name == n))
            .map(|l| BondView {
                link: l.clone(),
                slaves: all
                    .iter()
                    .filter(|s| s.master.as_deref() == Some(l.name.as_str()))
                    .map(|s| BondSlave {
                        link: s.clone(),
                        state: s.slave_state,
                    })
                    .collect(),
                specific: persisted.get(&l.name).and_then(|r| r.specific.clone()),
            })
            .collect();

        if let Some(name) = name {
            if views.is_empty() {
                return Err(NetworkError::not_found("bond", name));
            }
        }
        Ok(views)
    }

    async fn view(&self, name: &str) -> Result<BondView> {
        self.list(Some(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NetworkError::not_found("bond", name))
    }
}
