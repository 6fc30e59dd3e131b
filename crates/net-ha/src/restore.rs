//! Boot-time restore and factory reset of interface configuration

use log::{info, warn};
use serde::{Deserialize, Serialize};

use appnet_apply::settings::apply_link_settings;
use appnet_apply::{Compensation, Compensations, LinkContext};
use appnet_config::Selector;
use appnet_core::error::ValidationError;
use appnet_core::{
    AddressConfig, BondMode, HaConfig, InterfaceRecord, IpAssignment, LinkFilter, LinkKind,
    LinkSettings, NetworkError, NewLink, Result,
};
use appnet_routing::DaemonConfigs;
use appnet_types::select_interface_ip;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreFailure {
    pub link: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<RestoreFailure>,
}

impl RestoreReport {
    fn fail(&mut self, link: &str, error: &NetworkError) {
        warn!("Restore of {} failed: {}", link, error);
        self.failed.push(RestoreFailure {
            link: link.to_string(),
            message: error.to_string(),
        });
    }
}

/// Address the management port gets after a factory reset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryDefaults {
    pub management_link: String,
    pub management_address: IpAssignment,
}

impl Default for FactoryDefaults {
    fn default() -> Self {
        Self {
            management_link: "eth0".to_string(),
            management_address: IpAssignment::static_address([192, 168, 1, 1].into(), 24),
        }
    }
}

/// Lower links first so stacked links find their parents and members
const RESTORE_ORDER: [LinkKind; 4] = [
    LinkKind::Physical,
    LinkKind::Bond,
    LinkKind::Bridge,
    LinkKind::Vlan,
];

/// Recreate persisted composite links missing from the kernel and reapply
/// persisted MTU, hardware address and addresses. Monitored links take the
/// HA role address. A failing link is reported and skipped.
pub async fn restore_interface_settings(context: &LinkContext, caller: &str) -> Result<RestoreReport> {
    let document = context.store.interfaces().await?;
    let ha = context.ha_config().await?;
    let mut report = RestoreReport::default();

    info!(
        "{} restoring {} persisted interfaces",
        caller,
        document.interfaces.len()
    );

    for kind in RESTORE_ORDER {
        for record in document.of_kind(kind) {
            if let Err(e) = restore_record(context, record, ha.as_ref(), &mut report).await {
                report.fail(&record.name, &e);
            }
        }
    }

    info!(
        "Restore finished: {} created, {} updated, {} failed",
        report.created.len(),
        report.updated.len(),
        report.failed.len()
    );
    Ok(report)
}

async fn restore_record(
    context: &LinkContext,
    record: &InterfaceRecord,
    ha: Option<&HaConfig>,
    report: &mut RestoreReport,
) -> Result<()> {
    let backend = context.backend();

    if !context.registry.exists(&record.name).await? {
        let new_link = new_link_for(record)?;
        let mut compensations = Compensations::new();
        let result = async {
            backend.create_link(&new_link).await?;
            compensations.push(Compensation::DeleteLink(record.name.clone()));
            for member in &record.members {
                backend.set_master(member, &record.name).await?;
                compensations.push(Compensation::ClearMaster(member.clone()));
            }
            Ok(())
        }
        .await;
        context.settle(compensations, result).await?;
        report.created.push(record.name.clone());
    }

    let current = context.registry.link(&record.name).await?;
    let primary = match ha.and_then(|ha| ha.monitored(&record.name).map(|m| (ha.role, m))) {
        Some((role, monitored)) => select_interface_ip(role, monitored, record.primary.as_ref()),
        None => record.primary.clone(),
    };
    let settings = LinkSettings {
        hw_address: record.hw_address.clone(),
        mtu: record.mtu,
        address: primary.map(|ip| {
            if ip.is_dhcp() {
                AddressConfig::Dhcp
            } else {
                AddressConfig::Static(ip)
            }
        }),
        specific: None,
    };

    let mut compensations = Compensations::new();
    let result = async {
        apply_link_settings(backend, &current, &settings, &mut compensations).await?;
        for secondary in &record.secondaries {
            if !current.holds_address(&secondary.address) {
                backend.add_address(&record.name, secondary).await?;
                compensations.push(Compensation::DeleteAddress {
                    link: record.name.clone(),
                    address: secondary.clone(),
                });
            }
        }
        Ok(())
    }
    .await;
    context.settle(compensations, result).await?;
    report.updated.push(record.name.clone());
    Ok(())
}

fn new_link_for(record: &InterfaceRecord) -> Result<NewLink> {
    let missing = |field: &str| {
        NetworkError::Validation(ValidationError::MissingField {
            field: format!("{}.{}", record.name, field),
        })
    };

    match record.kind {
        LinkKind::Vlan => Ok(NewLink::Vlan {
            name: record.name.clone(),
            parent: record.parent.clone().ok_or_else(|| missing("parent"))?,
            vlan_id: record.vlan_id.ok_or_else(|| missing("vlan_id"))?,
        }),
        LinkKind::Bridge => Ok(NewLink::Bridge {
            name: record.name.clone(),
        }),
        LinkKind::Bond => Ok(NewLink::Bond {
            name: record.name.clone(),
            mode: record.bond_mode.unwrap_or(BondMode::ActiveBackup),
        }),
        _ => Err(NetworkError::not_found("interface", record.name.clone())),
    }
}

/// Delete every composite link, flush physical port addresses, forget the
/// persisted interface, routing and HA configuration, blank the generated
/// daemon files and give the management port its default address.
pub async fn reset_to_factory_default_settings_for_interfaces(
    context: &LinkContext,
    daemons: &DaemonConfigs,
    defaults: &FactoryDefaults,
    caller: &str,
) -> Result<RestoreReport> {
    info!("{} resetting interfaces to factory defaults", caller);
    let backend = context.backend();
    let mut report = RestoreReport::default();

    let links = context.registry.list_links(&LinkFilter::all()).await?;
    // VLANs first so their parents are free to go
    for kind in [LinkKind::Vlan, LinkKind::Bridge, LinkKind::Bond] {
        for link in links.iter().filter(|l| l.kind == kind) {
            if !context.registry.exists(&link.name).await? {
                continue;
            }
            if link.primary.as_ref().map_or(false, |p| p.is_dhcp()) {
                if let Err(e) = backend.stop_dhcp(&link.name).await {
                    warn!("Failed to stop DHCP client on {}: {}", link.name, e);
                }
            }
            match backend.delete_link(&link.name).await {
                Ok(()) => report.removed.push(link.name.clone()),
                Err(e) => report.fail(&link.name, &e),
            }
        }
    }

    for port in context.registry.physical_ports().await? {
        let link = context.registry.link(&port).await?;
        if link.primary.as_ref().map_or(false, |p| p.is_dhcp()) {
            if let Err(e) = backend.stop_dhcp(&port).await {
                warn!("Failed to stop DHCP client on {}: {}", port, e);
            }
        }
        match backend.flush_addresses(&port).await {
            Ok(()) => report.updated.push(port),
            Err(e) => report.fail(&port, &e),
        }
    }

    context.store.delete(Selector::All, caller).await?;
    context.store.clear_ha(caller).await?;
    context.store.clear_routing(caller).await?;
    daemons.clear().await?;

    backend
        .add_address(&defaults.management_link, &defaults.management_address)
        .await?;
    context
        .persist(&defaults.management_link, None, caller)
        .await?;

    info!(
        "Factory reset finished: {} links removed, management address {} on {}",
        report.removed.len(),
        defaults.management_address,
        defaults.management_link
    );
    Ok(report)
}
