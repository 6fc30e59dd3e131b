//! HA lifecycle: enable, disable and backup sync, plus the peer-facing side
//! of the same protocol.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use appnet_apply::settings::replace_primary;
use appnet_apply::{Compensations, LinkContext};
use appnet_config::{BackupManifest, HA_DOCUMENT, INTERFACES_DOCUMENT};
use appnet_core::error::ConflictError;
use appnet_core::{AddressConfig, LinkFilter, NetworkError, Result};
use appnet_routing::DaemonConfigs;
use appnet_types::{
    select_interface_ip, DeviceIdentity, HaConfig, HaDocument, HaMode, HaRole, HaState,
    InterfaceRecord, InterfacesDocument, Link, LinkKind,
};

use crate::peer::{Peer, PeerClient};
use crate::probe::ReachabilityProbe;
use crate::request::{HaAction, HaRequest};
use crate::restore::restore_interface_settings;
use crate::validate::HaValidator;

pub const DEFAULT_REBOOT_DELAY: Duration = Duration::from_secs(10);

const REDACTED: &str = "********";

/// What callers see of the HA state; the password is never echoed back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaStatus {
    pub state: HaState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<HaConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

impl From<HaDocument> for HaStatus {
    fn from(doc: HaDocument) -> Self {
        Self {
            state: doc.state(),
            config: doc.ha.map(|ha| HaConfig {
                password: REDACTED.to_string(),
                ..ha
            }),
            last_synced: doc.last_synced,
        }
    }
}

pub struct HaCoordinator {
    context: LinkContext,
    daemons: Arc<DaemonConfigs>,
    peer: Arc<dyn PeerClient>,
    probe: Arc<dyn ReachabilityProbe>,
    identity: DeviceIdentity,
    backup_dir: PathBuf,
    reboot_delay: Duration,
}

impl HaCoordinator {
    pub fn new(
        context: LinkContext,
        daemons: Arc<DaemonConfigs>,
        peer: Arc<dyn PeerClient>,
        probe: Arc<dyn ReachabilityProbe>,
        identity: DeviceIdentity,
    ) -> Self {
        let backup_dir = context.store.dir().join("backups");
        Self {
            context,
            daemons,
            peer,
            probe,
            identity,
            backup_dir,
            reboot_delay: DEFAULT_REBOOT_DELAY,
        }
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn with_reboot_delay(mut self, delay: Duration) -> Self {
        self.reboot_delay = delay;
        self
    }

    /// Dispatch a numbered request
    pub async fn handle(&self, request: HaRequest, caller: &str) -> Result<HaStatus> {
        match request.into_action()? {
            HaAction::Create(config) => self.enable(config, caller).await,
            HaAction::Disable { notify_peer } => {
                self.disable(notify_peer, caller).await?;
                self.status().await
            }
            HaAction::SyncBackup => {
                self.sync_backup(caller).await?;
                self.status().await
            }
        }
    }

    pub async fn status(&self) -> Result<HaStatus> {
        Ok(self.context.store.ha().await?.into())
    }

    pub async fn enable(&self, mut config: HaConfig, caller: &str) -> Result<HaStatus> {
        if self.context.ha_config().await?.is_some() {
            return Err(invalid_state("enabled"));
        }

        // the backup of an active-backup pair learns its monitored set at sync
        if config.mode == HaMode::ActiveBackup && config.role == HaRole::Backup {
            config.monitored.clear();
            config.keepalive = None;
        }

        info!(
            "{} enabling HA ({:?}, {}) over {} with peer {}",
            caller, config.mode, config.role, config.ha_link, config.peer_ip
        );
        self.activate(config, caller).await?;
        self.status().await
    }

    pub async fn disable(&self, notify_peer: bool, caller: &str) -> Result<()> {
        let config = self
            .context
            .ha_config()
            .await?
            .ok_or_else(|| invalid_state("disabled"))?;

        info!("{} disabling HA", caller);
        self.context.store.clear_ha(caller).await?;
        self.regenerate(None).await?;

        if notify_peer {
            let peer = Peer::of(&config);
            let notified = match self.ensure_reachable(&peer).await {
                Ok(()) => self.peer.disable(&peer).await,
                Err(e) => Err(e),
            };
            if let Err(e) = notified {
                warn!("Peer {} was not disabled: {}", peer.address, e);
            }
        }

        self.daemons
            .tasks()
            .schedule_reboot(self.daemons.services(), self.reboot_delay);
        Ok(())
    }

    /// Push this node's configuration to the backup and record the sync.
    /// Nothing local changes unless every peer step succeeds.
    pub async fn sync_backup(&self, caller: &str) -> Result<DateTime<Utc>> {
        let config = self
            .context
            .ha_config()
            .await?
            .ok_or_else(|| invalid_state("disabled"))?;
        if config.role != HaRole::Primary {
            return Err(invalid_state("backup"));
        }

        let local_ip = self
            .context
            .registry
            .primary_address(&config.ha_link)
            .await?
            .ok_or_else(|| {
                NetworkError::Conflict(ConflictError::InvalidState {
                    name: config.ha_link.clone(),
                    state: "unaddressed".to_string(),
                })
            })?;

        let peer = Peer::of(&config);
        info!("{} syncing HA configuration to {}", caller, peer.address);

        self.ensure_reachable(&peer).await?;
        let remote = self.peer.identity(&peer).await?;
        if !self.identity.compatible_with(&remote) {
            return Err(NetworkError::PeerRejected {
                peer: peer.address.to_string(),
                message: format!(
                    "device mismatch: local {} {}, peer {} {}",
                    self.identity.model,
                    self.identity.firmware_version,
                    remote.model,
                    remote.firmware_version
                ),
            });
        }

        self.ensure_reachable(&peer).await?;
        self.peer.trigger_backup(&peer).await?;

        let interfaces = self.context.store.interfaces().await?;
        self.ensure_reachable(&peer).await?;
        self.peer.push_interfaces(&peer, &interfaces).await?;

        self.ensure_reachable(&peer).await?;
        self.peer
            .adopt(&peer, &config.for_peer(local_ip.address))
            .await?;

        let now = Utc::now();
        self.ensure_reachable(&peer).await?;
        self.peer.set_last_sync(&peer, now).await?;

        self.context.store.set_last_synced(now, caller).await?;
        self.daemons.schedule_failover_restart();
        info!("HA sync with {} completed", peer.address);
        Ok(now)
    }

    // Peer side

    pub fn peer_identity(&self) -> DeviceIdentity {
        self.identity.clone()
    }

    /// Bearer token check for inbound peer calls
    pub async fn verify_peer_token(&self, token: &str) -> Result<bool> {
        let config = self
            .context
            .ha_config()
            .await?
            .ok_or_else(|| invalid_state("disabled"))?;
        Ok(!token.is_empty() && tokens_match(token.as_bytes(), config.password.as_bytes()))
    }

    pub async fn peer_disable(&self, caller: &str) -> Result<()> {
        self.disable(false, caller).await
    }

    pub async fn peer_backup(&self, caller: &str) -> Result<BackupManifest> {
        info!("{} requested a configuration backup", caller);
        let (path, manifest) = self.context.store.backup(&self.backup_dir).await?;
        info!("Backup {} written to {}", manifest.id, path.display());
        Ok(manifest)
    }

    /// Take over the primary's link topology. Addressing stays node-local;
    /// the kernel picks the document up when the HA configuration is adopted.
    pub async fn peer_push_interfaces(&self, document: InterfacesDocument, caller: &str) -> Result<()> {
        info!(
            "{} pushed {} interface records",
            caller,
            document.interfaces.len()
        );
        self.context
            .store
            .modify(INTERFACES_DOCUMENT, caller, move |local: &mut InterfacesDocument| {
                local.interfaces = adopt_topology(local, document);
                Ok(())
            })
            .await
    }

    /// Bring the pushed interfaces up, then take the HA role handed over by
    /// the primary.
    pub async fn peer_adopt(&self, config: HaConfig, caller: &str) -> Result<HaStatus> {
        info!("{} asked this node to adopt HA as {}", caller, config.role);
        let report = restore_interface_settings(&self.context, caller).await?;
        if !report.failed.is_empty() {
            warn!(
                "{} pushed interfaces could not be applied",
                report.failed.len()
            );
        }
        self.activate(config, caller).await?;
        self.status().await
    }

    pub async fn peer_last_sync(&self, at: DateTime<Utc>, caller: &str) -> Result<()> {
        self.context.store.set_last_synced(at, caller).await
    }

    /// Validate, move role addresses into place, persist, then regenerate
    /// daemon configuration and schedule the failover daemon restart.
    async fn activate(&self, mut config: HaConfig, caller: &str) -> Result<()> {
        let snapshot = self.context.registry.snapshot().await?;
        let ports = self.context.registry.physical_ports().await?;
        HaValidator::validate(&config, &snapshot, &ports)?;

        let links = self.context.registry.list_links(&LinkFilter::all()).await?;
        for entry in config.monitored.iter_mut() {
            entry.interface_ip = links
                .iter()
                .find(|l| l.name == entry.link)
                .and_then(|l| l.primary.clone());
        }

        let mut compensations = Compensations::new();
        let result = async {
            self.apply_role_addresses(&config, &links, &mut compensations)
                .await?;
            let stored = config.clone();
            self.context
                .store
                .modify(HA_DOCUMENT, caller, move |doc: &mut HaDocument| {
                    doc.ha = Some(stored);
                    doc.last_synced = None;
                    Ok(())
                })
                .await
        }
        .await;
        self.context.settle(compensations, result).await?;

        self.regenerate(Some(&config)).await?;
        self.daemons.schedule_failover_restart();
        Ok(())
    }

    async fn apply_role_addresses(
        &self,
        config: &HaConfig,
        links: &[Link],
        compensations: &mut Compensations,
    ) -> Result<()> {
        let backend = self.context.backend();
        for entry in &config.monitored {
            let link = match links.iter().find(|l| l.name == entry.link) {
                Some(link) => link,
                None => continue,
            };
            let target = match select_interface_ip(config.role, entry, link.primary.as_ref()) {
                Some(target) if !target.is_dhcp() => target,
                _ => continue,
            };
            replace_primary(backend, link, &AddressConfig::Static(target), compensations).await?;
        }
        Ok(())
    }

    async fn regenerate(&self, ha: Option<&HaConfig>) -> Result<()> {
        let links = self.context.registry.list_links(&LinkFilter::all()).await?;
        self.daemons.write_failover(ha, &links).await?;

        let routing = self.context.store.routing().await?;
        self.daemons.write_routing(&routing, &links, ha).await?;
        if !routing.is_empty() {
            self.daemons.schedule_routing_restart();
        }
        Ok(())
    }

    async fn ensure_reachable(&self, peer: &Peer) -> Result<()> {
        if self.probe.reachable(peer.address).await {
            Ok(())
        } else {
            warn!("HA peer {} does not answer ping", peer.address);
            Err(NetworkError::PeerUnreachable {
                peer: peer.address.to_string(),
            })
        }
    }
}

/// Merge a document pushed by the primary into the local one.
///
/// Physical ports are node hardware: a local record always wins and a pushed
/// one is kept for its MTU only. Composite links follow the primary, keeping
/// the local addresses of a link this node already knew. Pushed addresses and
/// hardware addresses are never taken, so the HA link and unmonitored ports
/// keep what they have and monitored links get their role address on adopt.
fn adopt_topology(local: &InterfacesDocument, pushed: InterfacesDocument) -> Vec<InterfaceRecord> {
    let mut merged: Vec<InterfaceRecord> = local
        .of_kind(LinkKind::Physical)
        .cloned()
        .collect();

    for mut record in pushed.interfaces {
        if record.kind == LinkKind::Physical && local.get(&record.name).is_some() {
            continue;
        }
        if merged.iter().any(|r| r.name == record.name) {
            continue;
        }
        match local.get(&record.name) {
            Some(known) if known.kind == record.kind => {
                record.hw_address = known.hw_address.clone();
                record.primary = known.primary.clone();
                record.secondaries = known.secondaries.clone();
            }
            _ => {
                record.hw_address = None;
                record.primary = None;
                record.secondaries.clear();
            }
        }
        merged.push(record);
    }
    merged
}

/// Compares every byte regardless of where the first mismatch sits
fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

fn invalid_state(state: &str) -> NetworkError {
    NetworkError::Conflict(ConflictError::InvalidState {
        name: "ha".to_string(),
        state: state.to_string(),
    })
}
