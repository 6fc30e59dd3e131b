use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use appnet_apply::{
    BackgroundTasks, BondApplier, BridgeApplier, IpCommandBackend, LinkContext, PhysicalApplier,
    ServiceControl, SystemdServices, VlanApplier,
};
use appnet_config::ConfigStore;
use appnet_core::{LinkBackend, LinkRegistry};
use appnet_ha::{HaCoordinator, HttpPeerClient, PeerClient, PingProbe, ReachabilityProbe};
use appnet_routing::{DaemonConfigs, RoutingManager};

use crate::settings::AppSettings;

/// Everything a request handler can reach
pub struct AppContext {
    pub settings: AppSettings,
    pub links: LinkContext,
    pub vlans: VlanApplier,
    pub bridges: BridgeApplier,
    pub bonds: BondApplier,
    pub physical: PhysicalApplier,
    pub daemons: Arc<DaemonConfigs>,
    pub routing: RoutingManager,
    pub ha: HaCoordinator,
}

impl AppContext {
    /// Production wiring: `ip`, systemd, ping and the HTTPS peer client
    pub async fn bootstrap(settings: AppSettings) -> Result<Arc<Self>> {
        let peer = HttpPeerClient::new(settings.peer.clone())
            .map_err(|err| anyhow::anyhow!(err))?;
        let context = Self::assemble(
            settings,
            Arc::new(IpCommandBackend::new()),
            Arc::new(SystemdServices::new()),
            Arc::new(peer),
            Arc::new(PingProbe::new()),
        )?;

        let ports = context
            .links
            .registry
            .refresh()
            .await
            .context("failed to read kernel links")?;
        info!("Found {} physical ports: {}", ports.len(), ports.join(", "));
        Ok(context)
    }

    pub fn assemble(
        settings: AppSettings,
        backend: Arc<dyn LinkBackend>,
        services: Arc<dyn ServiceControl>,
        peer: Arc<dyn PeerClient>,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Result<Arc<Self>> {
        let naming = settings
            .port_naming()
            .map_err(|err| anyhow::anyhow!(err))?;
        let registry = Arc::new(LinkRegistry::new(backend, naming));
        let store = Arc::new(
            ConfigStore::new(settings.state_dir.clone()).with_lock_timeout(settings.lock_timeout()),
        );
        let links = LinkContext::new(registry.clone(), store.clone());

        let daemons = Arc::new(DaemonConfigs::new(
            settings.daemons.clone(),
            services,
            BackgroundTasks::new(),
        ));
        let routing = RoutingManager::new(store, registry, daemons.clone());
        let ha = HaCoordinator::new(
            links.clone(),
            daemons.clone(),
            peer,
            probe,
            settings.identity.clone(),
        )
        .with_reboot_delay(settings.reboot_delay());

        Ok(Arc::new(Self {
            vlans: VlanApplier::new(links.clone()),
            bridges: BridgeApplier::new(links.clone()),
            bonds: BondApplier::new(links.clone()),
            physical: PhysicalApplier::new(links.clone()),
            settings,
            links,
            daemons,
            routing,
            ha,
        }))
    }
}
