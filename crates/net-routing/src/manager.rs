//! Static routes, BGP and OSPF management

use std::net::IpAddr;
use std::sync::Arc;

use log::info;

use appnet_config::{ConfigStore, Selector};
use appnet_core::{LinkFilter, LinkRegistry, NetworkError, Result};
use appnet_types::{BgpConfig, OspfConfig, RouteKey, RoutingDocument, StaticRoute};

use crate::daemon::DaemonConfigs;

pub struct RoutingManager {
    store: Arc<ConfigStore>,
    registry: Arc<LinkRegistry>,
    daemons: Arc<DaemonConfigs>,
}

impl RoutingManager {
    pub fn new(store: Arc<ConfigStore>, registry: Arc<LinkRegistry>, daemons: Arc<DaemonConfigs>) -> Self {
        Self {
            store,
            registry,
            daemons,
        }
    }

    pub async fn list_static_routes(&self) -> Result<Vec<StaticRoute>> {
        let mut routes = self.store.routing().await?.static_routes;
        routes.sort_by_key(|r| r.key());
        Ok(routes)
    }

    pub async fn static_route(&self, key: &RouteKey) -> Result<StaticRoute> {
        self.store
            .routing()
            .await?
            .route(key)
            .cloned()
            .ok_or_else(|| NetworkError::not_found("static route", key.to_string()))
    }

    pub async fn add_static_route(&self, route: StaticRoute, caller: &str) -> Result<StaticRoute> {
        self.validate_route(&route).await?;
        self.store.add_static_route(route.clone(), caller).await?;
        self.apply(caller).await?;
        Ok(route)
    }

    /// Replace the route identified by `route`'s key
    pub async fn update_static_route(&self, route: StaticRoute, caller: &str) -> Result<StaticRoute> {
        self.validate_route(&route).await?;
        self.store.update_static_route(route.clone(), caller).await?;
        self.apply(caller).await?;
        Ok(route)
    }

    pub async fn delete_static_route(&self, key: &RouteKey, caller: &str) -> Result<()> {
        self.store
            .delete_static_routes(Selector::One(key.clone()), caller)
            .await?;
        self.apply(caller).await?;
        Ok(())
    }

    pub async fn bgp(&self) -> Result<Option<BgpConfig>> {
        Ok(self.store.routing().await?.bgp)
    }

    /// `None` removes the BGP block
    pub async fn set_bgp(&self, bgp: Option<BgpConfig>, caller: &str) -> Result<()> {
        if let Some(bgp) = &bgp {
            validate_bgp(bgp)?;
        }
        self.store.set_bgp(bgp, caller).await?;
        self.apply(caller).await?;
        Ok(())
    }

    pub async fn ospf(&self) -> Result<Option<OspfConfig>> {
        Ok(self.store.routing().await?.ospf)
    }

    /// `None` removes the OSPF block
    pub async fn set_ospf(&self, ospf: Option<OspfConfig>, caller: &str) -> Result<()> {
        self.store.set_ospf(ospf, caller).await?;
        self.apply(caller).await?;
        Ok(())
    }

    pub async fn routing(&self) -> Result<RoutingDocument> {
        self.store.routing().await
    }

    /// Render and write frr.conf from the stored document, then schedule a
    /// routing daemon restart. Returns the rendered configuration.
    pub async fn apply(&self, caller: &str) -> Result<String> {
        let routing = self.store.routing().await?;
        let ha = self.store.ha().await?.ha;
        let links = self.registry.list_links(&LinkFilter::all()).await?;

        info!("{} applying routing configuration", caller);
        let rendered = self.daemons.write_routing(&routing, &links, ha.as_ref()).await?;
        self.daemons.schedule_routing_restart();
        Ok(rendered)
    }

    async fn validate_route(&self, route: &StaticRoute) -> Result<()> {
        let max_mask = match route.destination {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if route.mask > max_mask {
            return Err(NetworkError::invalid("mask", route.mask.to_string()));
        }
        if let Some(gateway) = &route.gateway {
            if gateway.is_ipv4() != route.destination.is_ipv4() {
                return Err(NetworkError::invalid("gateway", gateway.to_string()));
            }
            if gateway.is_unspecified() || gateway.is_multicast() {
                return Err(NetworkError::invalid("gateway", gateway.to_string()));
            }
        }
        if route.distance == 0 {
            return Err(NetworkError::invalid("distance", "0"));
        }
        if !self.registry.exists(&route.interface).await? {
            return Err(NetworkError::not_found("interface", route.interface.clone()));
        }
        Ok(())
    }
}

fn validate_bgp(bgp: &BgpConfig) -> Result<()> {
    if bgp.asn == 0 {
        return Err(NetworkError::invalid("asn", "0"));
    }
    for neighbor in &bgp.neighbors {
        if neighbor.remote_as == 0 {
            return Err(NetworkError::invalid(
                "remote_as",
                format!("0 for neighbor {}", neighbor.address),
            ));
        }
    }
    Ok(())
}
