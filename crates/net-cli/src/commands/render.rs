//! Render the generated keepalived and FRR configuration

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use appnet_api::AppContext;
use appnet_core::LinkFilter;
use appnet_routing::{render_failover_config, render_routing_config};

/// Which daemon configuration to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Target {
    Failover,
    Routing,
}

pub struct RenderCommand {
    context: Arc<AppContext>,
}

impl RenderCommand {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Render from the persisted documents and the live links without
    /// touching any file
    pub async fn render(&self, target: Target) -> Result<String> {
        let links = self
            .context
            .links
            .registry
            .list_links(&LinkFilter::all())
            .await?;
        let ha = self.context.links.ha_config().await?;

        Ok(match target {
            Target::Failover => render_failover_config(ha.as_ref(), &links),
            Target::Routing => {
                let routing = self.context.links.store.routing().await?;
                render_routing_config(&routing, &links, ha.as_ref())
            }
        })
    }

    /// Write both files and restart the daemons right away
    pub async fn write(&self) -> Result<()> {
        let links = self
            .context
            .links
            .registry
            .list_links(&LinkFilter::all())
            .await?;
        let ha = self.context.links.ha_config().await?;
        let routing = self.context.links.store.routing().await?;
        let daemons = &self.context.daemons;

        daemons.write_failover(ha.as_ref(), &links).await?;
        daemons.write_routing(&routing, &links, ha.as_ref()).await?;

        let settings = daemons.settings();
        if ha.is_some() {
            daemons
                .services()
                .restart(&settings.failover_service)
                .await
                .with_context(|| format!("failed to restart {}", settings.failover_service))?;
        }
        if !routing.is_empty() {
            daemons
                .services()
                .restart(&settings.routing_service)
                .await
                .with_context(|| format!("failed to restart {}", settings.routing_service))?;
        }
        info!("Daemon configuration regenerated");
        Ok(())
    }
}
