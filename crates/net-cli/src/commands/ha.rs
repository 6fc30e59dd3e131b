//! HA status

use std::fmt::Write;
use std::sync::Arc;

use anyhow::Result;

use appnet_api::AppContext;

use super::{to_json, OutputFormat};

pub struct HaStatusCommand {
    context: Arc<AppContext>,
}

impl HaStatusCommand {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    pub async fn execute(&self, format: OutputFormat) -> Result<String> {
        let status = self.context.ha.status().await?;
        if format == OutputFormat::Json {
            return to_json(&status);
        }

        let mut out = String::new();
        let state = serde_json::to_value(status.state)?;
        let _ = writeln!(out, "State:       {}", state.as_str().unwrap_or("-"));
        if let Some(config) = &status.config {
            let mode = serde_json::to_value(config.mode)?;
            let _ = writeln!(out, "Mode:        {}", mode.as_str().unwrap_or("-"));
            let _ = writeln!(out, "Role:        {}", config.role);
            let _ = writeln!(out, "HA link:     {}", config.ha_link);
            let _ = writeln!(out, "Peer:        {}", config.peer_ip);
            for entry in &config.monitored {
                let base = entry.base_ip.map(|ip| ip.to_string());
                let peer = entry.peer_ip.map(|ip| ip.to_string());
                let _ = writeln!(
                    out,
                    "Monitored:   {} (primary {}, backup {})",
                    entry.link,
                    base.as_deref().unwrap_or("-"),
                    peer.as_deref().unwrap_or("-")
                );
            }
        }
        if let Some(at) = status.last_synced {
            let _ = writeln!(out, "Last synced: {}", at.to_rfc3339());
        }
        Ok(out)
    }
}
