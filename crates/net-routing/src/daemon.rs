//! Generated daemon configuration files and their restarts

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use appnet_apply::{BackgroundTasks, ServiceControl};
use appnet_core::Result;
use appnet_types::{HaConfig, Link, RoutingDocument};

use crate::frr::render_routing_config;
use crate::keepalived::render_failover_config;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub failover_config_path: PathBuf,
    pub failover_service: String,
    pub routing_config_path: PathBuf,
    pub routing_service: String,
    /// Delay before a scheduled daemon restart
    #[serde(with = "duration_secs")]
    pub restart_delay: Duration,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            failover_config_path: PathBuf::from("/etc/keepalived/keepalived.conf"),
            failover_service: "keepalived".to_string(),
            routing_config_path: PathBuf::from("/etc/frr/frr.conf"),
            routing_service: "frr".to_string(),
            restart_delay: Duration::from_secs(5),
        }
    }
}

/// Writes keepalived and FRR configuration and schedules their restarts
pub struct DaemonConfigs {
    settings: DaemonSettings,
    services: Arc<dyn ServiceControl>,
    tasks: BackgroundTasks,
}

impl DaemonConfigs {
    pub fn new(settings: DaemonSettings, services: Arc<dyn ServiceControl>, tasks: BackgroundTasks) -> Self {
        Self {
            settings,
            services,
            tasks,
        }
    }

    pub fn settings(&self) -> &DaemonSettings {
        &self.settings
    }

    pub fn services(&self) -> Arc<dyn ServiceControl> {
        self.services.clone()
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Render and write keepalived.conf, returning what was written
    pub async fn write_failover(&self, ha: Option<&HaConfig>, links: &[Link]) -> Result<String> {
        let rendered = render_failover_config(ha, links);
        write_atomic(&self.settings.failover_config_path, &rendered).await?;
        info!(
            "Wrote failover configuration to {}",
            self.settings.failover_config_path.display()
        );
        Ok(rendered)
    }

    /// Render and write frr.conf, returning what was written
    pub async fn write_routing(
        &self,
        routing: &RoutingDocument,
        links: &[Link],
        ha: Option<&HaConfig>,
    ) -> Result<String> {
        let rendered = render_routing_config(routing, links, ha);
        write_atomic(&self.settings.routing_config_path, &rendered).await?;
        info!(
            "Wrote routing configuration to {}",
            self.settings.routing_config_path.display()
        );
        Ok(rendered)
    }

    /// Truncate both generated files
    pub async fn clear(&self) -> Result<()> {
        write_atomic(&self.settings.failover_config_path, "").await?;
        write_atomic(&self.settings.routing_config_path, "").await?;
        info!("Cleared generated daemon configuration");
        Ok(())
    }

    pub fn schedule_failover_restart(&self) -> JoinHandle<()> {
        self.tasks.schedule_restart(
            self.services.clone(),
            &self.settings.failover_service,
            self.settings.restart_delay,
        )
    }

    pub fn schedule_routing_restart(&self) -> JoinHandle<()> {
        self.tasks.schedule_restart(
            self.services.clone(),
            &self.settings.routing_service,
            self.settings.restart_delay,
        )
    }
}

async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{}.tmp", file_name));

    let mut file = fs::File::create(&temp).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp, path).await?;
    debug!("Replaced {}", path.display());
    Ok(())
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
