//! CLI command tests

#[cfg(test)]
mod tests {
    use crate::commands::restore::render_report;
    use crate::commands::{
        HaStatusCommand, KindArg, LinksCommand, OutputFormat, RenderCommand, RestoreCommand,
        Target,
    };
    use appnet_api::{AppContext, AppSettings};
    use appnet_apply::RecordingServices;
    use appnet_core::bridge::BridgeRequest;
    use appnet_core::vlan::VlanRequest;
    use appnet_core::{LinkBackend, MemoryBackend};
    use appnet_ha::{HttpPeerClient, PeerSettings, PingProbe, RestoreReport};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        backend: Arc<MemoryBackend>,
        context: Arc<AppContext>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBackend::with_ports(&["eth0", "eth1", "eth2"]));

        let mut settings = AppSettings::default();
        settings.state_dir = dir.path().join("state");
        settings.daemons.failover_config_path = dir.path().join("keepalived.conf");
        settings.daemons.routing_config_path = dir.path().join("frr.conf");
        settings.daemons.restart_delay = Duration::ZERO;
        settings.port_aliases.insert("eth0".to_string(), "MGMT".to_string());

        let context = AppContext::assemble(
            settings,
            backend.clone(),
            Arc::new(RecordingServices::new()),
            Arc::new(HttpPeerClient::new(PeerSettings::default()).unwrap()),
            Arc::new(PingProbe::new()),
        )
        .unwrap();

        Fixture {
            _dir: dir,
            backend,
            context,
        }
    }

    #[tokio::test]
    async fn test_links_table_lists_every_port() {
        let f = fixture();
        let out = LinksCommand::new(f.context.clone())
            .links(Some(KindArg::Physical), OutputFormat::Text)
            .await
            .unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("Interface"));
        assert_eq!(lines.len(), 2 + 3);
        assert!(lines[2].starts_with("eth0"));
        assert!(lines[2].contains("physical"));
    }

    #[tokio::test]
    async fn test_links_json_is_parseable() {
        let f = fixture();
        let out = LinksCommand::new(f.context.clone())
            .links(None, OutputFormat::Json)
            .await
            .unwrap();

        let links: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(links
            .as_array()
            .unwrap()
            .iter()
            .any(|l| l["name"] == "eth1"));
    }

    #[tokio::test]
    async fn test_physical_shows_alias_and_attachment() {
        let f = fixture();
        f.context
            .bridges
            .create(BridgeRequest::new("BR_lan").with_port("eth1"), "test")
            .await
            .unwrap();

        let out = LinksCommand::new(f.context.clone())
            .physical(OutputFormat::Text)
            .await
            .unwrap();

        let eth0 = out.lines().find(|l| l.starts_with("eth0")).unwrap();
        assert!(eth0.contains("MGMT"));
        let eth1 = out.lines().find(|l| l.starts_with("eth1")).unwrap();
        assert!(eth1.contains("BR_lan"));
        assert!(eth1.ends_with("no"));
    }

    #[tokio::test]
    async fn test_render_without_ha_or_routes() {
        let f = fixture();
        let cmd = RenderCommand::new(f.context.clone());

        assert_eq!(cmd.render(Target::Failover).await.unwrap(), "");
        let routing = cmd.render(Target::Routing).await.unwrap();
        assert!(routing.contains("frr defaults traditional"));
        assert!(routing.ends_with("line vty\n!\n"));
    }

    #[tokio::test]
    async fn test_restore_recreates_missing_vlan() {
        let f = fixture();
        f.context
            .vlans
            .create(VlanRequest::new("VLAN_10", "eth0", 10), "test")
            .await
            .unwrap();
        f.backend.delete_link("VLAN_10").await.unwrap();

        let out = RestoreCommand::new(f.context.clone())
            .restore(OutputFormat::Text)
            .await
            .unwrap();

        assert!(out.contains("Created: VLAN_10"));
        assert!(f.backend.link("VLAN_10").is_some());
    }

    #[tokio::test]
    async fn test_factory_reset_needs_confirmation() {
        let f = fixture();
        f.context
            .vlans
            .create(VlanRequest::new("VLAN_10", "eth0", 10), "test")
            .await
            .unwrap();
        let cmd = RestoreCommand::new(f.context.clone());

        assert!(cmd.factory_reset(false, OutputFormat::Text).await.is_err());
        assert!(f.backend.link("VLAN_10").is_some());

        let out = cmd.factory_reset(true, OutputFormat::Json).await.unwrap();
        let report: RestoreReport = serde_json::from_str(&out).unwrap();
        assert_eq!(report.removed, vec!["VLAN_10".to_string()]);
        assert!(f.backend.link("VLAN_10").is_none());
    }

    #[tokio::test]
    async fn test_ha_status_disabled() {
        let f = fixture();
        let out = HaStatusCommand::new(f.context.clone())
            .execute(OutputFormat::Text)
            .await
            .unwrap();
        assert_eq!(out, "State:       disabled\n");
    }

    #[test]
    fn test_empty_report() {
        let out = render_report(&RestoreReport::default(), OutputFormat::Text).unwrap();
        assert_eq!(out, "Nothing to do\n");
    }
}
