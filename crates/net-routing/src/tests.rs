//! Renderer output and routing manager behaviour

#[cfg(test)]
mod tests {
    use crate::{
        render_failover_config, render_routing_config, DaemonConfigs, DaemonSettings,
        RoutingManager,
    };
    use appnet_apply::{BackgroundTasks, RecordingServices};
    use appnet_config::ConfigStore;
    use appnet_core::{LinkRegistry, MemoryBackend, NetworkError, PortNaming};
    use appnet_types::{
        BgpConfig, BgpNeighbor, HaConfig, HaMode, HaRole, IpAssignment, KeepAliveTuning, Link,
        LinkKind, MonitoredInterface, OspfConfig, OspfNetwork, RoutingDocument, StaticRoute,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn ha_config(role: HaRole) -> HaConfig {
        HaConfig {
            mode: HaMode::ActiveBackup,
            role,
            ha_link: "eth3".to_string(),
            peer_ip: "172.16.0.2".parse().unwrap(),
            password: "secretpassword".to_string(),
            keepalive: None,
            monitored: vec![MonitoredInterface::new("eth1")
                .with_base_ip("10.0.0.1/24".parse().unwrap())
                .with_peer_ip("10.0.0.2/24".parse().unwrap())],
        }
    }

    fn link(name: &str, primary: Option<&str>) -> Link {
        let mut link = Link::new(name, LinkKind::Physical);
        link.primary = primary.map(|p| p.parse::<IpAssignment>().unwrap());
        link
    }

    fn route(interface: &str, destination: &str, mask: u8, gateway: Option<&str>) -> StaticRoute {
        StaticRoute {
            interface: interface.to_string(),
            destination: destination.parse().unwrap(),
            mask,
            gateway: gateway.map(|g| g.parse().unwrap()),
            distance: 1,
        }
    }

    const PRIMARY_CONFIG: &str = "\
# Generated by appnet. Changes will be overwritten.
global_defs {
    router_id appnet_primary
    enable_script_security
}

vrrp_sync_group VG_appnet {
    group {
        VI_eth1
    }
}

vrrp_instance VI_eth1 {
    state MASTER
    interface eth3
    virtual_router_id 51
    priority 150
    advert_int 1
    authentication {
        auth_type PASS
        auth_pass secretpa
    }
    unicast_peer {
        172.16.0.2
    }
    track_interface {
        eth1
    }
    virtual_ipaddress {
        10.0.0.1/24 dev eth1 no_track
    }
}
";

    #[test]
    fn test_render_primary_failover_config() {
        let ha = ha_config(HaRole::Primary);
        let links = vec![link("eth1", Some("192.168.1.7/24"))];
        assert_eq!(render_failover_config(Some(&ha), &links), PRIMARY_CONFIG);
    }

    #[test]
    fn test_render_backup_uses_peer_address() {
        let ha = ha_config(HaRole::Backup);
        let rendered = render_failover_config(Some(&ha), &[]);
        assert!(rendered.contains("    state BACKUP\n"));
        assert!(rendered.contains("    priority 100\n"));
        assert!(rendered.contains("        10.0.0.2/24 dev eth1 no_track\n"));
    }

    #[test]
    fn test_render_falls_back_to_current_address() {
        let mut ha = ha_config(HaRole::Primary);
        ha.monitored.push(MonitoredInterface::new("eth0"));
        ha.keepalive = Some(KeepAliveTuning {
            advert_interval: 3,
            garp_master_delay: Some(2),
            preempt_delay: None,
        });

        let links = vec![link("eth0", Some("192.168.1.7/24")), link("eth1", None)];
        let rendered = render_failover_config(Some(&ha), &links);

        // sorted by link name
        let eth0 = rendered.find("vrrp_instance VI_eth0").unwrap();
        let eth1 = rendered.find("vrrp_instance VI_eth1").unwrap();
        assert!(eth0 < eth1);
        assert!(rendered.contains("        192.168.1.7/24 dev eth0 no_track\n"));
        assert!(rendered.contains("    virtual_router_id 52\n"));
        assert!(rendered.contains("    advert_int 3\n    garp_master_delay 2\n"));
    }

    #[test]
    fn test_render_active_active() {
        let mut ha = ha_config(HaRole::Backup);
        ha.mode = HaMode::ActiveActive;
        let rendered = render_failover_config(Some(&ha), &[]);
        assert!(rendered.contains("    state MASTER\n"));
        assert!(rendered.contains("    priority 100\n"));
    }

    #[test]
    fn test_disabled_renders_empty() {
        assert_eq!(render_failover_config(None, &[link("eth1", None)]), "");
    }

    #[tokio::test]
    async fn test_reenable_renders_identically() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        let links = vec![link("eth1", Some("192.168.1.7/24"))];
        let ha = ha_config(HaRole::Primary);

        store.set_ha(ha.clone(), "test").await.unwrap();
        let first = render_failover_config(store.ha().await.unwrap().ha.as_ref(), &links);

        store.clear_ha("test").await.unwrap();
        assert_eq!(
            render_failover_config(store.ha().await.unwrap().ha.as_ref(), &links),
            ""
        );

        store.set_ha(ha, "test").await.unwrap();
        let second = render_failover_config(store.ha().await.unwrap().ha.as_ref(), &links);
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_routing_config() {
        let routing = RoutingDocument {
            static_routes: vec![
                route("eth0", "10.20.0.0", 16, Some("10.0.0.254")),
                route("eth0", "0.0.0.0", 0, None),
            ],
            bgp: Some(BgpConfig {
                asn: 65001,
                router_id: Some("10.0.0.5".parse().unwrap()),
                neighbors: vec![BgpNeighbor {
                    address: "10.0.0.254".parse().unwrap(),
                    remote_as: 65000,
                    description: Some("upstream".to_string()),
                }],
                networks: vec!["192.168.50.0/24".parse().unwrap()],
            }),
            ospf: Some(OspfConfig {
                router_id: None,
                networks: vec![OspfNetwork {
                    network: "10.0.0.0/24".parse().unwrap(),
                    area: 0,
                }],
            }),
        };
        let mut lo = Link::new("lo", LinkKind::Loopback);
        lo.primary = Some("127.0.0.1/8".parse().unwrap());
        let links = vec![
            link("eth1", Some("192.168.1.7/24")),
            link("eth0", Some("10.0.0.5/24")),
            link("eth2", None),
            lo,
        ];
        let ha = ha_config(HaRole::Primary);

        let expected = "\
! Generated by appnet. Changes will be overwritten.
frr defaults traditional
log syslog informational
!
interface eth0
 ip address 10.0.0.5/24
exit
!
interface eth1
 ip address 10.0.0.1/24
exit
!
ip route 0.0.0.0/0 eth0 1
ip route 10.20.0.0/16 10.0.0.254 1
!
router ospf
 network 10.0.0.0/24 area 0
exit
!
router bgp 65001
 bgp router-id 10.0.0.5
 neighbor 10.0.0.254 remote-as 65000
 neighbor 10.0.0.254 description upstream
 !
 address-family ipv4 unicast
  network 192.168.50.0/24
  neighbor 10.0.0.254 activate
 exit-address-family
exit
!
line vty
!
";
        assert_eq!(render_routing_config(&routing, &links, Some(&ha)), expected);
    }

    #[test]
    fn test_dhcp_addresses_are_not_rendered() {
        let mut eth0 = link("eth0", None);
        eth0.primary = Some(IpAssignment::new(
            "10.9.0.4".parse().unwrap(),
            24,
            appnet_types::AddressProtocol::Dhcp,
        ));
        let rendered = render_routing_config(&RoutingDocument::default(), &[eth0], None);
        assert!(!rendered.contains("interface eth0"));
    }

    struct Fixture {
        dir: TempDir,
        services: Arc<RecordingServices>,
        manager: RoutingManager,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBackend::with_ports(&["eth0", "eth1"]));
        let registry = Arc::new(LinkRegistry::new(backend, PortNaming::default()));
        let store = Arc::new(ConfigStore::new(dir.path().join("state")));
        let services = Arc::new(RecordingServices::new());
        let settings = DaemonSettings {
            failover_config_path: dir.path().join("keepalived/keepalived.conf"),
            routing_config_path: dir.path().join("frr/frr.conf"),
            restart_delay: Duration::ZERO,
            ..Default::default()
        };
        let daemons = Arc::new(DaemonConfigs::new(
            settings,
            services.clone(),
            BackgroundTasks::new(),
        ));
        Fixture {
            manager: RoutingManager::new(store, registry, daemons),
            services,
            dir,
        }
    }

    #[tokio::test]
    async fn test_add_route_writes_config_and_restarts() {
        let f = fixture();
        f.manager
            .add_static_route(route("eth0", "10.20.0.0", 16, Some("10.0.0.254")), "test")
            .await
            .unwrap();

        let written = std::fs::read_to_string(f.dir.path().join("frr/frr.conf")).unwrap();
        assert!(written.contains("ip route 10.20.0.0/16 10.0.0.254 1\n"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.services.calls(), vec!["restart frr".to_string()]);

        let err = f
            .manager
            .add_static_route(route("eth0", "10.20.0.0", 16, Some("10.0.0.1")), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_route_validation() {
        let f = fixture();
        assert!(matches!(
            f.manager
                .add_static_route(route("eth7", "10.20.0.0", 16, None), "test")
                .await,
            Err(NetworkError::NotFound { .. })
        ));
        assert!(matches!(
            f.manager
                .add_static_route(route("eth0", "10.20.0.0", 33, None), "test")
                .await,
            Err(NetworkError::Validation(_))
        ));
        assert!(matches!(
            f.manager
                .add_static_route(route("eth0", "10.20.0.0", 16, Some("fd00::1")), "test")
                .await,
            Err(NetworkError::Validation(_))
        ));
        assert!(f.manager.list_static_routes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_route() {
        let f = fixture();
        let mut r = route("eth0", "10.20.0.0", 16, Some("10.0.0.254"));
        f.manager.add_static_route(r.clone(), "test").await.unwrap();

        r.distance = 20;
        f.manager.update_static_route(r.clone(), "test").await.unwrap();
        assert_eq!(f.manager.static_route(&r.key()).await.unwrap().distance, 20);

        f.manager.delete_static_route(&r.key(), "test").await.unwrap();
        assert!(matches!(
            f.manager.static_route(&r.key()).await,
            Err(NetworkError::NotFound { .. })
        ));
        assert!(matches!(
            f.manager.delete_static_route(&r.key(), "test").await,
            Err(NetworkError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_bgp_requires_asn() {
        let f = fixture();
        let bgp = BgpConfig {
            asn: 0,
            router_id: None,
            neighbors: Vec::new(),
            networks: Vec::new(),
        };
        assert!(matches!(
            f.manager.set_bgp(Some(bgp), "test").await,
            Err(NetworkError::Validation(_))
        ));
        assert!(f.manager.bgp().await.unwrap().is_none());
    }
}
