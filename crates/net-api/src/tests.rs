//! Route tests driving the router with `oneshot`

#[cfg(test)]
mod tests {
    use crate::{app, AppContext, AppSettings, CALLER_HEADER};
    use appnet_apply::RecordingServices;
    use appnet_core::{IpAssignment, LinkBackend, MemoryBackend, NetworkError, Result};
    use appnet_ha::{Peer, PeerClient, ReachabilityProbe};
    use appnet_types::{DeviceIdentity, HaConfig, InterfacesDocument};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Peer that never answers
    struct OfflinePeer;

    fn offline(peer: &Peer) -> NetworkError {
        NetworkError::PeerUnreachable {
            peer: peer.address.to_string(),
        }
    }

    #[async_trait]
    impl PeerClient for OfflinePeer {
        async fn disable(&self, peer: &Peer) -> Result<()> {
            Err(offline(peer))
        }

        async fn identity(&self, peer: &Peer) -> Result<DeviceIdentity> {
            Err(offline(peer))
        }

        async fn trigger_backup(&self, peer: &Peer) -> Result<()> {
            Err(offline(peer))
        }

        async fn push_interfaces(&self, peer: &Peer, _: &InterfacesDocument) -> Result<()> {
            Err(offline(peer))
        }

        async fn adopt(&self, peer: &Peer, _: &HaConfig) -> Result<()> {
            Err(offline(peer))
        }

        async fn set_last_sync(&self, peer: &Peer, _: DateTime<Utc>) -> Result<()> {
            Err(offline(peer))
        }
    }

    struct SilentProbe;

    #[async_trait]
    impl ReachabilityProbe for SilentProbe {
        async fn reachable(&self, _: IpAddr) -> bool {
            false
        }
    }

    struct Fixture {
        dir: TempDir,
        backend: Arc<MemoryBackend>,
        app: Router,
    }

    impl Fixture {
        async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            self.send_with(method, uri, body, None).await
        }

        async fn send_with(
            &self,
            method: Method,
            uri: &str,
            body: Option<Value>,
            token: Option<&str>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder()
                .method(method)
                .uri(uri)
                .header(CALLER_HEADER, "test");
            if let Some(token) = token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBackend::with_ports(&["eth0", "eth1", "eth2", "eth3"]));

        let mut settings = AppSettings::default();
        settings.state_dir = dir.path().join("state");
        settings.daemons.failover_config_path = dir.path().join("keepalived.conf");
        settings.daemons.routing_config_path = dir.path().join("frr.conf");
        settings.daemons.restart_delay = Duration::ZERO;
        settings.reboot_delay_secs = 0;

        let context = AppContext::assemble(
            settings,
            backend.clone(),
            Arc::new(RecordingServices::new()),
            Arc::new(OfflinePeer),
            Arc::new(SilentProbe),
        )
        .unwrap();

        Fixture {
            dir,
            backend,
            app: app(context),
        }
    }

    fn primary_request() -> Value {
        json!({
            "request_type": 1,
            "config": {
                "mode": "active-backup",
                "role": "primary",
                "ha_link": "eth3",
                "peer_ip": "172.16.0.2",
                "password": "secret",
                "monitored": [
                    {"link": "eth1", "base_ip": "10.0.0.1/24", "peer_ip": "10.0.0.2/24"}
                ]
            }
        })
    }

    #[tokio::test]
    async fn test_list_links_uses_envelope() {
        let f = fixture();
        let (status, body) = f.send(Method::GET, "/api/v1/links?kind=physical", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status_code"], 200);
        assert!(body.get("error").is_none());
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["eth0", "eth1", "eth2", "eth3"]);
    }

    #[tokio::test]
    async fn test_unknown_link_is_not_found() {
        let f = fixture();
        let (status, body) = f.send(Method::GET, "/api/v1/links/eth9", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status_code"], 404);
        assert!(body.get("data").is_none());
        assert!(body["error"].as_str().unwrap().contains("eth9"));
    }

    #[tokio::test]
    async fn test_bond_with_one_slave_is_rejected() {
        let f = fixture();
        let (status, body) = f
            .send(
                Method::POST,
                "/api/v1/bonds",
                Some(json!({"name": "BOND_0", "mode": "active-backup", "slaves": ["eth1"]})),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status_code"], 400);
        assert!(f.backend.link("BOND_0").is_none());
    }

    #[tokio::test]
    async fn test_bridge_port_cannot_become_bond_slave() {
        let f = fixture();
        let (status, _) = f
            .send(
                Method::POST,
                "/api/v1/bridges",
                Some(json!({"name": "BR_lan", "ports": ["eth1"]})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = f
            .send(
                Method::POST,
                "/api/v1/bonds",
                Some(json!({"name": "BOND_0", "slaves": ["eth1", "eth2"]})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status_code"], 409);

        let (status, body) = f.send(Method::GET, "/api/v1/bridges/BR_lan", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ports"][0]["name"], "eth1");
    }

    #[tokio::test]
    async fn test_vlan_lifecycle() {
        let f = fixture();
        let (status, body) = f
            .send(
                Method::POST,
                "/api/v1/vlans",
                Some(json!({
                    "name": "VLAN_100",
                    "parent": "eth0",
                    "vlan_id": 100,
                    "address": {"static": {"address": "192.168.50.5", "prefix_len": 24}}
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["name"], "VLAN_100");
        assert_eq!(body["data"]["parent_link"]["name"], "eth0");

        let (status, _) = f.send(Method::GET, "/api/v1/vlans/VLAN_100", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = f.send(Method::DELETE, "/api/v1/vlans/VLAN_100", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(f.backend.link("VLAN_100").is_none());

        let (status, _) = f.send(Method::GET, "/api/v1/vlans/VLAN_100", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_physical_alias_round_trip() {
        let f = fixture();
        let (status, body) = f
            .send(
                Method::PUT,
                "/api/v1/physical/eth2",
                Some(json!({"address": {"static": {"address": "192.168.7.1", "prefix_len": 24}}})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["primary"]["address"], "192.168.7.1");

        let alias = json!({"address": "192.168.7.10", "prefix_len": 24});
        let (status, body) = f
            .send(Method::POST, "/api/v1/physical/eth2/aliases", Some(alias.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["secondaries"][0]["address"], "192.168.7.10");
        assert_eq!(f.backend.addresses_of("eth2").len(), 2);

        let (status, _) = f
            .send(Method::DELETE, "/api/v1/physical/eth2/aliases", Some(alias))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(f.backend.addresses_of("eth2").len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_ha_request_type() {
        let f = fixture();
        let (status, body) = f
            .send(Method::POST, "/api/v1/ha", Some(json!({"request_type": 7})))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains('7'));
    }

    #[tokio::test]
    async fn test_enable_ha_redacts_password() {
        let f = fixture();
        let (status, body) = f.send(Method::POST, "/api/v1/ha", Some(primary_request())).await;

        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["state"], "enabled");
        assert_ne!(body["data"]["config"]["password"], "secret");
        assert!(std::fs::read_to_string(f.dir.path().join("keepalived.conf"))
            .unwrap()
            .contains("vrrp_instance VI_eth1"));

        let (status, _) = f.send(Method::POST, "/api/v1/ha", Some(primary_request())).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_sync_with_silent_peer_times_out() {
        let f = fixture();
        f.backend
            .add_address("eth3", &"172.16.0.1/24".parse::<IpAssignment>().unwrap())
            .await
            .unwrap();
        let (status, _) = f.send(Method::POST, "/api/v1/ha", Some(primary_request())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = f
            .send(Method::POST, "/api/v1/ha", Some(json!({"request_type": 3})))
            .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["status_code"], 504);

        let (_, body) = f.send(Method::GET, "/api/v1/ha", None).await;
        assert_eq!(body["data"]["state"], "enabled");
    }

    #[tokio::test]
    async fn test_peer_calls_need_the_ha_password() {
        let f = fixture();
        let (status, _) = f
            .send(
                Method::POST,
                "/api/v1/ha",
                Some(json!({
                    "request_type": 1,
                    "config": {
                        "mode": "active-backup",
                        "role": "backup",
                        "ha_link": "eth3",
                        "peer_ip": "172.16.0.1",
                        "password": "secret"
                    }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = f.send(Method::GET, "/api/v1/ha/peer/identity", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = f
            .send_with(Method::GET, "/api/v1/ha/peer/identity", None, Some("wrong"))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status_code"], 401);

        let (status, body) = f
            .send_with(Method::GET, "/api/v1/ha/peer/identity", None, Some("secret"))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["model"], "appnet");

        let (status, body) = f
            .send_with(
                Method::POST,
                "/api/v1/ha/peer/adopt",
                Some(json!({
                    "mode": "active-backup",
                    "role": "backup",
                    "ha_link": "eth3",
                    "peer_ip": "172.16.0.1",
                    "password": "secret",
                    "monitored": [
                        {"link": "eth1", "base_ip": "10.0.0.1/24", "peer_ip": "10.0.0.2/24"}
                    ]
                })),
                Some("secret"),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let held: Vec<IpAddr> = f
            .backend
            .addresses_of("eth1")
            .iter()
            .map(|a| a.address)
            .collect();
        assert_eq!(held, vec!["10.0.0.2".parse::<IpAddr>().unwrap()]);

        let (status, _) = f
            .send_with(
                Method::PUT,
                "/api/v1/ha/peer/last-sync",
                Some(json!({"last_synced": "2026-03-01T12:00:00Z"})),
                Some("secret"),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = f.send(Method::GET, "/api/v1/ha", None).await;
        assert_eq!(body["data"]["state"], "synced");
    }

    #[tokio::test]
    async fn test_peer_calls_refused_while_ha_disabled() {
        let f = fixture();
        let (status, _) = f
            .send_with(Method::POST, "/api/v1/ha/peer/backup", None, Some("secret"))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_static_route_writes_routing_config() {
        let f = fixture();
        let route = json!({
            "interface": "eth0",
            "destination": "10.20.0.0",
            "mask": 16,
            "gateway": "192.168.1.254"
        });

        let (status, body) = f
            .send(Method::POST, "/api/v1/routing/static", Some(route.clone()))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["distance"], 1);
        let frr = std::fs::read_to_string(f.dir.path().join("frr.conf")).unwrap();
        assert!(frr.contains("ip route 10.20.0.0/16 192.168.1.254 1"));

        let (status, _) = f
            .send(Method::POST, "/api/v1/routing/static", Some(route))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = f
            .send(
                Method::GET,
                "/api/v1/routing/static/route?interface=eth0&destination=10.20.0.0&mask=16",
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["gateway"], "192.168.1.254");

        let (status, _) = f
            .send(
                Method::DELETE,
                "/api/v1/routing/static?interface=eth0&destination=10.20.0.0&mask=16",
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = f.send(Method::GET, "/api/v1/routing/static", None).await;
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_bgp_with_zero_asn_is_rejected() {
        let f = fixture();
        let (status, _) = f
            .send(
                Method::PUT,
                "/api/v1/routing/bgp",
                Some(json!({"asn": 0, "neighbors": [], "networks": []})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = f.send(Method::GET, "/api/v1/routing/bgp", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].is_null());
    }
}
