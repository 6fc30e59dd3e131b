//! Client side of the HA peer protocol
//!
//! Every call is an HTTPS request to the peer's management API under
//! `/api/v1/ha/peer/`, authenticated with the HA password as a bearer token.
//! Peer certificates are self-signed, so verification is disabled.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use appnet_core::{NetworkError, Result};
use appnet_types::{DeviceIdentity, HaConfig, InterfacesDocument};

use crate::envelope::Envelope;

pub const PEER_API_PREFIX: &str = "/api/v1/ha/peer";

pub const DISABLE_ENDPOINT: &str = "/disable";
pub const IDENTITY_ENDPOINT: &str = "/identity";
pub const BACKUP_ENDPOINT: &str = "/backup";
pub const INTERFACES_ENDPOINT: &str = "/interfaces";
pub const ADOPT_ENDPOINT: &str = "/adopt";
pub const LAST_SYNC_ENDPOINT: &str = "/last-sync";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerSettings {
    pub scheme: String,
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            port: 8443,
            timeout_secs: 10,
        }
    }
}

/// The other node and the shared secret it expects
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub address: IpAddr,
    pub password: String,
}

impl Peer {
    pub fn of(config: &HaConfig) -> Self {
        Self {
            address: config.peer_ip,
            password: config.password.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSync {
    pub last_synced: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn disable(&self, peer: &Peer) -> Result<()>;

    async fn identity(&self, peer: &Peer) -> Result<DeviceIdentity>;

    async fn trigger_backup(&self, peer: &Peer) -> Result<()>;

    async fn push_interfaces(&self, peer: &Peer, interfaces: &InterfacesDocument) -> Result<()>;

    /// Hand the peer the configuration it should run with
    async fn adopt(&self, peer: &Peer, config: &HaConfig) -> Result<()>;

    async fn set_last_sync(&self, peer: &Peer, at: DateTime<Utc>) -> Result<()>;
}

pub struct HttpPeerClient {
    client: Client,
    settings: PeerSettings,
}

impl HttpPeerClient {
    pub fn new(settings: PeerSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| NetworkError::invalid("peer client", e.to_string()))?;

        Ok(Self { client, settings })
    }

    pub fn url(&self, peer: &Peer, endpoint: &str) -> String {
        format!(
            "{}://{}{}{}",
            self.settings.scheme,
            SocketAddr::new(peer.address, self.settings.port),
            PEER_API_PREFIX,
            endpoint
        )
    }

    async fn call<B, T>(
        &self,
        peer: &Peer,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<Option<T>>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(peer, endpoint);
        debug!("Calling peer: {} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&peer.password);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                NetworkError::PeerUnreachable {
                    peer: peer.address.to_string(),
                }
            } else {
                rejected(peer, e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| rejected(peer, e.to_string()))?;
        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
            rejected(peer, format!("unexpected response (HTTP {}): {}", status.as_u16(), e))
        })?;

        if !status.is_success() || !envelope.is_success() {
            let message = envelope
                .error
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(rejected(peer, message));
        }

        debug!("Peer {} answered {}", peer.address, envelope.status_code);
        Ok(envelope.data)
    }
}

fn rejected(peer: &Peer, message: impl Into<String>) -> NetworkError {
    NetworkError::PeerRejected {
        peer: peer.address.to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn disable(&self, peer: &Peer) -> Result<()> {
        self.call::<(), serde_json::Value>(peer, Method::POST, DISABLE_ENDPOINT, None)
            .await?;
        Ok(())
    }

    async fn identity(&self, peer: &Peer) -> Result<DeviceIdentity> {
        self.call::<(), DeviceIdentity>(peer, Method::GET, IDENTITY_ENDPOINT, None)
            .await?
            .ok_or_else(|| rejected(peer, "identity missing from response"))
    }

    async fn trigger_backup(&self, peer: &Peer) -> Result<()> {
        self.call::<(), serde_json::Value>(peer, Method::POST, BACKUP_ENDPOINT, None)
            .await?;
        Ok(())
    }

    async fn push_interfaces(&self, peer: &Peer, interfaces: &InterfacesDocument) -> Result<()> {
        self.call::<_, serde_json::Value>(peer, Method::PUT, INTERFACES_ENDPOINT, Some(interfaces))
            .await?;
        Ok(())
    }

    async fn adopt(&self, peer: &Peer, config: &HaConfig) -> Result<()> {
        self.call::<_, serde_json::Value>(peer, Method::POST, ADOPT_ENDPOINT, Some(config))
            .await?;
        Ok(())
    }

    async fn set_last_sync(&self, peer: &Peer, at: DateTime<Utc>) -> Result<()> {
        let body = LastSync { last_synced: at };
        self.call::<_, serde_json::Value>(peer, Method::PUT, LAST_SYNC_ENDPOINT, Some(&body))
            .await?;
        Ok(())
    }
}
