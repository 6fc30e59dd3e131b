//! File-backed persistence of the declarative model
//!
//! Every write is read-modify-write of a whole JSON document under that
//! document's lock, landed with a temp file and a rename.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use appnet_core::error::ConflictError;
use appnet_core::{NetworkError, Result};
use appnet_types::{
    BgpConfig, ConfigSpecificFields, HaConfig, HaDocument, InterfaceRecord, InterfacesDocument,
    OspfConfig, RouteKey, RoutingDocument, StaticRoute,
};

use crate::lock::{DocumentLock, DEFAULT_LOCK_TIMEOUT};
use crate::selector::{apply_delete, apply_update, select, Selector};

pub const INTERFACES_DOCUMENT: &str = "interfaces.json";
pub const ROUTING_DOCUMENT: &str = "routing.json";
pub const HA_DOCUMENT: &str = "ha.json";

/// Every document the store manages
pub const DOCUMENTS: [&str; 3] = [INTERFACES_DOCUMENT, ROUTING_DOCUMENT, HA_DOCUMENT];

/// Persisted configuration under one state directory
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
    lock_timeout: Duration,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document_path(&self, document: &str) -> PathBuf {
        self.dir.join(document)
    }

    /// Read a whole document; a missing file is the empty document.
    pub async fn read<T: DeserializeOwned + Default>(&self, document: &str) -> Result<T> {
        match fs::read(self.document_path(document)).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: Serialize>(&self, document: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let target = self.document_path(document);
        let temp = self.dir.join(format!(".{}.tmp", document));
        let content = serde_json::to_vec_pretty(value)?;

        let mut file = fs::File::create(&temp).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, &target).await?;
        Ok(())
    }

    /// Run `f` on the current document under its lock and persist the result.
    /// Nothing is written when `f` fails.
    pub async fn modify<T, R, F>(&self, document: &str, caller: &str, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> Result<R>,
    {
        let _lock = DocumentLock::acquire(&self.dir, document, caller, self.lock_timeout).await?;

        let mut value: T = self.read(document).await?;
        let result = f(&mut value)?;
        self.write(document, &value).await?;

        debug!("{} wrote {}", caller, document);
        Ok(result)
    }

    // Interfaces

    pub async fn interfaces(&self) -> Result<InterfacesDocument> {
        self.read(INTERFACES_DOCUMENT).await
    }

    pub async fn update(
        &self,
        fragment: Vec<InterfaceRecord>,
        selector: Selector<String>,
        caller: &str,
    ) -> Result<()> {
        info!("{} updating interfaces ({})", caller, selector);
        self.modify(INTERFACES_DOCUMENT, caller, |doc: &mut InterfacesDocument| {
            apply_update(&mut doc.interfaces, fragment, &selector)
        })
        .await
    }

    /// Merge one record keyed by its own name
    pub async fn upsert_interface(&self, record: InterfaceRecord, caller: &str) -> Result<()> {
        let selector = Selector::One(record.name.clone());
        self.update(vec![record], selector, caller).await
    }

    pub async fn fetch(&self, selector: Selector<String>) -> Result<Vec<InterfaceRecord>> {
        let doc = self.interfaces().await?;
        select(&doc.interfaces, &selector)
    }

    /// Persisted record for `name`, if any
    pub async fn interface(&self, name: &str) -> Result<Option<InterfaceRecord>> {
        Ok(self.interfaces().await?.get(name).cloned())
    }

    /// Overwrite the config-specific fields of an existing record
    pub async fn update_specific_fields(
        &self,
        name: &str,
        fields: ConfigSpecificFields,
        caller: &str,
    ) -> Result<()> {
        info!("{} updating specific fields of {}", caller, name);
        self.modify(INTERFACES_DOCUMENT, caller, |doc: &mut InterfacesDocument| {
            let record = doc
                .interfaces
                .iter_mut()
                .find(|r| r.name == name)
                .ok_or_else(|| NetworkError::not_found("interface", name))?;
            record.specific = Some(fields);
            Ok(())
        })
        .await
    }

    pub async fn specific_fields(&self, name: &str) -> Result<Option<ConfigSpecificFields>> {
        Ok(self.interface(name).await?.and_then(|r| r.specific))
    }

    pub async fn delete(&self, selector: Selector<String>, caller: &str) -> Result<()> {
        info!("{} deleting interfaces ({})", caller, selector);
        self.modify(INTERFACES_DOCUMENT, caller, |doc: &mut InterfacesDocument| {
            apply_delete(&mut doc.interfaces, &selector)
        })
        .await
    }

    /// Drop a record if present; used where the kernel object is already gone
    pub async fn forget_interface(&self, name: &str, caller: &str) -> Result<bool> {
        self.modify(INTERFACES_DOCUMENT, caller, |doc: &mut InterfacesDocument| {
            let before = doc.interfaces.len();
            doc.interfaces.retain(|r| r.name != name);
            Ok(doc.interfaces.len() != before)
        })
        .await
    }

    // Routing

    pub async fn routing(&self) -> Result<RoutingDocument> {
        self.read(ROUTING_DOCUMENT).await
    }

    pub async fn update_static_routes(
        &self,
        fragment: Vec<StaticRoute>,
        selector: Selector<RouteKey>,
        caller: &str,
    ) -> Result<()> {
        info!("{} updating static routes ({})", caller, selector);
        self.modify(ROUTING_DOCUMENT, caller, |doc: &mut RoutingDocument| {
            apply_update(&mut doc.static_routes, fragment, &selector)
        })
        .await
    }

    /// Insert a route whose key is not yet present
    pub async fn add_static_route(&self, route: StaticRoute, caller: &str) -> Result<()> {
        info!("{} adding static route {}", caller, route.key());
        self.modify(ROUTING_DOCUMENT, caller, |doc: &mut RoutingDocument| {
            let key = route.key();
            if doc.route(&key).is_some() {
                return Err(NetworkError::Conflict(ConflictError::DuplicateKey {
                    key: key.to_string(),
                }));
            }
            doc.static_routes.push(route);
            Ok(())
        })
        .await
    }

    /// Replace a route that must already exist
    pub async fn update_static_route(&self, route: StaticRoute, caller: &str) -> Result<()> {
        info!("{} updating static route {}", caller, route.key());
        self.modify(ROUTING_DOCUMENT, caller, |doc: &mut RoutingDocument| {
            let key = route.key();
            let existing = doc
                .static_routes
                .iter_mut()
                .find(|r| r.key() == key)
                .ok_or_else(|| NetworkError::not_found("static route", key.to_string()))?;
            *existing = route;
            Ok(())
        })
        .await
    }

    pub async fn delete_static_routes(&self, selector: Selector<RouteKey>, caller: &str) -> Result<()> {
        info!("{} deleting static routes ({})", caller, selector);
        self.modify(ROUTING_DOCUMENT, caller, |doc: &mut RoutingDocument| {
            apply_delete(&mut doc.static_routes, &selector)
        })
        .await
    }

    pub async fn set_bgp(&self, bgp: Option<BgpConfig>, caller: &str) -> Result<()> {
        if let Some(bgp) = &bgp {
            unique_by(bgp.neighbors.iter().map(|n| n.address.to_string()))?;
            unique_by(bgp.networks.iter().map(|n| n.to_string()))?;
        }
        info!("{} setting bgp configuration", caller);
        self.modify(ROUTING_DOCUMENT, caller, |doc: &mut RoutingDocument| {
            doc.bgp = bgp;
            Ok(())
        })
        .await
    }

    pub async fn set_ospf(&self, ospf: Option<OspfConfig>, caller: &str) -> Result<()> {
        if let Some(ospf) = &ospf {
            unique_by(ospf.networks.iter().map(|n| n.network.to_string()))?;
        }
        info!("{} setting ospf configuration", caller);
        self.modify(ROUTING_DOCUMENT, caller, |doc: &mut RoutingDocument| {
            doc.ospf = ospf;
            Ok(())
        })
        .await
    }

    pub async fn clear_routing(&self, caller: &str) -> Result<()> {
        info!("{} clearing routing configuration", caller);
        self.modify(ROUTING_DOCUMENT, caller, |doc: &mut RoutingDocument| {
            *doc = RoutingDocument::default();
            Ok(())
        })
        .await
    }

    // HA

    pub async fn ha(&self) -> Result<HaDocument> {
        self.read(HA_DOCUMENT).await
    }

    pub async fn set_ha(&self, ha: HaConfig, caller: &str) -> Result<()> {
        info!("{} storing HA configuration ({:?} {:?})", caller, ha.mode, ha.role);
        self.modify(HA_DOCUMENT, caller, |doc: &mut HaDocument| {
            doc.ha = Some(ha);
            Ok(())
        })
        .await
    }

    /// Remove the HA configuration and the sync timestamp
    pub async fn clear_ha(&self, caller: &str) -> Result<()> {
        info!("{} clearing HA configuration", caller);
        self.modify(HA_DOCUMENT, caller, |doc: &mut HaDocument| {
            *doc = HaDocument::default();
            Ok(())
        })
        .await
    }

    pub async fn set_last_synced(&self, at: DateTime<Utc>, caller: &str) -> Result<()> {
        info!("{} recording HA sync at {}", caller, at);
        self.modify(HA_DOCUMENT, caller, |doc: &mut HaDocument| {
            if doc.ha.is_none() {
                return Err(NetworkError::Conflict(ConflictError::InvalidState {
                    name: "ha".to_string(),
                    state: "disabled".to_string(),
                }));
            }
            doc.last_synced = Some(at);
            Ok(())
        })
        .await
    }
}

fn unique_by(keys: impl Iterator<Item = String>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for key in keys {
        if !seen.insert(key.clone()) {
            return Err(NetworkError::Conflict(ConflictError::DuplicateKey { key }));
        }
    }
    Ok(())
}
