//! Shared state for the link appliers

use std::net::IpAddr;
use std::sync::Arc;

use log::{info, warn};

use appnet_config::ConfigStore;
use appnet_core::error::{ConflictError, ValidationError};
use appnet_core::registry::KernelSnapshot;
use appnet_core::{
    ConfigSpecificFields, HaConfig, InterfaceRecord, Link, LinkBackend, LinkKind, LinkRegistry,
    NetworkError, Result,
};

use crate::compensation::Compensations;

/// Registry and store handed to every applier
#[derive(Clone)]
pub struct LinkContext {
    pub registry: Arc<LinkRegistry>,
    pub store: Arc<ConfigStore>,
}

impl LinkContext {
    pub fn new(registry: Arc<LinkRegistry>, store: Arc<ConfigStore>) -> Self {
        Self { registry, store }
    }

    pub fn backend(&self) -> &dyn LinkBackend {
        self.registry.backend().as_ref()
    }

    /// Current HA configuration, if HA is enabled
    pub async fn ha_config(&self) -> Result<Option<HaConfig>> {
        Ok(self.store.ha().await?.ha)
    }

    /// Re-read `name` from the kernel and persist it, together with
    /// `specific` when supplied.
    pub async fn persist(
        &self,
        name: &str,
        specific: Option<ConfigSpecificFields>,
        caller: &str,
    ) -> Result<Link> {
        let link = self.registry.link(name).await?;
        let members = self.registry.attachments().await?.members_of(name);

        let mut record = InterfaceRecord::from_link(&link, members);
        record.specific = specific;
        self.store.upsert_interface(record, caller).await?;
        Ok(link)
    }

    /// Keep the change on success, undo it on failure.
    pub async fn settle<T>(&self, compensations: Compensations, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                compensations.commit();
                Ok(value)
            }
            Err(e) => {
                warn!(
                    "Rolling back {} kernel steps after error: {}",
                    compensations.len(),
                    e
                );
                let failed = compensations.run(self.backend()).await;
                if failed > 0 {
                    warn!("{} compensations failed", failed);
                }
                Err(e)
            }
        }
    }

    pub fn ensure_kind(name: &str, actual: LinkKind, expected: LinkKind) -> Result<()> {
        if actual != expected {
            return Err(NetworkError::Validation(ValidationError::WrongKind {
                name: name.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            }));
        }
        Ok(())
    }

    /// An HA-controlled link is off limits to the ordinary update path
    pub fn guard_ha(ha: Option<&HaConfig>, name: &str) -> Result<()> {
        if ha.map_or(false, |ha| ha.owns_link(name)) {
            info!("Refusing change to HA-owned link {}", name);
            return Err(NetworkError::Conflict(ConflictError::HaOwned {
                name: name.to_string(),
            }));
        }
        Ok(())
    }

    /// `address` may only be held by `link` itself
    pub fn ensure_address_free(snapshot: &KernelSnapshot, link: &str, address: &IpAddr) -> Result<()> {
        if let Some(owner) = snapshot
            .addresses
            .iter()
            .find(|a| &a.address == address && a.link != link)
        {
            return Err(NetworkError::Conflict(ConflictError::AddressInUse {
                address: address.to_string(),
                owner: owner.link.clone(),
            }));
        }
        Ok(())
    }
}
