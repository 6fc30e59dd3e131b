//! MTU, hardware address and primary address changes

use log::debug;

use appnet_core::registry::KernelSnapshot;
use appnet_core::{AddressConfig, IpAssignment, Link, LinkBackend, LinkSettings, Result};

use crate::compensation::{Compensation, Compensations};
use crate::context::LinkContext;

/// Reject a static address that another link already holds
pub fn check_settings_against(snapshot: &KernelSnapshot, link: &str, settings: &LinkSettings) -> Result<()> {
    if let Some(AddressConfig::Static(address)) = &settings.address {
        LinkContext::ensure_address_free(snapshot, link, &address.address)?;
    }
    Ok(())
}

/// Apply every supplied setting to `current`, recording how to undo each step
pub async fn apply_link_settings(
    backend: &dyn LinkBackend,
    current: &Link,
    settings: &LinkSettings,
    compensations: &mut Compensations,
) -> Result<()> {
    let name = current.name.as_str();

    if let Some(mtu) = settings.mtu {
        if mtu != current.mtu {
            backend.set_mtu(name, mtu).await?;
            compensations.push(Compensation::SetMtu {
                link: name.to_string(),
                mtu: current.mtu,
            });
        }
    }

    if let Some(mac) = &settings.hw_address {
        if current.hw_address.as_ref() != Some(mac) {
            backend.set_hw_address(name, mac).await?;
            if let Some(previous) = &current.hw_address {
                compensations.push(Compensation::SetHwAddress {
                    link: name.to_string(),
                    mac: previous.clone(),
                });
            }
        }
    }

    if let Some(address) = &settings.address {
        replace_primary(backend, current, address, compensations).await?;
    }

    Ok(())
}

/// Swap the primary address: remove the old one, then bring up the new one.
/// The removal is recorded first so a failed add restores the previous address.
pub async fn replace_primary(
    backend: &dyn LinkBackend,
    current: &Link,
    requested: &AddressConfig,
    compensations: &mut Compensations,
) -> Result<()> {
    let name = current.name.as_str();

    let unchanged = match (requested, &current.primary) {
        (AddressConfig::Static(new), Some(old)) => !old.is_dhcp() && old.same_address(new),
        (AddressConfig::Dhcp, Some(old)) => old.is_dhcp(),
        _ => false,
    };
    if unchanged {
        debug!("{}: primary address unchanged", name);
        return Ok(());
    }

    release_primary(backend, name, current.primary.as_ref(), compensations).await?;

    match requested {
        AddressConfig::Static(new) => {
            backend.add_address(name, new).await?;
            compensations.push(Compensation::DeleteAddress {
                link: name.to_string(),
                address: new.clone(),
            });
        }
        AddressConfig::Dhcp => {
            backend.start_dhcp(name).await?;
            compensations.push(Compensation::StopDhcp(name.to_string()));
        }
    }
    Ok(())
}

async fn release_primary(
    backend: &dyn LinkBackend,
    name: &str,
    old: Option<&IpAssignment>,
    compensations: &mut Compensations,
) -> Result<()> {
    match old {
        Some(old) if old.is_dhcp() => {
            backend.stop_dhcp(name).await?;
            compensations.push(Compensation::StartDhcp(name.to_string()));
        }
        Some(old) => {
            backend.delete_address(name, old).await?;
            compensations.push(Compensation::AddAddress {
                link: name.to_string(),
                address: old.clone(),
            });
        }
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use appnet_core::{LinkFilter, LinkRegistry, MemoryBackend, PortNaming};
    use std::sync::Arc;

    async fn link(backend: &Arc<MemoryBackend>, name: &str) -> Link {
        LinkRegistry::new(backend.clone(), PortNaming::default())
            .list_links(&LinkFilter::name(name))
            .await
            .unwrap()
            .remove(0)
    }

    #[tokio::test]
    async fn test_failed_add_restores_previous_address() {
        let backend = Arc::new(MemoryBackend::with_ports(&["eth0"]));
        let old: IpAssignment = "10.0.0.5/24".parse().unwrap();
        backend.add_address("eth0", &old).await.unwrap();
        backend.fail_on("add_address", "eth0");

        let current = link(&backend, "eth0").await;
        let mut compensations = Compensations::new();
        let new: IpAssignment = "10.0.9.5/24".parse().unwrap();
        let result = replace_primary(
            backend.as_ref(),
            &current,
            &AddressConfig::Static(new),
            &mut compensations,
        )
        .await;
        assert!(result.is_err());
        assert!(backend.addresses_of("eth0").is_empty());

        backend.clear_failures();
        compensations.run(backend.as_ref()).await;
        assert_eq!(link(&backend, "eth0").await.primary, Some(old));
    }

    #[tokio::test]
    async fn test_switch_to_dhcp() {
        let backend = Arc::new(MemoryBackend::with_ports(&["eth0"]));
        backend.add_address("eth0", &"10.0.0.5/24".parse().unwrap()).await.unwrap();
        backend.set_dhcp_lease("eth0", "192.168.1.77/24".parse().unwrap());

        let current = link(&backend, "eth0").await;
        let mut compensations = Compensations::new();
        let settings = LinkSettings::new().with_dhcp().with_mtu(9000);
        apply_link_settings(backend.as_ref(), &current, &settings, &mut compensations)
            .await
            .unwrap();

        let updated = link(&backend, "eth0").await;
        assert_eq!(updated.mtu, 9000);
        let primary = updated.primary.unwrap();
        assert!(primary.is_dhcp());
        assert_eq!(primary.to_string(), "192.168.1.77/24");
        assert!(updated.secondaries.is_empty());
        assert_eq!(compensations.len(), 3);
    }

    #[tokio::test]
    async fn test_same_address_is_noop() {
        let backend = Arc::new(MemoryBackend::with_ports(&["eth0"]));
        let address: IpAssignment = "10.0.0.5/24".parse().unwrap();
        backend.add_address("eth0", &address).await.unwrap();
        let before = backend.operations().len();

        let current = link(&backend, "eth0").await;
        let mut compensations = Compensations::new();
        replace_primary(
            backend.as_ref(),
            &current,
            &AddressConfig::Static(address),
            &mut compensations,
        )
        .await
        .unwrap();
        assert_eq!(backend.operations().len(), before);
        assert!(compensations.is_empty());
    }
}
