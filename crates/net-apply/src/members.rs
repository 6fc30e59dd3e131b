//! Attaching and detaching bridge ports and bond slaves

use log::debug;

use appnet_core::{LinkBackend, MembershipDiff, Result};

use crate::compensation::{Compensation, Compensations};

pub(crate) async fn attach(
    backend: &dyn LinkBackend,
    owner: &str,
    members: &[String],
    compensations: &mut Compensations,
) -> Result<()> {
    for member in members {
        debug!("Attaching {} to {}", member, owner);
        backend.set_master(member, owner).await?;
        compensations.push(Compensation::ClearMaster(member.clone()));
    }
    Ok(())
}

/// Detach `to_remove` first, then attach `to_add`
pub(crate) async fn apply_diff(
    backend: &dyn LinkBackend,
    owner: &str,
    diff: &MembershipDiff,
    compensations: &mut Compensations,
) -> Result<()> {
    for member in &diff.to_remove {
        debug!("Detaching {} from {}", member, owner);
        backend.clear_master(member).await?;
        compensations.push(Compensation::SetMaster {
            link: member.clone(),
            master: owner.to_string(),
        });
    }
    attach(backend, owner, &diff.to_add, compensations).await
}
