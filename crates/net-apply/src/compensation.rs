//! Undo list for multi-step kernel changes

use log::{debug, warn};

use appnet_core::{IpAssignment, LinkBackend, MacAddr};

/// One kernel step that reverses an earlier one
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    DeleteLink(String),
    ClearMaster(String),
    SetMaster { link: String, master: String },
    SetMtu { link: String, mtu: u32 },
    SetHwAddress { link: String, mac: MacAddr },
    AddAddress { link: String, address: IpAssignment },
    DeleteAddress { link: String, address: IpAssignment },
    StartDhcp(String),
    StopDhcp(String),
}

impl Compensation {
    async fn execute(&self, backend: &dyn LinkBackend) -> appnet_core::Result<()> {
        match self {
            Compensation::DeleteLink(link) => backend.delete_link(link).await,
            Compensation::ClearMaster(link) => backend.clear_master(link).await,
            Compensation::SetMaster { link, master } => backend.set_master(link, master).await,
            Compensation::SetMtu { link, mtu } => backend.set_mtu(link, *mtu).await,
            Compensation::SetHwAddress { link, mac } => backend.set_hw_address(link, mac).await,
            Compensation::AddAddress { link, address } => backend.add_address(link, address).await,
            Compensation::DeleteAddress { link, address } => {
                backend.delete_address(link, address).await
            }
            Compensation::StartDhcp(link) => backend.start_dhcp(link).await,
            Compensation::StopDhcp(link) => backend.stop_dhcp(link).await,
        }
    }
}

/// Compensations recorded while applying a change, run newest first
#[derive(Debug, Default)]
pub struct Compensations {
    actions: Vec<Compensation>,
}

impl Compensations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Compensation) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Forget everything once the change has fully landed
    pub fn commit(mut self) {
        self.actions.clear();
    }

    /// Undo in reverse order. Failures are logged and do not stop the run.
    pub async fn run(mut self, backend: &dyn LinkBackend) -> usize {
        let mut failed = 0;
        while let Some(action) = self.actions.pop() {
            debug!("Compensating: {:?}", action);
            if let Err(e) = action.execute(backend).await {
                warn!("Compensation {:?} failed: {}", action, e);
                failed += 1;
            }
        }
        failed
    }
}
