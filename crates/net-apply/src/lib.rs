//! Appliance network apply layer
//!
//! Drives the kernel through a `LinkBackend`: composite link lifecycles,
//! physical port updates, undo on failure and delayed daemon restarts.

pub mod bond;
pub mod bridge;
pub mod compensation;
pub mod context;
pub mod iproute;
mod members;
pub mod physical;
pub mod services;
pub mod settings;
pub mod tasks;
pub mod vlan;


pub use bond::BondApplier;
pub use bridge::BridgeApplier;
pub use compensation::{Compensation, Compensations};
pub use context::LinkContext;
pub use iproute::IpCommandBackend;
pub use physical::{PhysicalApplier, PhysicalUpdate};
pub use services::{RecordingServices, ServiceControl, SystemdServices};
pub use tasks::{BackgroundTasks, TaskFailure};
pub use vlan::VlanApplier;
