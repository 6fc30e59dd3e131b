//! Appliance high availability
//!
//! Enables, disables and syncs an HA pair, talks to the peer over HTTPS and
//! restores or resets interface configuration at the collaborator boundary.

pub mod coordinator;
pub mod envelope;
pub mod peer;
pub mod probe;
pub mod request;
pub mod restore;
pub mod validate;


pub use coordinator::{HaCoordinator, HaStatus, DEFAULT_REBOOT_DELAY};
pub use envelope::Envelope;
pub use peer::{HttpPeerClient, LastSync, Peer, PeerClient, PeerSettings, PEER_API_PREFIX};
pub use probe::{PingProbe, ReachabilityProbe};
pub use request::{HaAction, HaRequest, CREATE_HA, DISABLE_HA, SYNC_BACKUP};
pub use restore::{
    reset_to_factory_default_settings_for_interfaces, restore_interface_settings, FactoryDefaults,
    RestoreFailure, RestoreReport,
};
pub use validate::HaValidator;
