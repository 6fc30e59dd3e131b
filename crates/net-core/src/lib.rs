//! Appliance network core
//!
//! Error taxonomy, kernel access seam, live link registry and the structural
//! rules for VLANs, bridges and bonds.

pub mod backend;
pub mod bond;
pub mod bridge;
pub mod error;
pub mod interface;
pub mod membership;
pub mod memory;
pub mod registry;
pub mod types;
pub mod vlan;

pub use backend::{KernelAddress, KernelLink, LinkBackend, NewLink};
pub use error::{ConflictError, KernelError, NetworkError, ValidationError};
pub use interface::{AddressConfig, InterfaceValidator, LinkSettings};
pub use membership::{fetch_add_remove_from_list, MemberChange, MembershipDiff};
pub use memory::MemoryBackend;
pub use registry::{
    Attachment, AttachmentIndex, KernelSnapshot, LinkFilter, LinkRegistry, PhysicalInterface,
    PortNaming,
};
pub use types::*;

/// Result type for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;
