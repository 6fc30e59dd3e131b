//! Core network types and data structures

use crate::error::{NetworkError, ValidationError};
use appnet_types::SharedTypeError;

pub use appnet_types::{
    AddressProtocol, BondMode, ConfigSpecificFields, HaConfig, HaMode, HaRole, InterfaceRecord,
    InterfacesDocument, IpAssignment, Link, LinkKind, LinkStats, MacAddr, MonitoredInterface,
    OperState, SlaveState,
};

impl From<SharedTypeError> for NetworkError {
    fn from(err: SharedTypeError) -> Self {
        match err {
            SharedTypeError::InvalidValue { field, value }
            | SharedTypeError::OutOfRange { field, value } => {
                NetworkError::Validation(ValidationError::InvalidValue {
                    field: field.to_string(),
                    value,
                })
            }
            SharedTypeError::Unsupported(value) => {
                NetworkError::Validation(ValidationError::InvalidValue {
                    field: "unsupported".to_string(),
                    value,
                })
            }
        }
    }
}

/// Kernel limit on interface names (IFNAMSIZ - 1)
pub const MAX_LINK_NAME_LEN: usize = 15;

/// Name prefixes for links this system creates
pub const VLAN_PREFIX: &str = "VLAN_";
pub const BRIDGE_PREFIX: &str = "BR_";
pub const BOND_PREFIX: &str = "BOND_";

/// Default pattern for physical front panel ports
pub const PHYSICAL_PORT_PATTERN: &str = r"^eth[0-9]+$";

pub const MIN_MTU: u32 = 68;
pub const MAX_MTU: u32 = 9216;

pub const MIN_BOND_SLAVES: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_error_maps_to_validation() {
        let err: NetworkError = SharedTypeError::OutOfRange {
            field: "prefix_len",
            value: "40".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            NetworkError::Validation(ValidationError::InvalidValue { .. })
        ));
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_prefixes_leave_room_for_suffix() {
        for prefix in [VLAN_PREFIX, BRIDGE_PREFIX, BOND_PREFIX] {
            assert!(prefix.len() < MAX_LINK_NAME_LEN);
        }
    }
}
