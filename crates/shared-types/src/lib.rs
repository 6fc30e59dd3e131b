//! Appliance network data model: links, persisted interface records, HA and
//! routing documents.

pub mod error;
pub mod ha;
pub mod interfaces;
pub mod link;
pub mod routing;

pub use error::SharedTypeError;
pub use ha::{
    select_interface_ip, DeviceIdentity, HaConfig, HaDocument, HaMode, HaRole, HaState,
    KeepAliveTuning, MonitoredInterface,
};
pub use interfaces::{ConfigSpecificFields, InterfaceRecord, InterfacesDocument};
pub use link::{
    AddressProtocol, BondMode, IpAssignment, Link, LinkKind, LinkStats, MacAddr, OperState,
    SlaveState,
};
pub use routing::{
    BgpConfig, BgpNeighbor, OspfConfig, OspfNetwork, RouteKey, RoutingDocument, StaticRoute,
};
