//! Appliance network configuration store
//!
//! Locked, file-backed persistence of the interfaces, routing and HA
//! documents.

pub mod backup;
pub mod lock;
pub mod selector;
pub mod store;


pub use backup::{verify_backup, BackupFile, BackupManifest};
pub use lock::{DocumentLock, LockInfo, DEFAULT_LOCK_TIMEOUT};
pub use selector::{Keyed, Selector};
pub use store::{ConfigStore, HA_DOCUMENT, INTERFACES_DOCUMENT, ROUTING_DOCUMENT};
