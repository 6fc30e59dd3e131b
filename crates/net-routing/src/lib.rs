//! Appliance failover and routing daemon configuration
//!
//! Pure renderers for keepalived and FRR plus the manager that keeps the
//! routing document and the generated files in step.

pub mod daemon;
pub mod frr;
pub mod keepalived;
pub mod manager;

#[cfg(test)]
mod tests;

pub use daemon::{DaemonConfigs, DaemonSettings};
pub use frr::{render_routing_config, static_route_line};
pub use keepalived::{instance_name, render_failover_config, MAX_MONITORED_INTERFACES};
pub use manager::RoutingManager;
