//! Appliance network CLI
//!
//! Operator tools for inspecting links and HA state, rendering the generated
//! daemon configuration and running boot-time restore or factory reset.

pub mod commands;

#[cfg(test)]
mod tests;
