//! keepalived configuration synthesis
//!
//! One VRRP instance per monitored link, all advertised over the dedicated
//! HA link and tied together in a single sync group so the links fail over
//! as a unit.

use std::fmt::Write;

use appnet_types::{HaConfig, HaMode, HaRole, KeepAliveTuning, Link};

/// First virtual router id handed out; instances count up from here.
pub const BASE_VIRTUAL_ROUTER_ID: u8 = 51;

/// Instances that fit below the VRRP virtual router id ceiling of 255
pub const MAX_MONITORED_INTERFACES: usize = (u8::MAX - BASE_VIRTUAL_ROUTER_ID) as usize + 1;

pub const PRIMARY_PRIORITY: u8 = 150;
pub const BACKUP_PRIORITY: u8 = 100;

/// VRRP PASS authentication only looks at the first eight characters.
const AUTH_PASS_LEN: usize = 8;

const SYNC_GROUP: &str = "VG_appnet";

pub fn instance_name(link: &str) -> String {
    format!("VI_{}", link)
}

/// Render keepalived.conf for `ha`; an absent configuration renders empty.
///
/// `links` supplies each monitored link's current address, used when the
/// entry has no role specific address.
pub fn render_failover_config(ha: Option<&HaConfig>, links: &[Link]) -> String {
    let ha = match ha {
        Some(ha) => ha,
        None => return String::new(),
    };

    let mut monitored: Vec<_> = ha.monitored.iter().collect();
    monitored.sort_by(|a, b| a.link.cmp(&b.link));

    let mut out = String::new();
    out.push_str("# Generated by appnet. Changes will be overwritten.\n");
    out.push_str("global_defs {\n");
    let _ = writeln!(out, "    router_id appnet_{}", ha.role);
    out.push_str("    enable_script_security\n");
    out.push_str("}\n");

    if monitored.is_empty() {
        return out;
    }

    out.push('\n');
    let _ = writeln!(out, "vrrp_sync_group {} {{", SYNC_GROUP);
    out.push_str("    group {\n");
    for entry in &monitored {
        let _ = writeln!(out, "        {}", instance_name(&entry.link));
    }
    out.push_str("    }\n");
    out.push_str("}\n");

    let default_tuning = KeepAliveTuning::default();
    let tuning = ha.keepalive.as_ref().unwrap_or(&default_tuning);
    let (state, priority) = state_and_priority(ha.mode, ha.role);
    let auth_pass: String = ha.password.chars().take(AUTH_PASS_LEN).collect();

    for (idx, entry) in monitored.iter().enumerate() {
        let current = links
            .iter()
            .find(|l| l.name == entry.link)
            .and_then(|l| l.primary.as_ref());
        let address = ha.resolve_ip(&entry.link, current);

        out.push('\n');
        let _ = writeln!(out, "vrrp_instance {} {{", instance_name(&entry.link));
        let _ = writeln!(out, "    state {}", state);
        let _ = writeln!(out, "    interface {}", ha.ha_link);
        let _ = writeln!(
            out,
            "    virtual_router_id {}",
            BASE_VIRTUAL_ROUTER_ID as usize + idx
        );
        let _ = writeln!(out, "    priority {}", priority);
        let _ = writeln!(out, "    advert_int {}", tuning.advert_interval);
        if let Some(delay) = tuning.garp_master_delay {
            let _ = writeln!(out, "    garp_master_delay {}", delay);
        }
        if let Some(delay) = tuning.preempt_delay {
            let _ = writeln!(out, "    preempt_delay {}", delay);
        }
        out.push_str("    authentication {\n");
        out.push_str("        auth_type PASS\n");
        let _ = writeln!(out, "        auth_pass {}", auth_pass);
        out.push_str("    }\n");
        out.push_str("    unicast_peer {\n");
        let _ = writeln!(out, "        {}", ha.peer_ip);
        out.push_str("    }\n");
        out.push_str("    track_interface {\n");
        let _ = writeln!(out, "        {}", entry.link);
        out.push_str("    }\n");
        out.push_str("    virtual_ipaddress {\n");
        if let Some(address) = address {
            let _ = writeln!(
                out,
                "        {}/{} dev {} no_track",
                address.address, address.prefix_len, entry.link
            );
        }
        out.push_str("    }\n");
        out.push_str("}\n");
    }

    out
}

/// Active-active nodes each hold their own addresses, so both run as
/// master at equal priority.
fn state_and_priority(mode: HaMode, role: HaRole) -> (&'static str, u8) {
    match (mode, role) {
        (HaMode::ActiveActive, _) => ("MASTER", BACKUP_PRIORITY),
        (HaMode::ActiveBackup, HaRole::Primary) => ("MASTER", PRIMARY_PRIORITY),
        (HaMode::ActiveBackup, HaRole::Backup) => ("BACKUP", BACKUP_PRIORITY),
    }
}
