//! Links and physical port listings

use std::fmt::Write;
use std::sync::Arc;

use anyhow::Result;
use clap::ValueEnum;

use appnet_api::AppContext;
use appnet_core::{Link, LinkFilter, LinkKind};

use super::{to_json, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Physical,
    Vlan,
    Bridge,
    Bond,
}

impl From<KindArg> for LinkKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Physical => LinkKind::Physical,
            KindArg::Vlan => LinkKind::Vlan,
            KindArg::Bridge => LinkKind::Bridge,
            KindArg::Bond => LinkKind::Bond,
        }
    }
}

pub struct LinksCommand {
    context: Arc<AppContext>,
}

impl LinksCommand {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    pub async fn links(&self, kind: Option<KindArg>, format: OutputFormat) -> Result<String> {
        let filter = match kind {
            Some(kind) => LinkFilter::kind(kind.into()),
            None => LinkFilter::all(),
        };
        let links = self.context.links.registry.list_links(&filter).await?;

        match format {
            OutputFormat::Json => to_json(&links),
            OutputFormat::Text => Ok(links_table(&links)),
        }
    }

    pub async fn physical(&self, format: OutputFormat) -> Result<String> {
        let ports = self.context.physical.list().await?;
        if format == OutputFormat::Json {
            return to_json(&ports);
        }

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<10} {:<10} {:<8} {:<20} {:<16} {}",
            "Port", "Alias", "MTU", "Address", "Attached to", "Editable"
        );
        let _ = writeln!(out, "{}", "-".repeat(76));
        for port in &ports {
            let attached: Vec<&str> = port.attached_to.iter().map(|a| a.owner.as_str()).collect();
            let editable = if port.ha_owned {
                "no (HA)"
            } else if port.editable {
                "yes"
            } else if port.addresses_editable {
                "addresses"
            } else {
                "no"
            };
            let _ = writeln!(
                out,
                "{:<10} {:<10} {:<8} {:<20} {:<16} {}",
                port.link.name,
                port.link.alias.as_deref().unwrap_or("-"),
                port.link.mtu,
                address_of(&port.link),
                if attached.is_empty() {
                    "-".to_string()
                } else {
                    attached.join(",")
                },
                editable
            );
        }
        Ok(out)
    }
}

fn address_of(link: &Link) -> String {
    link.primary
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn links_table(links: &[Link]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<15} {:<9} {:<8} {:<20} {:<10} {}",
        "Interface", "Type", "MTU", "Address", "Master", "Aliases"
    );
    let _ = writeln!(out, "{}", "-".repeat(80));
    for link in links {
        let secondaries: Vec<String> = link.secondaries.iter().map(|a| a.to_string()).collect();
        let _ = writeln!(
            out,
            "{:<15} {:<9} {:<8} {:<20} {:<10} {}",
            link.name,
            link.kind.as_str(),
            link.mtu,
            address_of(link),
            link.master.as_deref().unwrap_or("-"),
            if secondaries.is_empty() {
                "-".to_string()
            } else {
                secondaries.join(" ")
            }
        );
    }
    out
}
