//! Boot-time restore and factory reset

use std::fmt::Write;
use std::sync::Arc;

use anyhow::{bail, Result};

use appnet_api::AppContext;
use appnet_ha::{
    reset_to_factory_default_settings_for_interfaces, restore_interface_settings, RestoreReport,
};

use super::{to_json, OutputFormat};

const CALLER: &str = "appnetctl";

pub struct RestoreCommand {
    context: Arc<AppContext>,
}

impl RestoreCommand {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    pub async fn restore(&self, format: OutputFormat) -> Result<String> {
        let report = restore_interface_settings(&self.context.links, CALLER).await?;
        render_report(&report, format)
    }

    pub async fn factory_reset(&self, confirmed: bool, format: OutputFormat) -> Result<String> {
        if !confirmed {
            bail!("factory reset removes every composite link and the HA and routing configuration; pass --yes to proceed");
        }
        let report = reset_to_factory_default_settings_for_interfaces(
            &self.context.links,
            &self.context.daemons,
            &self.context.settings.factory,
            CALLER,
        )
        .await?;
        render_report(&report, format)
    }
}

pub fn render_report(report: &RestoreReport, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return to_json(report);
    }

    let mut out = String::new();
    for (label, names) in [
        ("Created", &report.created),
        ("Updated", &report.updated),
        ("Removed", &report.removed),
    ] {
        if !names.is_empty() {
            let _ = writeln!(out, "{}: {}", label, names.join(", "));
        }
    }
    for failure in &report.failed {
        let _ = writeln!(out, "Failed: {}: {}", failure.link, failure.message);
    }
    if out.is_empty() {
        out.push_str("Nothing to do\n");
    }
    Ok(out)
}
