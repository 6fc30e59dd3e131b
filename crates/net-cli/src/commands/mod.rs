//! CLI commands

pub mod ha;
pub mod links;
pub mod render;
pub mod restore;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

pub use ha::HaStatusCommand;
pub use links::{KindArg, LinksCommand};
pub use render::{RenderCommand, Target};
pub use restore::RestoreCommand;

/// Output format shared by every command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
