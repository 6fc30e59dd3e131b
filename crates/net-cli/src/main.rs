//! Appliance network CLI (appnetctl)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use appnet_api::{AppContext, AppSettings};
use appnet_cli::commands::{
    HaStatusCommand, KindArg, LinksCommand, OutputFormat, RenderCommand, RestoreCommand, Target,
};

#[derive(Parser)]
#[command(name = "appnetctl")]
#[command(about = "Appliance network management CLI")]
#[command(version)]
#[command(long_about = "
Appliance network management CLI

Inspects live links and HA state, renders the generated keepalived and FRR
configuration and runs the boot-time restore or a factory reset.

Examples:
  appnetctl links                       # All links
  appnetctl links --kind bond           # Bonds only
  appnetctl physical -f json            # Physical ports as JSON
  appnetctl render failover             # Print keepalived.conf
  appnetctl render routing --write      # Write both files, restart daemons
  appnetctl restore                     # Reapply persisted interfaces
  appnetctl factory-reset --yes         # Back to factory defaults
  appnetctl ha-status
")]
struct Cli {
    /// Settings file (default: /etc/appnet/appnet.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List live links
    Links {
        /// Only links of this kind
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,
    },

    /// List physical ports with their attachments
    Physical,

    /// Render generated daemon configuration
    Render {
        #[arg(value_enum)]
        target: Target,

        /// Write both files and restart the daemons instead of printing
        #[arg(short, long)]
        write: bool,
    },

    /// Recreate persisted links and reapply their settings
    Restore,

    /// Remove every composite link and reset addresses to factory defaults
    FactoryReset {
        /// Confirm the reset
        #[arg(short, long)]
        yes: bool,
    },

    /// Show HA state
    HaStatus,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let result = run(&cli).await;

    match result {
        Ok(output) => {
            if !cli.quiet {
                print!("{}", output);
            }
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            if cli.verbose || cli.debug {
                for cause in e.chain().skip(1) {
                    eprintln!("  Caused by: {}", cause);
                }
            }
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<String> {
    let settings = AppSettings::load(cli.config.as_deref())?;
    let context = AppContext::bootstrap(settings).await?;
    let format = cli.format;

    match &cli.command {
        Commands::Links { kind } => LinksCommand::new(context).links(*kind, format).await,
        Commands::Physical => LinksCommand::new(context).physical(format).await,
        Commands::Render { target, write } => {
            let cmd = RenderCommand::new(context);
            if *write {
                cmd.write().await?;
                Ok(String::new())
            } else {
                cmd.render(*target).await
            }
        }
        Commands::Restore => RestoreCommand::new(context).restore(format).await,
        Commands::FactoryReset { yes } => {
            RestoreCommand::new(context).factory_reset(*yes, format).await
        }
        Commands::HaStatus => HaStatusCommand::new(context).execute(format).await,
    }
}
