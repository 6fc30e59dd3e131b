//! Appliance network daemon

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

use appnet_api::{app, AppContext, AppSettings};

#[derive(Parser)]
#[command(name = "appnetd")]
#[command(about = "Appliance network management daemon")]
#[command(version)]
struct Args {
    /// Settings file (default: /etc/appnet/appnet.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Verbose output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut settings = AppSettings::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        settings.listen = listen;
    }
    let addr = settings.listen;

    let context = AppContext::bootstrap(settings).await?;
    let app = app(context);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("appnetd listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
