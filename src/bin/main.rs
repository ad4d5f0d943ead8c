//! mesh-dns-sync binary entry point.

use clap::Parser;
use mesh_dns_sync::config::DEFAULT_SECRETS_DIR;
use mesh_dns_sync::{telemetry, Config, Shutdown, SyncService};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Sync Tailscale/Headscale devices into a Cloudflare DNS zone.
#[derive(Parser, Debug)]
#[command(name = "mesh-dns-sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML). Missing files are ignored.
    #[arg(short, long, default_value = "mesh-dns-sync.toml")]
    config: PathBuf,

    /// Directory holding secret files named after legacy keys (cf-key, ts-key, ...).
    #[arg(long, default_value = DEFAULT_SECRETS_DIR)]
    secrets_dir: PathBuf,

    /// Run a single sync cycle and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(&args.config, &args.secrets_dir)?;

    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        mode = config.sync.mode.as_str(),
        domain = %config.cloudflare.domain,
        subdomain = config.cloudflare.subdomain().unwrap_or(""),
        interval_minutes = config.sync.interval_minutes(),
        "Starting mesh-dns-sync"
    );

    let service = SyncService::from_config(&config)?;

    let code = if args.once {
        match service.run_once().await {
            Ok(report) if report.is_clean() => ExitCode::SUCCESS,
            Ok(_) => {
                error!("sync cycle finished with failed mutations");
                ExitCode::FAILURE
            }
            Err(_) => ExitCode::FAILURE,
        }
    } else {
        let (shutdown, shutdown_worker) = Shutdown::new_signals();
        tokio::spawn(shutdown_worker);
        service.run(shutdown).await;
        ExitCode::SUCCESS
    };

    telemetry::shutdown();

    info!("mesh-dns-sync shutdown complete");
    Ok(code)
}
