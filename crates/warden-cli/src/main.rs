//! BridgeWarden CLI - security gateway between coding agents and untrusted content

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use warden_core::{SourceDescriptor, Warden, WardenConfig};

#[derive(Parser)]
#[command(name = "bridgewarden")]
#[command(about = "BridgeWarden - inspection gateway for untrusted content")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the stdio JSON-RPC server
    Serve {
        /// Configuration file path (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate configuration and run the policy self-test
    Check {
        /// Configuration file path (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Scan one local file and print the GuardResult
    Scan {
        /// File to scan
        path: PathBuf,
        /// Profile override (strict, balanced, permissive)
        #[arg(short, long)]
        profile: Option<String>,
        /// Configuration file path (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Delete quarantine records older than the retention window
    Sweep {
        /// Retention window in days
        #[arg(long, default_value_t = 30)]
        max_age_days: u64,
        /// Configuration file path (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<WardenConfig> {
    match path {
        Some(path) => Ok(WardenConfig::load(path)?),
        None => Ok(WardenConfig::rooted_at(std::env::current_dir()?)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Responses own stdout; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Serve { config }) => {
            let config = load_config(config.as_ref())?;
            let warden = Arc::new(Warden::new(config)?);
            tracing::info!(policy_version = %warden.policy_version(), "bridgewarden serving on stdio");
            server::serve(warden).await
        }
        Some(Commands::Check { config }) => {
            let config = WardenConfig::load(&config)?;
            let warden = Warden::new(config)?;
            println!("config ok, policy version {}", warden.policy_version());
            Ok(())
        }
        Some(Commands::Scan {
            path,
            profile,
            config,
        }) => {
            let mut config = load_config(config.as_ref())?;
            if let Some(profile) = profile {
                config.profile = profile
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))?;
            }
            let warden = Warden::new(config)?;
            let bytes = std::fs::read(&path)?;
            let result = warden.scan_bytes(
                &bytes,
                SourceDescriptor::file(path.display().to_string(), "cli"),
            )?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Some(Commands::Sweep {
            max_age_days,
            config,
        }) => {
            let config = load_config(config.as_ref())?;
            let warden = Warden::new(config)?;
            let removed = warden.sweep_quarantine(max_age_days * 24 * 60 * 60 * 1000)?;
            println!("removed {removed} quarantine records");
            Ok(())
        }
        None => {
            println!("bridgewarden v{} - use --help for commands", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
