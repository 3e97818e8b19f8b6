use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use otto_wheel_runtime::config::RobotConfig;

/// Otto wheel robot runtime, driven over zenoh
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON config with pin table, trim directory and servo limit
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding otto_trims.json (overrides the config file)
    #[arg(long)]
    trim_dir: Option<PathBuf>,

    /// Run without the hand servos
    #[arg(long)]
    no_hands: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => match RobotConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
        None => RobotConfig::default(),
    };
    if let Some(dir) = args.trim_dir {
        config.trim_dir = dir;
    }
    if args.no_hands {
        config.pins = config.pins.without_hands();
    }
    info!("Config: {:?}", config);

    if let Err(e) = otto_wheel_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
