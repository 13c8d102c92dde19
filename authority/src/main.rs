use authority::config::FlipConfig;
use authority::game::AuthorityGame;
use authority::network::{interval_from_secs, AuthorityClient, ClientConfig};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8081")]
    server: String,

    /// Simulation and judge ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// JSON file with launch, body and judge tuning
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for launch randomness
    #[arg(long)]
    seed: Option<u64>,

    /// Throw a randomized bottle every this many seconds without observers (0 disables)
    #[arg(long, default_value = "0")]
    auto_throw_secs: f32,

    #[arg(long, default_value = "30")]
    ping_secs: u64,

    /// Base reconnect delay; doubles on each further attempt
    #[arg(long, default_value = "3")]
    reconnect_secs: u64,

    #[arg(long, default_value = "5")]
    max_reconnects: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let flip_config = match &args.config {
        Some(path) => {
            info!("Loading tuning from {}", path.display());
            FlipConfig::load(path)?
        }
        None => FlipConfig::default(),
    };

    let client_config = ClientConfig {
        server_url: args.server,
        tick_rate: args.tick_rate,
        ping_interval: Duration::from_secs(args.ping_secs.max(1)),
        reconnect_interval: Duration::from_secs(args.reconnect_secs),
        max_reconnect_attempts: args.max_reconnects,
        auto_throw_interval: interval_from_secs(args.auto_throw_secs)
            .map_err(|e| format!("--auto-throw-secs: {}", e))?,
    };
    client_config.validate()?;

    info!("Starting authority...");
    info!("Relay: {}", client_config.server_url);
    if let Some(every) = client_config.auto_throw_interval {
        info!("Standalone throws every {:?}", every);
    }

    let game = AuthorityGame::new(flip_config, args.seed);
    let mut client = AuthorityClient::new(client_config, game);

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
