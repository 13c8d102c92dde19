use clap::Parser;
use env_logger::Env;
use log::info;
use server::network::{RelayConfig, RelayServer};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// WebSocket port to listen on
    #[arg(short, long, env = "WS_PORT", default_value_t = shared::DEFAULT_WS_PORT)]
    port: u16,

    /// HTTP port for /api/health and /api/state
    #[arg(long, env = "HTTP_PORT", default_value_t = shared::DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Serve no HTTP status routes
    #[arg(long)]
    no_http: bool,

    /// Maximum simultaneous connections
    #[arg(long, default_value = "256")]
    max_connections: usize,

    /// Close sessions silent for this many seconds (0 disables)
    #[arg(long, default_value = "0")]
    idle_timeout_secs: u64,

    /// Log session statistics every this many seconds (0 disables)
    #[arg(long, default_value = "0")]
    stats_secs: u64,
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = RelayConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        http_addr: (!args.no_http).then(|| format!("{}:{}", args.host, args.http_port)),
        max_connections: args.max_connections,
        idle_timeout: seconds(args.idle_timeout_secs),
        stats_interval: seconds(args.stats_secs),
    };

    info!("Starting relay...");
    let server = RelayServer::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
