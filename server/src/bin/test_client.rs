//! Scripted observer: registers, authenticates, throws once and waits for the
//! authority's verdict.

use clap::Parser;
use env_logger::Env;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use serde_json::json;
use shared::{msg, Envelope, PlayerData, ThrowResultData};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay URL
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8081")]
    server: String,

    #[arg(long, default_value = "p1")]
    player_id: String,

    #[arg(long, default_value = "Ann")]
    player_name: String,

    /// Vertical acceleration of the throw
    #[arg(short, long, default_value = "5.0")]
    intensity: f32,

    /// Seconds to wait for the throw result
    #[arg(short, long, default_value = "15")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (ws, _) = connect_async(args.server.as_str()).await?;
    info!("Connected to {}", args.server);
    let (mut write, mut read) = ws.split();

    let script = [
        Envelope::new(msg::REGISTER, &json!({ "clientType": "web" })),
        Envelope::new(
            msg::AUTH,
            &PlayerData {
                player_id: Some(args.player_id.clone()),
                player_name: Some(args.player_name.clone()),
            },
        ),
        Envelope::new(
            msg::THROW,
            &json!({
                "bottleId": "B001",
                "intensity": args.intensity,
                "acceleration": { "x": 0.2, "y": args.intensity, "z": 0.1 },
            }),
        ),
    ];
    for envelope in &script {
        info!("Sending {}", envelope.kind);
        write.send(Message::Text(envelope.encode()?)).await?;
    }

    let deadline = Duration::from_secs(args.timeout_secs);
    let verdict = timeout(deadline, async {
        while let Some(frame) = read.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Connection error: {}", e);
                    break;
                }
            };
            let Ok(envelope) = Envelope::decode(&text) else {
                warn!("Undecodable frame: {}", text);
                continue;
            };
            info!("Received {}: {:?}", envelope.kind, envelope.data);
            if envelope.kind == msg::THROW_RESULT {
                return Some(envelope.payload::<ThrowResultData>());
            }
        }
        None
    })
    .await;

    match verdict {
        Ok(Some(result)) => info!(
            "Throw {}, earned {} coins",
            if result.success.unwrap_or(false) {
                "landed"
            } else {
                "failed"
            },
            result.coins_earned.unwrap_or(0)
        ),
        Ok(None) => warn!("Relay closed the connection before a result arrived"),
        Err(_) => warn!("No result within {}s; is an authority connected?", args.timeout_secs),
    }

    let _ = write.close().await;
    Ok(())
}
