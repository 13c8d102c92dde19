//! Relay network layer: WebSocket accept, per-connection tasks and the main loop

use crate::router::Router;
use crate::session_registry::{Outbound, SessionId, SessionRegistry};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::GameStateSnapshot;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the main relay loop
#[derive(Debug)]
pub enum ServerMessage {
    /// Handshake finished. The loop answers with the new session id, or
    /// `None` when the relay is full.
    Connected {
        addr: SocketAddr,
        outbound: Outbound,
        reply: oneshot::Sender<Option<SessionId>>,
    },
    Received {
        session_id: SessionId,
        text: String,
    },
    Closed {
        session_id: SessionId,
    },
    /// Status request from the HTTP routes
    Status { reply: oneshot::Sender<RelayStatus> },
}

/// Point-in-time view of the relay served over HTTP.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayStatus {
    pub connections: usize,
    pub state: GameStateSnapshot,
}

/// Runtime settings for [`RelayServer`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: String,
    /// Address for the HTTP status routes. `None` serves no HTTP.
    pub http_addr: Option<String>,
    pub max_connections: usize,
    /// Sessions silent for longer than this are closed. `None` disables the sweep.
    pub idle_timeout: Option<Duration>,
    /// Period of the session statistics log line. `None` disables it.
    pub stats_interval: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", shared::DEFAULT_WS_PORT),
            http_addr: Some(format!("0.0.0.0:{}", shared::DEFAULT_HTTP_PORT)),
            max_connections: 256,
            idle_timeout: None,
            stats_interval: None,
        }
    }
}

/// Message relay between observers and authorities.
///
/// A single task owns the [`SessionRegistry`] and the [`Router`]; connection
/// tasks only forward frames to it, so handlers run strictly one at a time.
pub struct RelayServer {
    listener: TcpListener,
    http_listener: Option<TcpListener>,
    config: RelayConfig,
    registry: SessionRegistry,
    router: Router,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl RelayServer {
    pub async fn bind(config: RelayConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Relay listening on {}", listener.local_addr()?);

        let http_listener = match &config.http_addr {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(RelayServer {
            listener,
            http_listener,
            config,
            registry: SessionRegistry::new(),
            router: Router::new(),
            server_tx,
            server_rx,
        })
    }

    /// Address actually bound, useful when the configured port was 0
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Address of the HTTP status routes, if they are enabled
    pub fn http_addr(&self) -> Option<std::io::Result<SocketAddr>> {
        self.http_listener.as_ref().map(TcpListener::local_addr)
    }

    /// Runs the relay until the process stops.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let RelayServer {
            listener,
            http_listener,
            config,
            mut registry,
            router,
            server_tx,
            mut server_rx,
        } = self;

        if let Some(http_listener) = http_listener {
            tokio::spawn(crate::http::serve(
                http_listener,
                server_tx.clone(),
                Instant::now(),
            ));
        }
        tokio::spawn(accept_loop(listener, server_tx));

        let mut sweep = interval(Duration::from_secs(1));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = interval(config.stats_interval.unwrap_or(Duration::from_secs(60)));
        stats.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Relay started (max {} connections, idle timeout {:?})",
            config.max_connections, config.idle_timeout
        );

        loop {
            tokio::select! {
                message = server_rx.recv() => {
                    match message {
                        Some(message) => {
                            handle_server_message(&mut registry, &router, &config, message);
                        }
                        None => {
                            info!("Relay shutting down");
                            break;
                        }
                    }
                },

                _ = sweep.tick(), if config.idle_timeout.is_some() => {
                    if let Some(timeout) = config.idle_timeout {
                        for session_id in registry.find_idle(timeout) {
                            warn!("Closing idle session {}", session_id);
                            registry.remove(&session_id);
                        }
                    }
                },

                _ = stats.tick(), if config.stats_interval.is_some() => {
                    let snapshot = registry.snapshot();
                    info!(
                        "{} sessions: {} observers, {} authorities, {} players",
                        registry.count(),
                        snapshot.observers,
                        snapshot.authorities,
                        snapshot.players.len()
                    );
                },
            }
        }

        Ok(())
    }
}

fn handle_server_message(
    registry: &mut SessionRegistry,
    router: &Router,
    config: &RelayConfig,
    message: ServerMessage,
) {
    match message {
        ServerMessage::Connected {
            addr,
            outbound,
            reply,
        } => {
            if registry.count() >= config.max_connections {
                warn!(
                    "Rejecting {}: relay full ({} connections)",
                    addr, config.max_connections
                );
                let _ = reply.send(None);
                return;
            }
            let session_id = registry.add(outbound);
            debug!("Session {} is {}", session_id, addr);
            if reply.send(Some(session_id.clone())).is_err() {
                // Connection task went away during the handshake
                registry.remove(&session_id);
            }
        }
        ServerMessage::Received { session_id, text } => {
            router.route_text(registry, &session_id, &text);
        }
        ServerMessage::Closed { session_id } => {
            registry.remove(&session_id);
        }
        ServerMessage::Status { reply } => {
            let _ = reply.send(RelayStatus {
                connections: registry.count(),
                state: registry.snapshot(),
            });
        }
    }
}

async fn accept_loop(listener: TcpListener, server_tx: mpsc::UnboundedSender<ServerMessage>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(stream, addr, server_tx.clone()));
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// Drives one connection: handshake, registration with the main loop, then
/// a writer task draining the outbound queue while this task reads frames.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (reply_tx, reply_rx) = oneshot::channel();
    let connected = ServerMessage::Connected {
        addr,
        outbound: outbound_tx,
        reply: reply_tx,
    };
    if server_tx.send(connected).is_err() {
        return;
    }

    let session_id = match reply_rx.await {
        Ok(Some(session_id)) => session_id,
        _ => {
            let _ = write.send(Message::Close(None)).await;
            return;
        }
    };

    // Ends when the registry drops the session's queue
    let writer_session = session_id.clone();
    tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text)).await {
                debug!("Send to {} failed: {}", writer_session, e);
                break;
            }
        }
        let _ = write.close().await;
    });

    while let Some(frame) = read.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Dropping non-UTF-8 binary frame from {}", session_id);
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Read from {} failed: {}", session_id, e);
                break;
            }
        };

        let received = ServerMessage::Received {
            session_id: session_id.clone(),
            text,
        };
        if server_tx.send(received).is_err() {
            break;
        }
    }

    let _ = server_tx.send(ServerMessage::Closed { session_id });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_registry::{Role, SessionUpdate};
    use serde_json::Value;
    use tokio::time::timeout;
    use tokio_test::assert_ok;
    use tokio_tungstenite::connect_async;

    async fn start(config: RelayConfig) -> String {
        let server = assert_ok!(RelayServer::bind(config).await);
        let addr = assert_ok!(server.local_addr());
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        format!("ws://{}", addr)
    }

    fn local_config() -> RelayConfig {
        RelayConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            http_addr: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8081");
        assert_eq!(config.http_addr.as_deref(), Some("0.0.0.0:8080"));
        assert_eq!(config.max_connections, 256);
        assert!(config.idle_timeout.is_none());
        assert!(config.stats_interval.is_none());
    }

    #[test]
    fn test_connected_over_capacity_is_rejected() {
        let mut registry = SessionRegistry::new();
        let router = Router::new();
        let config = RelayConfig {
            max_connections: 1,
            ..Default::default()
        };

        let mut replies = Vec::new();
        for port in [1000, 1001] {
            let (outbound, _rx) = mpsc::unbounded_channel();
            let (reply, reply_rx) = oneshot::channel();
            let message = ServerMessage::Connected {
                addr: SocketAddr::from(([127, 0, 0, 1], port)),
                outbound,
                reply,
            };
            handle_server_message(&mut registry, &router, &config, message);
            replies.push(reply_rx);
        }

        assert!(replies[0].try_recv().unwrap().is_some());
        assert!(replies[1].try_recv().unwrap().is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_closed_removes_session() {
        let mut registry = SessionRegistry::new();
        let router = Router::new();
        let config = RelayConfig::default();
        let (outbound, _rx) = mpsc::unbounded_channel();
        let session_id = registry.add(outbound);

        handle_server_message(
            &mut registry,
            &router,
            &config,
            ServerMessage::Closed {
                session_id: session_id.clone(),
            },
        );
        assert!(registry.is_empty());

        // A second close for the same id is harmless
        handle_server_message(
            &mut registry,
            &router,
            &config,
            ServerMessage::Closed { session_id },
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_status_counts_sessions() {
        let mut registry = SessionRegistry::new();
        let router = Router::new();
        let config = RelayConfig::default();
        let (outbound, _rx) = mpsc::unbounded_channel();
        let session_id = registry.add(outbound);
        registry.update(&session_id, SessionUpdate::role(Role::Observer));
        registry.update(&session_id, SessionUpdate::player("p1".into(), Some("Ann".into())));

        let (reply, mut reply_rx) = oneshot::channel();
        handle_server_message(&mut registry, &router, &config, ServerMessage::Status { reply });

        let status = reply_rx.try_recv().unwrap();
        assert_eq!(status.connections, 1);
        assert_eq!(status.state.observers, 1);
        assert_eq!(status.state.players[0].name, "Ann");
    }

    #[tokio::test]
    async fn test_ping_round_trip_over_websocket() {
        let url = start(local_config()).await;
        let (mut ws, _) = assert_ok!(connect_async(url.as_str()).await);

        ws.send(Message::Text(r#"{"type":"ping"}"#.to_string()))
            .await
            .unwrap();

        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let reply: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(reply["type"], "pong");
    }

    #[tokio::test]
    async fn test_binary_utf8_frames_are_routed() {
        let url = start(local_config()).await;
        let (mut ws, _) = assert_ok!(connect_async(url.as_str()).await);

        ws.send(Message::Binary(br#"{"type":"ping"}"#.to_vec()))
            .await
            .unwrap();

        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(frame.to_text().unwrap().contains("pong"));
    }

    #[tokio::test]
    async fn test_full_relay_closes_new_connections() {
        let url = start(RelayConfig {
            max_connections: 1,
            ..local_config()
        })
        .await;

        let (_first, _) = assert_ok!(connect_async(url.as_str()).await);
        // Let the main loop register the first session
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (mut second, _) = assert_ok!(connect_async(url.as_str()).await);

        let frame = timeout(Duration::from_secs(2), second.next()).await.unwrap();
        assert!(matches!(
            frame,
            None | Some(Ok(Message::Close(_))) | Some(Err(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_sessions_are_closed() {
        let url = start(RelayConfig {
            idle_timeout: Some(Duration::from_millis(100)),
            ..local_config()
        })
        .await;
        let (mut ws, _) = assert_ok!(connect_async(url.as_str()).await);

        let frame = timeout(Duration::from_secs(3), ws.next()).await.unwrap();
        assert!(matches!(
            frame,
            None | Some(Ok(Message::Close(_))) | Some(Err(_))
        ));
    }
}
