//! # Bottle Flip Relay Library
//!
//! This library provides the relay that connects observer devices to the
//! authority process. The relay tracks who is connected, enforces which role
//! may send which message, and forwards payloads without interpreting gameplay.
//!
//! ## Core Responsibilities
//!
//! ### Session Tracking
//! Every WebSocket connection gets exactly one session, identified by a UUID.
//! A session starts unassigned and becomes an observer or an authority when it
//! registers. Observers may later bind a player identity with `auth`.
//!
//! ### Role-Scoped Routing
//! Throws, comments and skips travel from observers to authorities only.
//! Results travel from the authority to the throwing player privately and to
//! everyone as a reduced `flip_activity` event.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! One task owns the [`session_registry::SessionRegistry`] and the
//! [`router::Router`]. Connection tasks forward text frames to it through a
//! channel, so handlers never run concurrently and need no locks.
//!
//! ### Outbound Queues
//! Each session holds an unbounded queue drained by its own writer task.
//! Sending never blocks the loop; removing a session closes its queue.
//!
//! ## Module Organization
//!
//! ### Session Registry Module (`session_registry`)
//! - Session lifecycle and set-once identity rules
//! - State snapshots for authorities
//! - Broadcast primitives by session, role or player
//!
//! ### Router Module (`router`)
//! Decodes envelopes and dispatches them by type. Unknown types are dropped.
//!
//! ### Handlers Module (`handlers`)
//! One function per protocol message type.
//!
//! ### Network Module (`network`)
//! WebSocket accept, connection tasks, idle sweep and the main loop.
//!
//! ### HTTP Module (`http`)
//! `/api/health` and `/api/state`, answered by the main loop over a oneshot.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{RelayConfig, RelayServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig {
//!         bind_addr: "127.0.0.1:8081".to_string(),
//!         http_addr: Some("127.0.0.1:8080".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let server = RelayServer::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod handlers;
pub mod http;
pub mod network;
pub mod router;
pub mod session_registry;
