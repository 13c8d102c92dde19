//! # Bottle Flip Authority Library
//!
//! This library provides the authority process: the single participant that
//! decides whether a thrown bottle landed. Observers only submit intents; the
//! authority simulates the flight, judges the landing and reports the verdict
//! back through the relay.
//!
//! ## Architecture Overview
//!
//! ### Launch Derivation
//! A throw carries the device acceleration. It is mapped to an initial
//! velocity and spin with clamped, tunable gains. The only randomness is a
//! small sideways tilt of the spin axis, drawn from a seedable generator.
//!
//! ### Simulation
//! The bottle is reduced to its bottom point and up axis. A fixed-rate
//! integrator applies gravity, drag, ground bounce and friction, and rotates
//! a grounded bottle toward standing or lying flat.
//!
//! ### Judging
//! The judge is single-flight: while a throw is being judged, further throws
//! are rejected rather than queued. A throw succeeds when the bottle rests
//! upright for long enough and fails when it rests on its side or times out.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Tuning for launch, body and judge, loadable from JSON with defaults.
//!
//! ### Physics Module (`physics`)
//! Launch derivation and the rigid-body integrator.
//!
//! ### Judge Module (`judge`)
//! The Idle/Armed/Resolving/Resolved state machine.
//!
//! ### Game Module (`game`)
//! Player roster, message handling and the tick step tying physics to the judge.
//!
//! ### Network Module (`network`)
//! WebSocket client with ping, tick loop and reconnect backoff.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use authority::config::FlipConfig;
//! use authority::game::AuthorityGame;
//! use authority::network::{AuthorityClient, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let game = AuthorityGame::new(FlipConfig::default(), None);
//!     let mut client = AuthorityClient::new(ClientConfig::default(), game);
//!
//!     client.run().await
//! }
//! ```

pub mod config;
pub mod game;
pub mod judge;
pub mod network;
pub mod physics;
