use crate::config::FlipConfig;
use crate::judge::{ArmRejected, Judge};
use crate::physics::{derive_launch, BottleBody};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    msg, CommentData, Envelope, PlayerData, RegisterSuccessData, SkipCommentData, ThrowData,
    ThrowIntent, Vec3,
};
use std::collections::HashMap;
use std::time::Duration;

/// Authority-side game state: the player roster, the judge and the simulated
/// bottle. Transport-free; the network client feeds it envelopes and ticks.
#[derive(Debug)]
pub struct AuthorityGame {
    config: FlipConfig,
    judge: Judge,
    body: BottleBody,
    /// playerId -> playerName
    roster: HashMap<String, String>,
    connection_id: Option<String>,
    rng: StdRng,
    now: Duration,
}

impl AuthorityGame {
    pub fn new(config: FlipConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            judge: Judge::new(config.judge.clone()),
            body: BottleBody::new(config.body.clone()),
            config,
            roster: HashMap::new(),
            connection_id: None,
            rng,
            now: Duration::ZERO,
        }
    }

    pub fn judge(&self) -> &Judge {
        &self.judge
    }

    pub fn body(&self) -> &BottleBody {
        &self.body
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn player_name(&self, player_id: &str) -> Option<&str> {
        self.roster.get(player_id).map(String::as_str)
    }

    /// Player ids currently known, sorted
    pub fn players(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.roster.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Applies one message from the relay.
    pub fn handle_envelope(&mut self, envelope: &Envelope) {
        match envelope.kind.as_str() {
            msg::REGISTER_SUCCESS => {
                let data: RegisterSuccessData = envelope.payload();
                info!("Registered with relay as {}", data.connection_id);
                self.connection_id = Some(data.connection_id);
                if let Some(state) = data.state {
                    self.roster = state
                        .players
                        .into_iter()
                        .map(|player| (player.id, player.name))
                        .collect();
                    info!(
                        "State sync: {} observers, {} authorities, {} players",
                        state.observers,
                        state.authorities,
                        self.roster.len()
                    );
                }
            }
            msg::PLAYER_JOINED => {
                let data: PlayerData = envelope.payload();
                let Some(player_id) = data.player_id else {
                    warn!("player_joined without a playerId");
                    return;
                };
                let name = data.player_name.unwrap_or_else(|| player_id.clone());
                info!("Player joined: {} ({})", name, player_id);
                if self.roster.insert(player_id.clone(), name).is_some() {
                    warn!("Player {} was already in the roster", player_id);
                }
            }
            msg::PLAYER_LEFT => {
                let data: PlayerData = envelope.payload();
                if let Some(player_id) = data.player_id {
                    match self.roster.remove(&player_id) {
                        Some(name) => info!("Player left: {} ({})", name, player_id),
                        None => debug!("Unknown player {} left", player_id),
                    }
                }
            }
            msg::THROW => {
                let intent = ThrowIntent::from(envelope.payload::<ThrowData>());
                if intent.player_id.is_empty() {
                    warn!("Dropping throw without a playerId");
                    return;
                }
                if let Err(e) = self.submit_throw(intent) {
                    warn!("Dropping throw: {}", e);
                }
            }
            msg::COMMENT => {
                let data: CommentData = envelope.payload();
                info!(
                    "Comment from {}: {}",
                    data.player_name.as_deref().unwrap_or("<unknown>"),
                    data.text.unwrap_or_default()
                );
            }
            msg::SKIP_COMMENT => {
                let data: SkipCommentData = envelope.payload();
                info!(
                    "Comment skipped by {}",
                    data.player_id.as_deref().unwrap_or("<unknown>")
                );
            }
            msg::PONG => debug!("pong"),
            msg::FLIP_ACTIVITY => debug!("flip_activity {:?}", envelope.data),
            other => warn!("Unknown message type: {}", other),
        }
    }

    /// Arms the judge and launches the bottle from the intent's acceleration.
    pub fn submit_throw(&mut self, intent: ThrowIntent) -> Result<(), ArmRejected> {
        let acceleration = intent.acceleration;
        self.judge.arm(intent, self.now)?;
        let launch = derive_launch(acceleration, &self.config.launch, &mut self.rng);
        debug!(
            "Launch velocity {:?}, spin {:?}",
            launch.velocity, launch.angular_velocity
        );
        self.body.launch(&launch);
        Ok(())
    }

    /// Launches a randomized throw without an observer.
    pub fn standalone_throw(&mut self) -> Result<(), ArmRejected> {
        let intensity = 5.0 + self.rng.gen_range(-2.0..2.0);
        let acceleration = Vec3::new(
            self.rng.gen_range(-1.0..1.0),
            intensity,
            self.rng.gen_range(-0.5..0.5),
        );
        self.submit_throw(ThrowIntent {
            player_id: "test".to_string(),
            player_name: "Standalone".to_string(),
            bottle_id: "B001".to_string(),
            acceleration,
            intensity,
        })
    }

    /// Advances the bottle by `dt` seconds and runs the judge at time `now`.
    /// Returns the `throw_result` to send when a throw resolves.
    pub fn tick(&mut self, now: Duration, dt: f32) -> Option<Envelope> {
        self.now = now;
        if self.judge.is_idle() {
            return None;
        }

        self.body.step(dt);
        let outcome = self.judge.tick(now, &self.body.sample())?;
        self.judge.finish();
        Some(outcome.to_envelope())
    }
}
