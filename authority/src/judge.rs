//! Single-flight judge turning one throw into a pass/fail verdict
//!
//! The judge never touches the simulation. Each tick it is handed a
//! [`BodySample`] and the current time, and it decides whether the throw has
//! landed upright, fallen over, or run out of time.

use crate::config::JudgeConfig;
use crate::physics::BodySample;
use log::{debug, info, warn};
use shared::{ThrowIntent, ThrowOutcome, Vec3};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgePhase {
    Idle,
    /// Throw accepted, bottle in the air
    Armed,
    /// Bottle on the ground, waiting for it to come to rest
    Resolving,
    /// Verdict produced, waiting to be cleared
    Resolved,
}

/// Returned by [`Judge::arm`] when a throw is already being judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmRejected {
    pub phase: JudgePhase,
    pub player_id: String,
}

impl fmt::Display for ArmRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "throw from {} rejected, judge is {:?}",
            self.player_id, self.phase
        )
    }
}

impl std::error::Error for ArmRejected {}

#[derive(Debug)]
pub struct Judge {
    config: JudgeConfig,
    phase: JudgePhase,
    active_throw: Option<ThrowIntent>,
    armed_at: Duration,
    stable_since: Option<Duration>,
}

impl Judge {
    pub fn new(config: JudgeConfig) -> Self {
        Self {
            config,
            phase: JudgePhase::Idle,
            active_throw: None,
            armed_at: Duration::ZERO,
            stable_since: None,
        }
    }

    pub fn phase(&self) -> JudgePhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == JudgePhase::Idle
    }

    pub fn active_throw(&self) -> Option<&ThrowIntent> {
        self.active_throw.as_ref()
    }

    /// Starts judging `intent`. Only accepted while idle; overlapping throws
    /// are rejected, never queued.
    pub fn arm(&mut self, intent: ThrowIntent, now: Duration) -> Result<(), ArmRejected> {
        if self.phase != JudgePhase::Idle {
            return Err(ArmRejected {
                phase: self.phase,
                player_id: intent.player_id,
            });
        }

        info!(
            "Judging throw from {} ({}), intensity {:.2}",
            intent.player_name, intent.player_id, intent.intensity
        );
        self.phase = JudgePhase::Armed;
        self.active_throw = Some(intent);
        self.armed_at = now;
        self.stable_since = None;
        Ok(())
    }

    /// Advances the state machine. Returns the verdict on the tick that
    /// resolves the throw.
    pub fn tick(&mut self, now: Duration, sample: &BodySample) -> Option<ThrowOutcome> {
        match self.phase {
            JudgePhase::Idle => return None,
            JudgePhase::Resolved => {
                self.finish();
                return None;
            }
            JudgePhase::Armed | JudgePhase::Resolving => {}
        }

        if now.saturating_sub(self.armed_at) >= self.config.judge_timeout() {
            warn!("Judge timed out after {:?}", self.config.judge_timeout());
            return self.resolve(false);
        }

        if !sample.grounded {
            if self.phase == JudgePhase::Resolving {
                debug!("Bottle left the ground, back to armed");
                self.phase = JudgePhase::Armed;
                self.stable_since = None;
            }
            return None;
        }
        if self.phase == JudgePhase::Armed {
            debug!("Bottle grounded, resolving");
            self.phase = JudgePhase::Resolving;
            self.stable_since = None;
        }

        let upright =
            sample.up.angle_degrees_to(&Vec3::UP) <= self.config.upright_threshold_degrees;
        let threshold = self.config.stable_velocity_threshold;
        let stable = sample.linear_velocity.magnitude() < threshold
            && sample.angular_velocity.magnitude() < threshold;

        match (stable, upright) {
            (true, true) => {
                let since = *self.stable_since.get_or_insert(now);
                if now.saturating_sub(since) >= self.config.stable_time() {
                    self.resolve(true)
                } else {
                    None
                }
            }
            (true, false) => self.resolve(false),
            _ => {
                self.stable_since = None;
                None
            }
        }
    }

    /// Clears a resolved throw so the next one can be armed.
    pub fn finish(&mut self) {
        if self.phase == JudgePhase::Resolved {
            self.phase = JudgePhase::Idle;
        }
    }

    fn resolve(&mut self, success: bool) -> Option<ThrowOutcome> {
        self.phase = JudgePhase::Resolved;
        self.stable_since = None;
        let intent = self.active_throw.take()?;

        let outcome = ThrowOutcome {
            player_id: intent.player_id,
            player_name: intent.player_name,
            success,
            coins_earned: if success { self.config.success_reward } else { 0 },
        };
        info!(
            "Throw from {}: {} ({} coins)",
            outcome.player_name,
            if success { "SUCCESS" } else { "FAIL" },
            outcome.coins_earned
        );
        Some(outcome)
    }
}
