//! Tuning for launch derivation, the simulated bottle and the judge.
//!
//! Every field has a default, so a JSON file only needs the values it changes.
//! Durations are stored as fractional seconds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlipConfig {
    pub judge: JudgeConfig,
    pub launch: LaunchConfig,
    pub body: BodyConfig,
}

impl FlipConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JudgeConfig {
    /// Maximum tilt from vertical still counted as upright
    pub upright_threshold_degrees: f32,
    /// Linear and angular speed below which the body counts as at rest
    pub stable_velocity_threshold: f32,
    pub stable_time_secs: f32,
    pub judge_timeout_secs: f32,
    pub success_reward: u32,
}

impl JudgeConfig {
    pub fn stable_time(&self) -> Duration {
        seconds(self.stable_time_secs)
    }

    pub fn judge_timeout(&self) -> Duration {
        seconds(self.judge_timeout_secs)
    }
}

/// Negative values clamp to zero, values too large for a `Duration` to `MAX`.
fn seconds(secs: f32) -> Duration {
    Duration::try_from_secs_f32(secs.max(0.0)).unwrap_or(Duration::MAX)
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            upright_threshold_degrees: 15.0,
            stable_velocity_threshold: 0.1,
            stable_time_secs: 0.5,
            judge_timeout_secs: 10.0,
            success_reward: 50,
        }
    }
}

/// Mapping from device acceleration to initial linear and angular velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchConfig {
    pub accel_to_vel_scale: f32,
    pub base_upward: f32,
    pub upward_multiplier: f32,
    pub horizontal_scale: f32,
    pub max_horizontal: f32,
    pub max_vertical: f32,
    pub base_rotation: f32,
    pub rotation_multiplier: f32,
    pub random_range: f32,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            accel_to_vel_scale: 1.5,
            base_upward: 3.0,
            upward_multiplier: 2.0,
            horizontal_scale: 0.5,
            max_horizontal: 3.0,
            max_vertical: 10.0,
            base_rotation: 6.0,
            rotation_multiplier: 3.0,
            random_range: 1.5,
        }
    }
}

/// Constants of the rigid-body integrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BodyConfig {
    pub gravity: f32,
    /// Fraction of linear velocity lost per second
    pub linear_drag: f32,
    /// Fraction of angular velocity lost per second
    pub angular_drag: f32,
    /// Bottom height below which the body counts as grounded
    pub contact_threshold: f32,
    pub restitution: f32,
    /// Impact speed below which the body stops bouncing
    pub rest_speed: f32,
    pub ground_friction: f32,
    pub ground_spin_damping: f32,
    /// Tilt beyond which a grounded bottle falls onto its side
    pub tip_angle_degrees: f32,
    /// Rate of the settling rotation toward upright or lying flat
    pub settle_gain: f32,
    /// Height of the bottom at launch
    pub spawn_height: f32,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            linear_drag: 0.5,
            angular_drag: 0.5,
            contact_threshold: 0.1,
            restitution: 0.2,
            rest_speed: 0.5,
            ground_friction: 8.0,
            ground_spin_damping: 10.0,
            tip_angle_degrees: 35.0,
            settle_gain: 8.0,
            spawn_height: 1.0,
        }
    }
}
