//! Static simulation parameters.
//!
//! Every tunable number of the evaluation loop lives in [`SimConfig`]. The
//! defaults reproduce the reference walker: the original pixel geometry scaled
//! 1:100 into metres, a 50 Hz fixed step and the 0.1/0.1 fitness rule.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SimError};

pub const FIXED_SIM_DT: f32 = 1.0 / 50.0;
pub const GRAVITY: f32 = 9.81;
pub const SEGMENT_MASS: f32 = 5.0;
pub const FOOT_MASS: f32 = 30.0;
pub const SEGMENT_FRICTION: f32 = 0.5;
pub const FLOOR_FRICTION: f32 = 0.9;
pub const MOTOR_SPEED: f32 = 3.0;
pub const MOTOR_DAMPING: f32 = 8.0;
pub const MOTOR_MAX_TORQUE: f32 = 60.0;
pub const JOINT_STOP_MARGIN_DEG: f32 = 3.0;
pub const ACTIVATION_THRESHOLD: f32 = 0.9;
pub const SURVIVAL_REWARD: f32 = 0.1;
pub const PROGRESS_REWARD: f32 = 0.1;
pub const FLOOR_LEVEL_TICKS: u32 = 600;
pub const FLOOR_SPEED_STEP: f32 = 0.1;
pub const DEFAULT_MAX_TICKS: u32 = 6000;
pub const DEFAULT_SNAPSHOT_EVERY: u32 = 5;

const ENV_MAX_TICKS: &str = "WALKER_MAX_TICKS";
const ENV_WALKERS_COLLIDE: &str = "WALKER_WALKERS_COLLIDE";

/// Inclusive angular range of a joint, in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JointRange {
    pub min_deg: f32,
    pub max_deg: f32,
}

impl JointRange {
    pub const fn new(min_deg: f32, max_deg: f32) -> Self {
        Self { min_deg, max_deg }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimConfig {
    pub dt: f32,
    pub gravity: f32,

    pub spawn_x: f32,
    pub spawn_clearance: f32,
    pub torso_radius: f32,
    /// Horizontal offset of the torso centre ahead of the hip pivot.
    pub torso_lean: f32,
    pub thigh_size: [f32; 2],
    pub shin_size: [f32; 2],
    pub foot_size: [f32; 2],
    /// Distance from the foot's back edge to the ankle pivot.
    pub heel_inset: f32,
    pub segment_mass: f32,
    pub foot_mass: f32,
    pub segment_friction: f32,
    pub floor_friction: f32,

    pub thigh_range: JointRange,
    pub shin_range: JointRange,
    pub foot_range: JointRange,
    /// Hard joint stops sit this far outside each limiter range, in degrees.
    pub joint_stop_margin_deg: f32,

    pub motor_speed: f32,
    pub motor_damping: f32,
    pub motor_max_torque: f32,
    pub activation_threshold: f32,

    pub survival_reward: f32,
    pub progress_reward: f32,

    pub finish_x: f32,
    /// Torso height below which a walker counts as fallen. Standing height
    /// is about 1.2; a walker slumped against its joint stops sits below 0.9.
    pub fall_height: f32,
    pub stall_ticks: u32,
    pub stuck_min_x: f32,
    pub stuck_max_x: f32,

    pub floor_level_ticks: u32,
    pub floor_speed_step: f32,

    pub max_ticks: u32,
    pub walkers_collide: bool,
    pub snapshot_every: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: FIXED_SIM_DT,
            gravity: GRAVITY,
            spawn_x: 1.0,
            spawn_clearance: 0.01,
            torso_radius: 0.15,
            torso_lean: 0.05,
            thigh_size: [0.2, 0.4],
            shin_size: [0.1, 0.5],
            foot_size: [0.35, 0.15],
            heel_inset: 0.075,
            segment_mass: SEGMENT_MASS,
            foot_mass: FOOT_MASS,
            segment_friction: SEGMENT_FRICTION,
            floor_friction: FLOOR_FRICTION,
            thigh_range: JointRange::new(-70.0, 70.0),
            shin_range: JointRange::new(0.0, 90.0),
            foot_range: JointRange::new(-45.0, 30.0),
            joint_stop_margin_deg: JOINT_STOP_MARGIN_DEG,
            motor_speed: MOTOR_SPEED,
            motor_damping: MOTOR_DAMPING,
            motor_max_torque: MOTOR_MAX_TORQUE,
            activation_threshold: ACTIVATION_THRESHOLD,
            survival_reward: SURVIVAL_REWARD,
            progress_reward: PROGRESS_REWARD,
            finish_x: 8.0,
            fall_height: 0.9,
            stall_ticks: 500,
            stuck_min_x: 0.0,
            stuck_max_x: 2.0,
            floor_level_ticks: FLOOR_LEVEL_TICKS,
            floor_speed_step: FLOOR_SPEED_STEP,
            max_ticks: DEFAULT_MAX_TICKS,
            walkers_collide: false,
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
        }
    }
}

impl SimConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(max_ticks) = resolve_max_ticks_override() {
            config.max_ticks = max_ticks;
        }
        if let Some(collide) = resolve_walkers_collide_override() {
            config.walkers_collide = collide;
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "dt must be positive; got {}",
                self.dt
            )));
        }
        if self.max_ticks == 0 {
            return Err(SimError::InvalidConfig(
                "max_ticks must be at least 1".to_string(),
            ));
        }
        if self.floor_level_ticks == 0 {
            return Err(SimError::InvalidConfig(
                "floor_level_ticks must be at least 1".to_string(),
            ));
        }
        for (name, range) in [
            ("thigh", self.thigh_range),
            ("shin", self.shin_range),
            ("foot", self.foot_range),
        ] {
            if range.min_deg > range.max_deg {
                return Err(SimError::InvalidConfig(format!(
                    "{name} range is inverted: [{}, {}]",
                    range.min_deg, range.max_deg
                )));
            }
        }
        if !(self.joint_stop_margin_deg.is_finite() && self.joint_stop_margin_deg >= 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "joint_stop_margin_deg must be non-negative; got {}",
                self.joint_stop_margin_deg
            )));
        }
        if self.stuck_min_x > self.stuck_max_x {
            return Err(SimError::InvalidConfig(format!(
                "stuck band is inverted: [{}, {}]",
                self.stuck_min_x, self.stuck_max_x
            )));
        }
        let sizes = [
            self.torso_radius,
            self.thigh_size[0],
            self.thigh_size[1],
            self.shin_size[0],
            self.shin_size[1],
            self.foot_size[0],
            self.foot_size[1],
            self.segment_mass,
            self.foot_mass,
        ];
        if sizes.iter().any(|value| !(value.is_finite() && *value > 0.0)) {
            return Err(SimError::InvalidConfig(
                "segment sizes and masses must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_max_ticks_override() -> Option<u32> {
    let raw_value = std::env::var(ENV_MAX_TICKS).ok()?;
    match raw_value.parse::<u32>() {
        Ok(parsed) if parsed > 0 => Some(parsed),
        _ => {
            warn!("{ENV_MAX_TICKS} must be a positive integer; got '{raw_value}'");
            None
        }
    }
}

fn resolve_walkers_collide_override() -> Option<bool> {
    let raw_value = std::env::var(ENV_WALKERS_COLLIDE).ok()?;
    match raw_value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("{ENV_WALKERS_COLLIDE} must be a boolean; got '{raw_value}'");
            None
        }
    }
}
