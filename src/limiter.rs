//! Per-joint angular range enforcement.
//!
//! The limiter never caches physics state between ticks. Each tick the walker
//! feeds it the freshly measured relative angle and the motor rate that was
//! in flight during the step; the outcome says whether to stop the motor and
//! whether to raise the joint's flag for the next tick's actuation.

use crate::config::{JointRange, SimConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JointKind {
    Thigh,
    Shin,
    Foot,
}

impl JointKind {
    pub const ALL: [JointKind; 3] = [JointKind::Thigh, JointKind::Shin, JointKind::Foot];

    pub fn index(self) -> usize {
        match self {
            JointKind::Thigh => 0,
            JointKind::Shin => 1,
            JointKind::Foot => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            JointKind::Thigh => "thigh",
            JointKind::Shin => "shin",
            JointKind::Foot => "foot",
        }
    }

    pub fn range(self, config: &SimConfig) -> JointRange {
        match self {
            JointKind::Thigh => config.thigh_range,
            JointKind::Shin => config.shin_range,
            JointKind::Foot => config.foot_range,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimitOutcome {
    /// Motor must be zeroed now.
    pub stop_motor: bool,
    /// Joint is at its limit in the direction it was driven.
    pub flagged: bool,
}

impl LimitOutcome {
    const FREE: LimitOutcome = LimitOutcome {
        stop_motor: false,
        flagged: false,
    };
    const AT_LIMIT: LimitOutcome = LimitOutcome {
        stop_motor: true,
        flagged: true,
    };
}

impl JointRange {
    /// One limiter pass for a single joint.
    pub fn check(&self, relative_angle_deg: f32, motor_rate: f32) -> LimitOutcome {
        if relative_angle_deg >= self.max_deg && motor_rate > 0.0 {
            LimitOutcome::AT_LIMIT
        } else if relative_angle_deg <= self.min_deg && motor_rate < 0.0 {
            LimitOutcome::AT_LIMIT
        } else {
            LimitOutcome::FREE
        }
    }

    /// Physical stop angles in radians, `margin_deg` outside the range on
    /// both sides.
    pub fn stops(&self, margin_deg: f32) -> [f32; 2] {
        [
            (self.min_deg - margin_deg).to_radians(),
            (self.max_deg + margin_deg).to_radians(),
        ]
    }
}

/// The three one-tick-delayed limiter flags of a walker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LimiterFlags([bool; 3]);

impl LimiterFlags {
    pub fn get(&self, joint: JointKind) -> bool {
        self.0[joint.index()]
    }

    pub fn set(&mut self, joint: JointKind, flagged: bool) {
        self.0[joint.index()] = flagged;
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|flag| *flag)
    }
}

/// Wraps an angle difference in degrees into (-180, 180].
pub fn wrap_degrees(angle: f32) -> f32 {
    let mut wrapped = angle % 360.0;
    if wrapped > 180.0 {
        wrapped -= 360.0;
    } else if wrapped <= -180.0 {
        wrapped += 360.0;
    }
    wrapped
}

/// Angle of `child` measured against `reference`, both in radians, as degrees.
pub fn relative_angle_deg(child: f32, reference: f32) -> f32 {
    wrap_degrees(child.to_degrees() - reference.to_degrees())
}
