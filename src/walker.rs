//! The articulated walker.
//!
//! A walker is four segments (torso, thigh, shin, foot) joined by three
//! motorised pivots. The thigh is the structural root: the torso ball hangs
//! above it and swings freely, the shin pivots below it and the foot pivots
//! below the shin, reaching forward from the heel.
//!
//! The motors are compliant, so gravity and contacts can bend an idle joint.
//! Each joint also carries a hard stop just outside its limiter range. The
//! foot's range is measured against the thigh, so its stop is a separate
//! angle-only constraint between thigh and foot.
//!
//! All of a walker's bodies, colliders and joints enter the world in
//! [`Walker::spawn`] and leave it together in [`Walker::despawn`].

use rapier2d::prelude::{ImpulseJointHandle, RigidBodyHandle};
use serde::Serialize;
use tracing::debug;

use crate::codec::{MotorCommand, PoseAngles, encode_sensors};
use crate::config::SimConfig;
use crate::controller::SENSOR_COUNT;
use crate::error::{Result, SimError};
use crate::limiter::{JointKind, LimiterFlags, relative_angle_deg};
use crate::world::{BodyPose, PhysicsWorld, SegmentShape, SegmentSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Finished,
    Fell,
    Stalled,
    TickLimit,
    ControllerFault,
}

impl TerminationReason {
    pub const ALL: [TerminationReason; 5] = [
        TerminationReason::Finished,
        TerminationReason::Fell,
        TerminationReason::Stalled,
        TerminationReason::TickLimit,
        TerminationReason::ControllerFault,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TerminationReason::Finished => "finished",
            TerminationReason::Fell => "fell",
            TerminationReason::Stalled => "stalled",
            TerminationReason::TickLimit => "tick_limit",
            TerminationReason::ControllerFault => "controller_fault",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkerState {
    Alive,
    Done(TerminationReason),
}

/// Tick counter, progress marker and fitness of one walker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vitals {
    pub time_alive: u32,
    pub distance: f32,
    pub fitness: f32,
}

impl Vitals {
    pub fn new(start_x: f32) -> Self {
        Self {
            time_alive: 0,
            distance: start_x,
            fitness: 0.0,
        }
    }

    /// Credits one survived tick at forward position `x`.
    pub fn accrue(&mut self, x: f32, config: &SimConfig) {
        self.time_alive += 1;
        self.fitness += config.survival_reward;
        if x > self.distance {
            self.fitness += config.progress_reward;
        }
        self.distance = x;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Segment {
    pub body: RigidBodyHandle,
    pub shape: SegmentShape,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartPose {
    pub shape: SegmentShape,
    pub pose: BodyPose,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkerFrame {
    pub id: usize,
    pub fitness: f32,
    pub flags: [bool; 3],
    pub parts: Vec<PartPose>,
}

#[derive(Debug)]
pub struct Walker {
    id: usize,
    torso: Segment,
    thigh: Segment,
    shin: Segment,
    foot: Segment,
    thigh_joint: ImpulseJointHandle,
    shin_joint: ImpulseJointHandle,
    foot_joint: ImpulseJointHandle,
    foot_stop: ImpulseJointHandle,
    flags: LimiterFlags,
    vitals: Vitals,
    state: WalkerState,
}

impl Walker {
    /// Builds the walker bottom-up from the floor so every child is placed
    /// relative to its parent's already-known position.
    pub fn spawn(world: &mut PhysicsWorld, id: usize, config: &SimConfig) -> Self {
        let column_x = config.spawn_x;
        let [foot_w, foot_h] = config.foot_size;
        let [shin_w, shin_h] = config.shin_size;
        let [thigh_w, thigh_h] = config.thigh_size;
        let radius = config.torso_radius;

        let foot_center = [
            column_x + foot_w * 0.5 - config.heel_inset,
            config.spawn_clearance + foot_h * 0.5,
        ];
        let ankle_y = foot_center[1] + foot_h * 0.5;
        let shin_center = [column_x, ankle_y + shin_h * 0.5];
        let knee_y = shin_center[1] + shin_h * 0.5;
        let thigh_center = [column_x, knee_y + thigh_h * 0.5];
        let hip_y = thigh_center[1] + thigh_h * 0.5;
        let torso_center = [column_x + config.torso_lean, hip_y + radius];

        let mut insert = |shape: SegmentShape, mass: f32, center: [f32; 2]| Segment {
            body: world.insert_segment(&SegmentSpec {
                shape,
                mass,
                friction: config.segment_friction,
                center,
                owner: id,
            }),
            shape,
        };
        let thigh = insert(
            SegmentShape::Box {
                size: [thigh_w, thigh_h],
            },
            config.segment_mass,
            thigh_center,
        );
        let torso = insert(SegmentShape::Ball { radius }, config.segment_mass, torso_center);
        let shin = insert(
            SegmentShape::Box {
                size: [shin_w, shin_h],
            },
            config.segment_mass,
            shin_center,
        );
        let foot = insert(
            SegmentShape::Box {
                size: [foot_w, foot_h],
            },
            config.foot_mass,
            foot_center,
        );

        let margin = config.joint_stop_margin_deg;
        let thigh_joint = world.insert_pivot(
            torso.body,
            thigh.body,
            [-config.torso_lean, -radius],
            [0.0, thigh_h * 0.5],
            Some(config.thigh_range.stops(margin)),
        );
        let shin_joint = world.insert_pivot(
            thigh.body,
            shin.body,
            [0.0, -thigh_h * 0.5],
            [0.0, shin_h * 0.5],
            Some(config.shin_range.stops(margin)),
        );
        let foot_joint = world.insert_pivot(
            shin.body,
            foot.body,
            [0.0, -shin_h * 0.5],
            [column_x - foot_center[0], foot_h * 0.5],
            None,
        );
        let foot_stop =
            world.insert_angle_stop(thigh.body, foot.body, config.foot_range.stops(margin));

        Self {
            id,
            torso,
            thigh,
            shin,
            foot,
            thigh_joint,
            shin_joint,
            foot_joint,
            foot_stop,
            flags: LimiterFlags::default(),
            vitals: Vitals::new(torso_center[0]),
            state: WalkerState::Alive,
        }
    }

    /// Removes every body, collider and joint of this walker from the world.
    /// Valid exactly once.
    pub fn despawn(&mut self, world: &mut PhysicsWorld, reason: TerminationReason) -> Result<()> {
        if !self.is_alive() {
            return Err(SimError::AlreadyDespawned(self.id));
        }
        self.state = WalkerState::Done(reason);

        let mut first_err = None;
        for segment in self.segments() {
            if let Err(err) = world.remove_body(segment.body) {
                first_err.get_or_insert(err);
            }
        }
        debug!(
            walker = self.id,
            reason = reason.label(),
            ticks = self.vitals.time_alive,
            fitness = self.vitals.fitness,
            "walker done"
        );
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WalkerState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state == WalkerState::Alive
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        match self.state {
            WalkerState::Alive => None,
            WalkerState::Done(reason) => Some(reason),
        }
    }

    pub fn vitals(&self) -> &Vitals {
        &self.vitals
    }

    pub fn fitness(&self) -> f32 {
        self.vitals.fitness
    }

    pub fn flags(&self) -> &LimiterFlags {
        &self.flags
    }

    pub fn segments(&self) -> [Segment; 4] {
        [self.torso, self.thigh, self.shin, self.foot]
    }

    /// The three motorised pivots.
    pub fn joints(&self) -> [ImpulseJointHandle; 3] {
        [self.thigh_joint, self.shin_joint, self.foot_joint]
    }

    /// Every joint this walker owns: the pivots plus the thigh/foot stop.
    pub fn constraints(&self) -> [ImpulseJointHandle; 4] {
        [
            self.thigh_joint,
            self.shin_joint,
            self.foot_joint,
            self.foot_stop,
        ]
    }

    pub fn joint_handle(&self, joint: JointKind) -> ImpulseJointHandle {
        match joint {
            JointKind::Thigh => self.thigh_joint,
            JointKind::Shin => self.shin_joint,
            JointKind::Foot => self.foot_joint,
        }
    }

    pub fn torso_pose(&self, world: &PhysicsWorld) -> Result<BodyPose> {
        world.body_pose(self.torso.body)
    }

    pub fn pose_angles(&self, world: &PhysicsWorld) -> Result<PoseAngles> {
        Ok(PoseAngles {
            torso: world.body_pose(self.torso.body)?.angle,
            thigh: world.body_pose(self.thigh.body)?.angle,
            shin: world.body_pose(self.shin.body)?.angle,
            foot: world.body_pose(self.foot.body)?.angle,
        })
    }

    /// Controller inputs for the current pose.
    pub fn sense(&self, world: &PhysicsWorld) -> Result<[f32; SENSOR_COUNT]> {
        Ok(encode_sensors(&self.pose_angles(world)?))
    }

    /// Joint angle in degrees against the limiter's reference segment:
    /// the torso for the thigh, the thigh for the shin and the foot.
    pub fn limiter_angle(&self, world: &PhysicsWorld, joint: JointKind) -> Result<f32> {
        let angles = self.pose_angles(world)?;
        Ok(match joint {
            JointKind::Thigh => relative_angle_deg(angles.thigh, angles.torso),
            JointKind::Shin => relative_angle_deg(angles.shin, angles.thigh),
            JointKind::Foot => relative_angle_deg(angles.foot, angles.thigh),
        })
    }

    pub fn motor_rate(&self, world: &PhysicsWorld, joint: JointKind) -> Result<f32> {
        world.motor_rate(self.joint_handle(joint))
    }

    /// Arms the given motors; commands are expected to be flag-gated already.
    ///
    /// A command the limiter would stop straight away (joint already at or
    /// past its limit in the commanded direction) is not armed either, so a
    /// joint held against its limit cannot creep on the ticks its flag is
    /// clear. Returns the number of motors armed.
    pub fn actuate(
        &self,
        world: &mut PhysicsWorld,
        commands: &[MotorCommand],
        config: &SimConfig,
    ) -> Result<usize> {
        let mut armed = 0;
        for command in commands {
            let angle = self.limiter_angle(world, command.joint)?;
            if command.joint.range(config).check(angle, command.rate).stop_motor {
                continue;
            }
            world.set_motor_rate(self.joint_handle(command.joint), command.rate)?;
            armed += 1;
        }
        Ok(armed)
    }

    /// Post-step limiter pass over all three joints.
    pub fn apply_limits(&mut self, world: &mut PhysicsWorld, config: &SimConfig) -> Result<()> {
        let angles = self.pose_angles(world)?;
        for joint in JointKind::ALL {
            let relative = match joint {
                JointKind::Thigh => relative_angle_deg(angles.thigh, angles.torso),
                JointKind::Shin => relative_angle_deg(angles.shin, angles.thigh),
                JointKind::Foot => relative_angle_deg(angles.foot, angles.thigh),
            };
            let handle = self.joint_handle(joint);
            let outcome = joint
                .range(config)
                .check(relative, world.motor_rate(handle)?);
            if outcome.stop_motor {
                world.set_motor_rate(handle, 0.0)?;
            }
            self.flags.set(joint, outcome.flagged);
        }
        Ok(())
    }

    pub fn reset_motors(&self, world: &mut PhysicsWorld) -> Result<()> {
        for handle in self.joints() {
            world.set_motor_rate(handle, 0.0)?;
        }
        Ok(())
    }

    pub(crate) fn accrue(&mut self, x: f32, config: &SimConfig) {
        self.vitals.accrue(x, config);
    }

    pub fn frame(&self, world: &PhysicsWorld) -> Result<WalkerFrame> {
        let mut parts = Vec::with_capacity(4);
        for segment in self.segments() {
            parts.push(PartPose {
                shape: segment.shape,
                pose: world.body_pose(segment.body)?,
            });
        }
        Ok(WalkerFrame {
            id: self.id,
            fitness: self.vitals.fitness,
            flags: [
                self.flags.get(JointKind::Thigh),
                self.flags.get(JointKind::Shin),
                self.flags.get(JointKind::Foot),
            ],
            parts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_adds_four_bodies_three_pivots_and_a_foot_stop() {
        let config = SimConfig::default();
        let mut world = PhysicsWorld::new(&config);
        let walker = Walker::spawn(&mut world, 0, &config);
        assert_eq!(world.body_count(), 5);
        assert_eq!(world.collider_count(), 5);
        assert_eq!(world.joint_count(), 4);
        assert!(walker.constraints().iter().all(|j| world.contains_joint(*j)));
        assert!(walker.is_alive());
        for joint in JointKind::ALL {
            assert_eq!(walker.motor_rate(&world, joint).unwrap(), 0.0);
        }
    }

    #[test]
    fn fresh_walker_senses_zero_angles() {
        let config = SimConfig::default();
        let mut world = PhysicsWorld::new(&config);
        let walker = Walker::spawn(&mut world, 0, &config);
        let sensed = walker.sense(&world).unwrap();
        for value in sensed {
            assert!(value.abs() < 1e-6, "expected zero signal, got {value}");
        }
        for joint in JointKind::ALL {
            assert!(walker.limiter_angle(&world, joint).unwrap().abs() < 1e-4);
        }
    }

    #[test]
    fn segments_are_stacked_above_the_floor() {
        let config = SimConfig::default();
        let mut world = PhysicsWorld::new(&config);
        let walker = Walker::spawn(&mut world, 0, &config);
        let heights: Vec<f32> = walker
            .segments()
            .iter()
            .map(|segment| world.body_pose(segment.body).unwrap().y)
            .collect();
        // torso, thigh, shin, foot
        assert!(heights[0] > heights[1]);
        assert!(heights[1] > heights[2]);
        assert!(heights[2] > heights[3]);
        assert!(heights[3] > 0.0);
        let torso = walker.torso_pose(&world).unwrap();
        assert!(torso.y > config.fall_height);
        assert!((walker.vitals().distance - torso.x).abs() < 1e-6);
    }

    #[test]
    fn despawn_removes_everything_exactly_once() {
        let config = SimConfig::default();
        let mut world = PhysicsWorld::new(&config);
        let mut keep = Walker::spawn(&mut world, 0, &config);
        let mut walker = Walker::spawn(&mut world, 1, &config);
        walker.despawn(&mut world, TerminationReason::Fell).unwrap();

        assert_eq!(walker.termination_reason(), Some(TerminationReason::Fell));
        for segment in walker.segments() {
            assert!(!world.contains_body(segment.body));
        }
        for joint in walker.constraints() {
            assert!(!world.contains_joint(joint));
        }
        assert_eq!(world.body_count(), 5);
        assert_eq!(world.joint_count(), 4);

        assert!(matches!(
            walker.despawn(&mut world, TerminationReason::Fell),
            Err(SimError::AlreadyDespawned(1))
        ));
        assert_eq!(world.body_count(), 5);
        keep.despawn(&mut world, TerminationReason::TickLimit).unwrap();
        assert_eq!(world.body_count(), 1);
        assert_eq!(world.joint_count(), 0);
    }

    #[test]
    fn vitals_reward_survival_and_strict_progress() {
        let config = SimConfig::default();
        let mut vitals = Vitals::new(1.0);
        vitals.accrue(1.1, &config);
        assert!((vitals.fitness - 0.2).abs() < 1e-6);
        vitals.accrue(1.1, &config);
        assert!((vitals.fitness - 0.3).abs() < 1e-6);
        vitals.accrue(0.5, &config);
        assert!((vitals.fitness - 0.4).abs() < 1e-6);
        assert_eq!(vitals.distance, 0.5);
        vitals.accrue(0.6, &config);
        assert!((vitals.fitness - 0.6).abs() < 1e-5);
        assert_eq!(vitals.time_alive, 4);
    }

    #[test]
    fn limiter_stops_motor_driven_past_its_range() {
        let config = SimConfig::default();
        let mut world = PhysicsWorld::new(&config);
        let mut walker = Walker::spawn(&mut world, 0, &config);
        // A shin already at 0 deg being driven further negative is at its
        // lower bound.
        world
            .set_motor_rate(walker.joint_handle(JointKind::Shin), -3.0)
            .unwrap();
        world
            .set_motor_rate(walker.joint_handle(JointKind::Thigh), 3.0)
            .unwrap();
        walker.apply_limits(&mut world, &config).unwrap();
        assert!(walker.flags().get(JointKind::Shin));
        assert_eq!(walker.motor_rate(&world, JointKind::Shin).unwrap(), 0.0);
        assert!(!walker.flags().get(JointKind::Thigh));
        assert_eq!(walker.motor_rate(&world, JointKind::Thigh).unwrap(), 3.0);

        walker.reset_motors(&mut world).unwrap();
        walker.apply_limits(&mut world, &config).unwrap();
        assert!(!walker.flags().any());
    }

    #[test]
    fn actuation_refuses_to_drive_further_into_a_limit() {
        let config = SimConfig::default();
        let mut world = PhysicsWorld::new(&config);
        let walker = Walker::spawn(&mut world, 0, &config);
        let commands = [
            MotorCommand {
                joint: JointKind::Shin,
                rate: -3.0,
            },
            MotorCommand {
                joint: JointKind::Thigh,
                rate: 3.0,
            },
        ];
        assert_eq!(walker.actuate(&mut world, &commands, &config).unwrap(), 1);
        assert_eq!(walker.motor_rate(&world, JointKind::Shin).unwrap(), 0.0);
        assert_eq!(walker.motor_rate(&world, JointKind::Thigh).unwrap(), 3.0);

        let away = [MotorCommand {
            joint: JointKind::Shin,
            rate: 3.0,
        }];
        assert_eq!(walker.actuate(&mut world, &away, &config).unwrap(), 1);
        assert_eq!(walker.motor_rate(&world, JointKind::Shin).unwrap(), 3.0);
    }
}
