//! Physics world binding.
//!
//! Thin ownership wrapper over the rapier2d pipeline and sets. The walker code
//! never touches rapier sets directly; it goes through the insert/remove,
//! pose and motor accessors below.

use rapier2d::na::{Vector2, point, vector};
use rapier2d::prelude::*;
use serde::Serialize;

use crate::config::SimConfig;
use crate::error::{Result, SimError};

pub const FLOOR_COLLISION_GROUP: Group = Group::GROUP_1;
pub const WALKER_COLLISION_GROUP: Group = Group::GROUP_2;
const FLOOR_HALF_WIDTH: f32 = 500.0;
const FLOOR_HALF_HEIGHT: f32 = 0.1;
/// Collider user data of the floor; walker parts carry `walker id + 1`.
const FLOOR_OWNER: u128 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentShape {
    Ball { radius: f32 },
    Box { size: [f32; 2] },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyPose {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

/// Everything needed to insert one walker segment.
pub struct SegmentSpec {
    pub shape: SegmentShape,
    pub mass: f32,
    pub friction: f32,
    pub center: [f32; 2],
    pub owner: usize,
}

/// Contact hooks: per-walker self-collision filtering and the floor conveyor.
struct WorldHooks {
    floor: ColliderHandle,
    surface_velocity: f32,
}

impl PhysicsHooks for WorldHooks {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let owner1 = context.colliders.get(context.collider1).map(|c| c.user_data);
        let owner2 = context.colliders.get(context.collider2).map(|c| c.user_data);
        match (owner1, owner2) {
            (Some(a), Some(b)) if a == b && a != FLOOR_OWNER => None,
            _ => Some(SolverFlags::COMPUTE_IMPULSES),
        }
    }

    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        let sign = if context.collider1 == self.floor {
            1.0
        } else if context.collider2 == self.floor {
            -1.0
        } else {
            return;
        };
        for contact in context.solver_contacts.iter_mut() {
            contact.tangent_velocity = Vector2::new(sign * self.surface_velocity, 0.0);
        }
    }
}

pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    floor_collider: ColliderHandle,
    surface_velocity: f32,
    motor_damping: f32,
    motor_max_torque: f32,
    walkers_collide: bool,
    steps: u64,
}

impl PhysicsWorld {
    pub fn new(config: &SimConfig) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.dt;

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        let floor_handle = bodies.insert(RigidBodyBuilder::fixed().build());
        let floor_collider = ColliderBuilder::cuboid(FLOOR_HALF_WIDTH, FLOOR_HALF_HEIGHT)
            .translation(vector![0.0, -FLOOR_HALF_HEIGHT])
            .friction(config.floor_friction)
            .restitution(0.0)
            .user_data(FLOOR_OWNER)
            .active_hooks(ActiveHooks::MODIFY_SOLVER_CONTACTS)
            .collision_groups(InteractionGroups::new(
                FLOOR_COLLISION_GROUP,
                WALKER_COLLISION_GROUP,
            ))
            .build();
        let floor_collider =
            colliders.insert_with_parent(floor_collider, floor_handle, &mut bodies);

        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![0.0, -config.gravity],
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            floor_collider,
            surface_velocity: 0.0,
            motor_damping: config.motor_damping,
            motor_max_torque: config.motor_max_torque,
            walkers_collide: config.walkers_collide,
            steps: 0,
        }
    }

    /// Advances the world by exactly one fixed timestep.
    pub fn step(&mut self) {
        let hooks = WorldHooks {
            floor: self.floor_collider,
            surface_velocity: self.surface_velocity,
        };
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &hooks,
            &(),
        );
        self.steps += 1;
    }

    pub fn dt(&self) -> f32 {
        self.integration_parameters.dt
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Tangential velocity imposed on everything touching the floor.
    /// Negative values drag walkers backwards.
    pub fn set_surface_velocity(&mut self, velocity: f32) {
        self.surface_velocity = velocity;
    }

    pub fn surface_velocity(&self) -> f32 {
        self.surface_velocity
    }

    pub fn insert_segment(&mut self, spec: &SegmentSpec) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![spec.center[0], spec.center[1]])
            .build();
        let handle = self.bodies.insert(body);

        let builder = match spec.shape {
            SegmentShape::Ball { radius } => ColliderBuilder::ball(radius),
            SegmentShape::Box { size } => ColliderBuilder::cuboid(size[0] * 0.5, size[1] * 0.5),
        };
        let (filter, hooks) = if self.walkers_collide {
            (
                FLOOR_COLLISION_GROUP | WALKER_COLLISION_GROUP,
                ActiveHooks::FILTER_CONTACT_PAIRS,
            )
        } else {
            (FLOOR_COLLISION_GROUP, ActiveHooks::empty())
        };
        let collider = builder
            .mass(spec.mass)
            .friction(spec.friction)
            .restitution(0.0)
            .user_data(spec.owner as u128 + 1)
            .active_hooks(hooks)
            .collision_groups(InteractionGroups::new(WALKER_COLLISION_GROUP, filter))
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Pivot joint with an idle angular-rate motor. Positive motor rates
    /// rotate `child` counter-clockwise relative to `parent`. `stops` are
    /// hard angular limits in radians on the same relative angle.
    pub fn insert_pivot(
        &mut self,
        parent: RigidBodyHandle,
        child: RigidBodyHandle,
        parent_anchor: [f32; 2],
        child_anchor: [f32; 2],
        stops: Option<[f32; 2]>,
    ) -> ImpulseJointHandle {
        let mut joint = RevoluteJointBuilder::new()
            .local_anchor1(point![parent_anchor[0], parent_anchor[1]])
            .local_anchor2(point![child_anchor[0], child_anchor[1]])
            .contacts_enabled(false);
        if let Some(stops) = stops {
            joint = joint.limits(stops);
        }
        let handle = self.impulse_joints.insert(parent, child, joint, true);
        if let Some(joint_ref) = self.impulse_joints.get_mut(handle, false) {
            joint_ref
                .data
                .set_motor_model(JointAxis::AngX, MotorModel::ForceBased);
            joint_ref
                .data
                .set_motor_velocity(JointAxis::AngX, 0.0, self.motor_damping);
            joint_ref
                .data
                .set_motor_max_force(JointAxis::AngX, self.motor_max_torque);
        }
        handle
    }

    /// Angle-only constraint keeping `child`'s rotation relative to
    /// `reference` within `stops` (radians). Positions stay unconstrained, so
    /// it can bound a pair of bodies that share no pivot.
    pub fn insert_angle_stop(
        &mut self,
        reference: RigidBodyHandle,
        child: RigidBodyHandle,
        stops: [f32; 2],
    ) -> ImpulseJointHandle {
        let joint = GenericJointBuilder::new(JointAxesMask::empty())
            .limits(JointAxis::AngX, stops)
            .contacts_enabled(false);
        self.impulse_joints.insert(reference, child, joint, true)
    }

    /// Removes a body together with its colliders and every joint attached to it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> Result<()> {
        self.bodies
            .remove(
                handle,
                &mut self.island_manager,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .map(|_| ())
            .ok_or_else(|| SimError::MissingBody(format!("{handle:?}")))
    }

    pub fn contains_body(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.get(handle).is_some()
    }

    pub fn contains_joint(&self, handle: ImpulseJointHandle) -> bool {
        self.impulse_joints.get(handle).is_some()
    }

    /// Number of rigid bodies, including the floor.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of colliders, including the floor.
    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    pub fn joint_count(&self) -> usize {
        self.impulse_joints.len()
    }

    pub fn body_pose(&self, handle: RigidBodyHandle) -> Result<BodyPose> {
        let body = self
            .bodies
            .get(handle)
            .ok_or_else(|| SimError::MissingBody(format!("{handle:?}")))?;
        let translation = body.translation();
        Ok(BodyPose {
            x: translation.x,
            y: translation.y,
            angle: body.rotation().angle(),
        })
    }

    pub fn body_linvel(&self, handle: RigidBodyHandle) -> Result<[f32; 2]> {
        let body = self
            .bodies
            .get(handle)
            .ok_or_else(|| SimError::MissingBody(format!("{handle:?}")))?;
        let linvel = body.linvel();
        Ok([linvel.x, linvel.y])
    }

    pub fn body_angvel(&self, handle: RigidBodyHandle) -> Result<f32> {
        self.bodies
            .get(handle)
            .map(|body| body.angvel())
            .ok_or_else(|| SimError::MissingBody(format!("{handle:?}")))
    }

    pub fn motor_rate(&self, handle: ImpulseJointHandle) -> Result<f32> {
        self.impulse_joints
            .get(handle)
            .map(|joint| joint.data.motors[JointAxis::AngX as usize].target_vel)
            .ok_or_else(|| SimError::MissingJoint(format!("{handle:?}")))
    }

    pub fn set_motor_rate(&mut self, handle: ImpulseJointHandle, rate: f32) -> Result<()> {
        let joint = self
            .impulse_joints
            .get_mut(handle, true)
            .ok_or_else(|| SimError::MissingJoint(format!("{handle:?}")))?;
        joint
            .data
            .set_motor_velocity(JointAxis::AngX, rate, self.motor_damping);
        joint
            .data
            .set_motor_max_force(JointAxis::AngX, self.motor_max_torque);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball_spec(owner: usize, x: f32, y: f32) -> SegmentSpec {
        SegmentSpec {
            shape: SegmentShape::Ball { radius: 0.1 },
            mass: 1.0,
            friction: 0.5,
            center: [x, y],
            owner,
        }
    }

    #[test]
    fn new_world_holds_only_the_floor() {
        let world = PhysicsWorld::new(&SimConfig::default());
        assert_eq!(world.body_count(), 1);
        assert_eq!(world.collider_count(), 1);
        assert_eq!(world.joint_count(), 0);
        assert_eq!(world.surface_velocity(), 0.0);
    }

    #[test]
    fn dropped_ball_lands_on_floor() {
        let mut world = PhysicsWorld::new(&SimConfig::default());
        let ball = world.insert_segment(&ball_spec(0, 0.0, 1.0));
        for _ in 0..200 {
            world.step();
        }
        let pose = world.body_pose(ball).unwrap();
        assert!(pose.y > 0.05 && pose.y < 0.2, "ball rests near y=0.1, got {}", pose.y);
        assert_eq!(world.steps(), 200);
    }

    #[test]
    fn motor_rate_round_trips_through_joint() {
        let mut world = PhysicsWorld::new(&SimConfig::default());
        let a = world.insert_segment(&ball_spec(0, 0.0, 1.0));
        let b = world.insert_segment(&ball_spec(0, 0.0, 0.8));
        let joint = world.insert_pivot(a, b, [0.0, -0.1], [0.0, 0.1], None);
        assert_eq!(world.motor_rate(joint).unwrap(), 0.0);
        world.set_motor_rate(joint, -3.0).unwrap();
        assert_eq!(world.motor_rate(joint).unwrap(), -3.0);
    }

    #[test]
    fn stops_hold_a_driven_pivot() {
        let mut world = PhysicsWorld::new(&SimConfig::default());
        let a = world.insert_segment(&ball_spec(0, 0.0, 10.0));
        let b = world.insert_segment(&ball_spec(0, 0.0, 9.8));
        let c = world.insert_segment(&ball_spec(0, 0.0, 9.6));
        let limited = world.insert_pivot(a, b, [0.0, -0.1], [0.0, 0.1], Some([-0.2, 0.2]));
        let free = world.insert_pivot(b, c, [0.0, -0.1], [0.0, 0.1], None);
        // b and c share a pivot with no limits; the stop alone bounds them.
        world.insert_angle_stop(b, c, [-0.3, 0.3]);
        assert_eq!(world.joint_count(), 3);

        for _ in 0..40 {
            world.set_motor_rate(limited, 3.0).unwrap();
            world.set_motor_rate(free, -3.0).unwrap();
            world.step();
            let [pa, pb, pc] = [a, b, c].map(|h| world.body_pose(h).unwrap().angle);
            assert!(pb - pa <= 0.2 + 0.05, "pivot stop exceeded: {}", pb - pa);
            assert!(pc - pb >= -0.3 - 0.05, "angle stop exceeded: {}", pc - pb);
        }
    }

    #[test]
    fn colliding_walkers_never_collide_with_themselves() {
        let config = SimConfig {
            walkers_collide: true,
            ..SimConfig::default()
        };
        let mut world = PhysicsWorld::new(&config);
        let own_a = world.insert_segment(&ball_spec(0, -2.0, 1.0));
        let own_b = world.insert_segment(&ball_spec(0, -1.9, 1.0));
        let other_a = world.insert_segment(&ball_spec(1, 2.0, 1.0));
        let other_b = world.insert_segment(&ball_spec(2, 2.1, 1.0));
        for _ in 0..5 {
            world.step();
        }
        let gap = |a, b| {
            let a = world.body_pose(a).unwrap();
            let b = world.body_pose(b).unwrap();
            (b.x - a.x).abs()
        };
        assert!((gap(own_a, own_b) - 0.1).abs() < 1e-4);
        assert!(gap(other_a, other_b) > 0.12);
    }

    #[test]
    fn removing_body_drops_its_joints_and_colliders() {
        let mut world = PhysicsWorld::new(&SimConfig::default());
        let a = world.insert_segment(&ball_spec(0, 0.0, 1.0));
        let b = world.insert_segment(&ball_spec(0, 0.0, 0.8));
        let joint = world.insert_pivot(a, b, [0.0, -0.1], [0.0, 0.1], None);
        world.remove_body(b).unwrap();
        assert!(!world.contains_body(b));
        assert!(!world.contains_joint(joint));
        assert_eq!(world.collider_count(), 2);
        assert!(matches!(world.remove_body(b), Err(SimError::MissingBody(_))));
        assert!(world.body_pose(b).is_err());
    }
}
