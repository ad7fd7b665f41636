use std::collections::HashMap;

use hecs::{Entity, World};

use super::arena::{FamilyBuffer, StepArena};
use super::body::{BodyIndex, ConstraintBodyPair, RigidBodyState};
use super::constraints::{
    BallConstraint, ConeTwistConstraint, DistanceConstraint, FixedConstraint, HingeConstraint,
    SliderConstraint,
};
use super::contact::ContactManifold;
use super::joints::JointRecord;
use super::rigid_body;
use super::solver::{ConstraintSolver, VelocitySolver};
use super::PhysicsConfig;
use crate::ecs::components::{JointLink, RigidBody, Transform};
use crate::error::PhysicsError;

/// Largest number of dynamic and kinematic bodies one step accepts. The next index is the dummy.
const MAX_BODIES: usize = BodyIndex::MAX as usize - 1;

/// The main physics world managing simulation state.
///
/// Owns the solver and the per-step buffers. The scene itself lives in a
/// `hecs::World` passed to every [`step`](Self::step).
#[derive(Debug)]
pub struct PhysicsWorld {
    config: PhysicsConfig,
    solver: ConstraintSolver,
    arena: StepArena,
    /// Body-table index of every entity in this step's table, including static joint endpoints.
    body_index: HashMap<Entity, BodyIndex>,
    /// Entities of the dynamic and kinematic bodies, in body-table order.
    body_entities: Vec<Entity>,
}

/// Body-table slot for a joint endpoint. Endpoints without a `RigidBody` but
/// with a `Transform` get an immovable slot at their pose, so anchors and
/// axes on them resolve in world space. Everything else is the dummy.
fn joint_endpoint(
    world: &World,
    body_index: &mut HashMap<Entity, BodyIndex>,
    bodies: &mut Vec<RigidBodyState>,
    dummy: BodyIndex,
    entity: Entity,
) -> BodyIndex {
    if let Some(&index) = body_index.get(&entity) {
        return index;
    }
    match world.get::<&Transform>(entity) {
        Ok(transform) if bodies.len() <= BodyIndex::MAX as usize => {
            let index = bodies.len() as BodyIndex;
            bodies.push(RigidBodyState::immovable(transform.position, transform.rotation));
            body_index.insert(entity, index);
            index
        }
        _ => dummy,
    }
}

fn gather_joints<T: JointRecord + Copy>(
    world: &World,
    body_index: &mut HashMap<Entity, BodyIndex>,
    bodies: &mut Vec<RigidBodyState>,
    dummy: BodyIndex,
    out: &mut FamilyBuffer<T>,
) {
    for (joint, (record, link)) in world.query::<(&T, &JointLink)>().iter() {
        let a = joint_endpoint(world, body_index, bodies, dummy, link.entity_a);
        let b = joint_endpoint(world, body_index, bodies, dummy, link.entity_b);
        if a == b {
            tracing::trace!(?joint, "skipping joint with both ends on the same body");
            continue;
        }
        out.push(*record, ConstraintBodyPair::new(a, b));
    }
}

impl PhysicsWorld {
    /// Create a physics world. Fails if `config` does not validate.
    pub fn new(config: PhysicsConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        Ok(Self {
            solver: ConstraintSolver::new(config.backend()),
            config,
            arena: StepArena::new(),
            body_index: HashMap::new(),
            body_entities: Vec::new(),
        })
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Replace the configuration. The old one stays in place if `config` does not validate.
    pub fn set_config(&mut self, config: PhysicsConfig) -> Result<(), PhysicsError> {
        config.validate()?;
        self.solver.set_backend(config.backend());
        self.config = config;
        Ok(())
    }

    /// Body table of the last step, dummy and static endpoint slots included.
    pub fn bodies(&self) -> &[RigidBodyState] {
        &self.arena.bodies
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// `contacts` are this step's narrow-phase results. Entities in a
    /// manifold without a `RigidBody` collide as the immovable world.
    pub fn step(&mut self, world: &mut World, contacts: &[ContactManifold], dt: f32) -> Result<(), PhysicsError> {
        if self.config.global_time_scale <= 0.0 {
            return Ok(());
        }
        let dt = dt.min(self.config.max_timestep) * self.config.global_time_scale;
        let _span = tracing::trace_span!("physics_step", dt).entered();

        self.arena.reset();
        self.body_index.clear();
        self.body_entities.clear();

        for (entity, (rb, transform)) in world.query::<(&RigidBody, &Transform)>().iter() {
            self.body_entities.push(entity);
            self.arena
                .bodies
                .push(rigid_body::integrate_forces(rb, transform, self.config.gravity, dt));
        }
        let count = self.body_entities.len();
        if count > MAX_BODIES {
            tracing::warn!(count, max = MAX_BODIES, "too many rigid bodies, skipping step");
            return Err(PhysicsError::TooManyBodies { count });
        }
        for (i, &entity) in self.body_entities.iter().enumerate() {
            self.body_index.insert(entity, i as BodyIndex);
        }

        let dummy = self.arena.push_dummy();
        self.gather_constraints(world, contacts, dummy);

        {
            let (input, bodies) = self.arena.split(dummy);
            tracing::trace!(
                bodies = count,
                distance = input.distance.len(),
                ball = input.ball.len(),
                fixed = input.fixed.len(),
                hinge = input.hinge.len(),
                cone_twist = input.cone_twist.len(),
                slider = input.slider.len(),
                contacts = input.contacts.len(),
                "gathered step input"
            );
            self.solver.initialize(bodies, &input, dt);
            self.solver.solve(bodies, self.config.solver_iterations);
        }

        let bodies = &mut self.arena.bodies[..count];
        for state in bodies.iter_mut() {
            rigid_body::integrate_velocities(state, dt);
        }
        for (entity, (rb, transform)) in world.query_mut::<(&mut RigidBody, &mut Transform)>() {
            if let Some(&index) = self.body_index.get(&entity) {
                rigid_body::write_back(&bodies[index as usize], rb, transform);
            }
        }
        Ok(())
    }

    fn gather_constraints(&mut self, world: &World, contacts: &[ContactManifold], dummy: BodyIndex) {
        let arena = &mut self.arena;
        let body_index = &mut self.body_index;
        let bodies = &mut arena.bodies;

        gather_joints::<DistanceConstraint>(world, body_index, bodies, dummy, &mut arena.distance);
        gather_joints::<BallConstraint>(world, body_index, bodies, dummy, &mut arena.ball);
        gather_joints::<FixedConstraint>(world, body_index, bodies, dummy, &mut arena.fixed);
        gather_joints::<HingeConstraint>(world, body_index, bodies, dummy, &mut arena.hinge);
        gather_joints::<ConeTwistConstraint>(world, body_index, bodies, dummy, &mut arena.cone_twist);
        gather_joints::<SliderConstraint>(world, body_index, bodies, dummy, &mut arena.slider);

        let slot = |entity: Entity| body_index.get(&entity).copied().unwrap_or(dummy);
        for manifold in contacts {
            let pair = ConstraintBodyPair::new(slot(manifold.entity_a), slot(manifold.entity_b));
            if pair.a == pair.b {
                continue;
            }
            for &contact in &manifold.contacts {
                arena.contacts.push(contact, pair);
            }
        }
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self {
            solver: ConstraintSolver::new(PhysicsConfig::default().backend()),
            config: PhysicsConfig::default(),
            arena: StepArena::new(),
            body_index: HashMap::new(),
            body_entities: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{Quat, Vec3};

    use super::*;
    use crate::physics::contact::CollisionContact;
    use crate::physics::joints;

    const DT: f32 = 1.0 / 60.0;

    fn undamped_sphere() -> RigidBody {
        let mut rb = RigidBody::sphere(1.0, 0.5);
        rb.linear_damping = 0.0;
        rb.angular_damping = 0.0;
        rb
    }

    fn zero_gravity(solver_iterations: u32, simd: bool) -> PhysicsWorld {
        PhysicsWorld::new(PhysicsConfig {
            gravity: Vec3::ZERO,
            solver_iterations,
            simd,
            ..Default::default()
        })
        .unwrap()
    }

    fn position(world: &World, entity: Entity) -> Vec3 {
        world.get::<&Transform>(entity).unwrap().position
    }

    fn momentum(world: &World, entities: &[Entity]) -> Vec3 {
        entities
            .iter()
            .map(|&e| {
                let rb = world.get::<&RigidBody>(e).unwrap();
                rb.linear_velocity / rb.inv_mass
            })
            .sum()
    }

    #[test]
    fn test_free_fall() {
        let mut world = World::new();
        let mut physics = PhysicsWorld::default();
        let entity = world.spawn((Transform::from_position(Vec3::new(0.0, 10.0, 0.0)), undamped_sphere()));

        for _ in 0..60 {
            physics.step(&mut world, &[], DT).unwrap();
        }

        // Semi-implicit Euler: y = y0 - g·dt²·n(n+1)/2.
        let expected = 10.0 - 9.81 * DT * DT * (60.0 * 61.0 / 2.0);
        assert_relative_eq!(position(&world, entity).y, expected, epsilon = 1e-3);
        assert_relative_eq!(world.get::<&RigidBody>(entity).unwrap().linear_velocity.y, -9.81, epsilon = 1e-3);
    }

    #[test]
    fn test_distance_joint_reaches_rest_length() {
        for simd in [false, true] {
            let mut world = World::new();
            let mut physics = zero_gravity(20, simd);
            let a = world.spawn((Transform::from_position(Vec3::ZERO), undamped_sphere()));
            let b = world.spawn((Transform::from_position(Vec3::X), undamped_sphere()));
            joints::add_distance_constraint_from_local_points(&mut world, a, b, Vec3::ZERO, Vec3::ZERO, 2.0).unwrap();

            // Positional drift decays by 1 - β per step.
            let mut last_error = f32::MAX;
            for step in 0..120 {
                physics.step(&mut world, &[], DT).unwrap();
                let error = (position(&world, b).distance(position(&world, a)) - 2.0).abs();
                if step >= 60 {
                    assert!(error <= last_error + 1e-6, "step {step}: error grew to {error}");
                }
                last_error = error;
            }
            assert!(last_error < 1e-3, "separation error {last_error}");
            // Internal impulses only: the pair never picks up net momentum.
            assert_relative_eq!(momentum(&world, &[a, b]), Vec3::ZERO, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_resting_contact_on_static_ground() {
        let mut world = World::new();
        let mut physics = PhysicsWorld::default();
        let ball = world.spawn((Transform::from_position(Vec3::new(0.0, 0.5, 0.0)), RigidBody::sphere(1.0, 0.5)));
        let ground = world.spawn((Transform::identity(),));

        for step in 0..120 {
            let y = position(&world, ball).y;
            // Normal points from the ball (A) into the ground (B).
            let manifold = ContactManifold {
                entity_a: ball,
                entity_b: ground,
                contacts: vec![CollisionContact::new(Vec3::ZERO, -Vec3::Y, 0.5 - y, 0.5, 0.0)],
            };
            physics.step(&mut world, &[manifold], DT).unwrap();

            let rb = world.get::<&RigidBody>(ball).unwrap();
            if step > 2 {
                assert!(rb.linear_velocity.y.abs() < 1e-4, "step {step}: v = {}", rb.linear_velocity);
            }
        }
        assert_relative_eq!(position(&world, ball).y, 0.5, epsilon = 1e-3);
        // The ground has no RigidBody and so never moves.
        assert_eq!(position(&world, ground), Vec3::ZERO);
    }

    #[test]
    fn test_pendulum_on_static_anchor() {
        let mut world = World::new();
        let mut physics = PhysicsWorld::default();
        let pivot = Vec3::new(0.0, 5.0, 0.0);
        let anchor = world.spawn((Transform::from_position(pivot),));
        let bob = world.spawn((Transform::from_position(Vec3::new(1.0, 5.0, 0.0)), RigidBody::sphere(1.0, 0.5)));
        joints::add_ball_constraint_from_global_points(&mut world, anchor, bob, pivot).unwrap();

        // Half a second brings the bob close to the bottom of its swing.
        for _ in 0..30 {
            physics.step(&mut world, &[], DT).unwrap();
        }

        let bob_transform = *world.get::<&Transform>(bob).unwrap();
        let anchor_on_bob = bob_transform.transform_position(Vec3::new(-1.0, 0.0, 0.0));
        assert!(anchor_on_bob.distance(pivot) < 0.1, "anchor drifted to {anchor_on_bob}");
        assert_relative_eq!(bob_transform.position.distance(pivot), 1.0, epsilon = 0.1);
        assert!(bob_transform.position.y < 4.5);
        // Static endpoint slot sits after the dummy.
        assert_eq!(physics.bodies().len(), 3);
        assert!(physics.bodies()[2].is_immovable());
        assert_eq!(physics.bodies()[2].position, pivot);
    }

    #[test]
    fn test_kinematic_body_drives_joint() {
        let mut world = World::new();
        let mut physics = zero_gravity(30, true);
        let driver = world.spawn((
            Transform::identity(),
            RigidBody::new_kinematic().with_velocity(Vec3::X, Vec3::ZERO),
        ));
        let follower = world.spawn((Transform::from_position(Vec3::Y), undamped_sphere()));
        joints::add_fixed_constraint_from_global_points(&mut world, driver, follower, Vec3::Y * 0.5).unwrap();

        for _ in 0..60 {
            physics.step(&mut world, &[], DT).unwrap();
        }

        assert_relative_eq!(position(&world, driver), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-4);
        let follower_velocity = world.get::<&RigidBody>(follower).unwrap().linear_velocity;
        assert_relative_eq!(follower_velocity, Vec3::X, epsilon = 1e-3);
    }

    #[test]
    fn test_paused_and_clamped_timestep() {
        let mut world = World::new();
        let entity = world.spawn((Transform::identity(), undamped_sphere()));

        let mut physics = PhysicsWorld::new(PhysicsConfig {
            global_time_scale: 0.0,
            ..Default::default()
        })
        .unwrap();
        physics.step(&mut world, &[], DT).unwrap();
        assert_eq!(world.get::<&RigidBody>(entity).unwrap().linear_velocity, Vec3::ZERO);

        physics
            .set_config(PhysicsConfig {
                global_time_scale: 0.5,
                ..Default::default()
            })
            .unwrap();
        // A one-second frame is clamped to 1/30 and then halved.
        physics.step(&mut world, &[], 1.0).unwrap();
        assert_relative_eq!(
            world.get::<&RigidBody>(entity).unwrap().linear_velocity.y,
            -9.81 / 60.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_set_config_rejects_invalid() {
        let mut physics = PhysicsWorld::default();
        let err = physics.set_config(PhysicsConfig {
            max_timestep: f32::NAN,
            ..Default::default()
        });
        assert!(matches!(err, Err(PhysicsError::InvalidConfig(_))));
        assert_eq!(physics.config(), &PhysicsConfig::default());
        assert!(PhysicsWorld::new(PhysicsConfig {
            solver_iterations: 0,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_forces_are_cleared_after_step() {
        let mut world = World::new();
        let mut physics = zero_gravity(4, false);
        let mut rb = undamped_sphere();
        rb.add_force(Vec3::X * 60.0);
        let entity = world.spawn((Transform::from_position_rotation(Vec3::ZERO, Quat::IDENTITY), rb));

        physics.step(&mut world, &[], DT).unwrap();
        physics.step(&mut world, &[], DT).unwrap();

        let rb = world.get::<&RigidBody>(entity).unwrap();
        assert_eq!(rb.force_accumulator, Vec3::ZERO);
        assert_relative_eq!(rb.linear_velocity.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_too_many_bodies() {
        let mut world = World::new();
        world.spawn_batch((0..=MAX_BODIES).map(|_| (Transform::identity(), RigidBody::new_kinematic())));
        let mut physics = PhysicsWorld::default();
        let err = physics.step(&mut world, &[], DT);
        assert!(matches!(err, Err(PhysicsError::TooManyBodies { count }) if count == MAX_BODIES + 1));
    }
}
