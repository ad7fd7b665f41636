//! Scene builders shared by the solver benchmarks.

use anyhow::Result;
use glam::{Quat, Vec3};
use hecs::{Entity, World};
use rein_physics::physics::joints;
use rein_physics::{
    BallConstraint, CollisionContact, ConstraintBodyPair, HingeConstraint,
    PhysicsConfig, PhysicsWorld, RigidBody, RigidBodyState, SliderConstraint, Transform,
};

/// Body table and parameter records for a solver-only benchmark.
pub struct SolverScene {
    pub bodies: Vec<RigidBodyState>,
    pub dummy: u16,
    pub ball: (Vec<BallConstraint>, Vec<ConstraintBodyPair>),
    pub hinge: (Vec<HingeConstraint>, Vec<ConstraintBodyPair>),
    pub slider: (Vec<SliderConstraint>, Vec<ConstraintBodyPair>),
    pub contacts: (Vec<CollisionContact>, Vec<ConstraintBodyPair>),
}

impl SolverScene {
    pub fn input(&self) -> rein_physics::ConstraintInput<'_> {
        rein_physics::ConstraintInput {
            ball: rein_physics::ConstraintSet::new(&self.ball.0, &self.ball.1),
            hinge: rein_physics::ConstraintSet::new(&self.hinge.0, &self.hinge.1),
            slider: rein_physics::ConstraintSet::new(&self.slider.0, &self.slider.1),
            contacts: rein_physics::ConstraintSet::new(&self.contacts.0, &self.contacts.1),
            dummy: self.dummy,
            ..Default::default()
        }
    }
}

fn body(position: Vec3, rotation: Quat, i: usize) -> RigidBodyState {
    let mut body = RigidBodyState::new(position, rotation, 1.0 + (i % 3) as f32, Vec3::new(0.2, 0.3, 0.4));
    body.linear_velocity = Vec3::new((i % 5) as f32 - 2.0, -1.0, (i % 7) as f32 * 0.1);
    body.angular_velocity = Vec3::new(0.1, (i % 4) as f32 * 0.2, -0.3);
    body
}

fn frame(body: &RigidBodyState) -> Transform {
    Transform::from_position_rotation(body.position, body.rotation)
}

/// `chains` parallel chains of `links` bodies, cycling ball, hinge and slider joints down each chain.
pub fn joint_chains(chains: usize, links: usize) -> SolverScene {
    let mut bodies = Vec::with_capacity(chains * links + 1);
    for c in 0..chains {
        for l in 0..links {
            let position = Vec3::new(c as f32 * 2.0, -(l as f32), 0.0);
            bodies.push(body(position, Quat::from_rotation_y(0.05 * l as f32), c * links + l));
        }
    }
    let dummy = bodies.len() as u16;
    bodies.push(RigidBodyState::DUMMY);

    let mut scene = SolverScene {
        bodies,
        dummy,
        ball: Default::default(),
        hinge: Default::default(),
        slider: Default::default(),
        contacts: Default::default(),
    };
    for c in 0..chains {
        for l in 1..links {
            let (a, b) = ((c * links + l - 1) as u16, (c * links + l) as u16);
            let (ta, tb) = (frame(&scene.bodies[a as usize]), frame(&scene.bodies[b as usize]));
            let anchor = (ta.position + tb.position) * 0.5;
            let pair = ConstraintBodyPair::new(a, b);
            match l % 3 {
                0 => {
                    scene.ball.0.push(BallConstraint::from_global_points(&ta, &tb, anchor));
                    scene.ball.1.push(pair);
                }
                1 => {
                    let hinge = HingeConstraint::from_global_points(&ta, &tb, anchor, Vec3::Z, -0.5, 0.5)
                        .with_velocity_motor(1.0, 0.5);
                    scene.hinge.0.push(hinge);
                    scene.hinge.1.push(pair);
                }
                _ => {
                    let slider = SliderConstraint::from_global_points(&ta, &tb, anchor, Vec3::Y, -0.2, 0.2);
                    scene.slider.0.push(slider);
                    scene.slider.1.push(pair);
                }
            }
        }
    }
    scene
}

/// `columns` stacks of `height` boxes resting on the world and on each other.
pub fn contact_stacks(columns: usize, height: usize) -> SolverScene {
    let mut bodies = Vec::with_capacity(columns * height + 1);
    for c in 0..columns {
        for h in 0..height {
            bodies.push(body(Vec3::new(c as f32 * 1.5, 0.5 + h as f32, 0.0), Quat::IDENTITY, c + h));
        }
    }
    let dummy = bodies.len() as u16;
    bodies.push(RigidBodyState::DUMMY);

    let mut contacts = (Vec::new(), Vec::new());
    for c in 0..columns {
        for h in 0..height {
            let index = (c * height + h) as u16;
            let below = if h == 0 { dummy } else { index - 1 };
            let base = Vec3::new(c as f32 * 1.5, h as f32, 0.0);
            // Four corners per face, normal from the upper box down into the lower one.
            for (dx, dz) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                contacts
                    .0
                    .push(CollisionContact::new(base + Vec3::new(dx, 0.0, dz), -Vec3::Y, 0.01, 0.5, 0.1));
                contacts.1.push(ConstraintBodyPair::new(index, below));
            }
        }
    }
    SolverScene {
        bodies,
        dummy,
        ball: Default::default(),
        hinge: Default::default(),
        slider: Default::default(),
        contacts,
    }
}

/// A hecs world with `count` pendulums, each ball-jointed to its own static pivot entity.
pub fn pendulum_world(count: usize, simd: bool) -> Result<(World, PhysicsWorld)> {
    let mut world = World::new();
    let physics = PhysicsWorld::new(PhysicsConfig {
        simd,
        solver_iterations: 10,
        ..Default::default()
    })?;
    for i in 0..count {
        let pivot = Vec3::new(i as f32, 10.0, 0.0);
        let ceiling: Entity = world.spawn((Transform::from_position(pivot),));
        let bob = world.spawn((
            Transform::from_position(pivot + Vec3::new(0.5, -1.0, 0.0)),
            RigidBody::sphere(1.0, 0.25),
        ));
        joints::add_ball_constraint_from_global_points(&mut world, ceiling, bob, pivot)?;
    }
    Ok((world, physics))
}
