//! Joint creation and deletion on a hecs world.
//!
//! Every joint is an entity holding one constraint record and a
//! [`JointLink`]. Both coupled entities get an edge in their
//! [`ConstraintEdges`]. A handle is the joint entity tagged with its record
//! type, so a stale handle fails the hecs generation check instead of
//! aliasing a newer joint.

use std::fmt;
use std::marker::PhantomData;

use glam::Vec3;
use hecs::{Entity, World};

use super::constraints::{
    BallConstraint, ConeTwistConstraint, ConstraintKind, DistanceConstraint, FixedConstraint,
    HingeConstraint, SliderConstraint,
};
use crate::ecs::components::{ConstraintEdges, JointLink, Transform};
use crate::error::PhysicsError;

type Result<T> = std::result::Result<T, PhysicsError>;

mod sealed {
    pub trait Sealed {}
}

/// A constraint record that can live on a joint entity.
pub trait JointRecord: hecs::Component + sealed::Sealed {
    const KIND: ConstraintKind;
}

macro_rules! joint_record {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl JointRecord for $ty {
                const KIND: ConstraintKind = ConstraintKind::$kind;
            }
        )*
    };
}

joint_record! {
    DistanceConstraint => Distance,
    BallConstraint => Ball,
    FixedConstraint => Fixed,
    HingeConstraint => Hinge,
    ConeTwistConstraint => ConeTwist,
    SliderConstraint => Slider,
}

/// Typed handle to a joint entity.
pub struct ConstraintHandle<T> {
    entity: Entity,
    _record: PhantomData<fn() -> T>,
}

impl<T> ConstraintHandle<T> {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            _record: PhantomData,
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }
}

impl<T> Clone for ConstraintHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ConstraintHandle<T> {}

impl<T> PartialEq for ConstraintHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity
    }
}

impl<T> Eq for ConstraintHandle<T> {}

impl<T> fmt::Debug for ConstraintHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConstraintHandle").field(&self.entity).finish()
    }
}

/// World transform of `entity`. Entities without a `Transform` sit at the origin.
fn transform_of(world: &World, entity: Entity) -> Result<Transform> {
    let entity = world.entity(entity)?;
    Ok(entity.get::<&Transform>().map(|t| *t).unwrap_or_default())
}

fn add_edge(world: &mut World, body: Entity, joint: Entity, kind: ConstraintKind) -> Result<()> {
    if world.entity(body)?.has::<ConstraintEdges>() {
        world.get::<&mut ConstraintEdges>(body)?.push(joint, kind);
    } else {
        let mut edges = ConstraintEdges::default();
        edges.push(joint, kind);
        world.insert_one(body, edges)?;
    }
    Ok(())
}

/// Spawn a joint entity for `record` and link it into both bodies' edge lists.
pub fn add_constraint<T: JointRecord>(
    world: &mut World,
    entity_a: Entity,
    entity_b: Entity,
    record: T,
) -> Result<ConstraintHandle<T>> {
    if !world.contains(entity_a) || !world.contains(entity_b) {
        return Err(PhysicsError::NoSuchEntity);
    }
    let link = JointLink {
        entity_a,
        entity_b,
        kind: T::KIND,
    };
    let joint = world.spawn((record, link));
    add_edge(world, entity_a, joint, T::KIND)?;
    add_edge(world, entity_b, joint, T::KIND)?;
    tracing::trace!(?joint, kind = ?T::KIND, "added constraint");
    Ok(ConstraintHandle::new(joint))
}

pub fn add_distance_constraint_from_local_points(
    world: &mut World,
    entity_a: Entity,
    entity_b: Entity,
    local_anchor_a: Vec3,
    local_anchor_b: Vec3,
    global_length: f32,
) -> Result<ConstraintHandle<DistanceConstraint>> {
    let record = DistanceConstraint::from_local_points(local_anchor_a, local_anchor_b, global_length);
    add_constraint(world, entity_a, entity_b, record)
}

/// The rest length is the current distance between the anchors.
pub fn add_distance_constraint_from_global_points(
    world: &mut World,
    entity_a: Entity,
    entity_b: Entity,
    global_anchor_a: Vec3,
    global_anchor_b: Vec3,
) -> Result<ConstraintHandle<DistanceConstraint>> {
    let (a, b) = (transform_of(world, entity_a)?, transform_of(world, entity_b)?);
    let record = DistanceConstraint::from_global_points(&a, &b, global_anchor_a, global_anchor_b);
    add_constraint(world, entity_a, entity_b, record)
}

pub fn add_ball_constraint_from_local_points(
    world: &mut World,
    entity_a: Entity,
    entity_b: Entity,
    local_anchor_a: Vec3,
    local_anchor_b: Vec3,
) -> Result<ConstraintHandle<BallConstraint>> {
    let record = BallConstraint::from_local_points(local_anchor_a, local_anchor_b);
    add_constraint(world, entity_a, entity_b, record)
}

pub fn add_ball_constraint_from_global_points(
    world: &mut World,
    entity_a: Entity,
    entity_b: Entity,
    global_anchor: Vec3,
) -> Result<ConstraintHandle<BallConstraint>> {
    let (a, b) = (transform_of(world, entity_a)?, transform_of(world, entity_b)?);
    let record = BallConstraint::from_global_points(&a, &b, global_anchor);
    add_constraint(world, entity_a, entity_b, record)
}

/// Welds the bodies in their current relative orientation.
pub fn add_fixed_constraint_from_local_points(
    world: &mut World,
    entity_a: Entity,
    entity_b: Entity,
    local_anchor_a: Vec3,
    local_anchor_b: Vec3,
) -> Result<ConstraintHandle<FixedConstraint>> {
    let (a, b) = (transform_of(world, entity_a)?, transform_of(world, entity_b)?);
    let record = FixedConstraint {
        initial_inv_rotation_difference: b.rotation.conjugate() * a.rotation,
        ..FixedConstraint::from_local_points(local_anchor_a, local_anchor_b)
    };
    add_constraint(world, entity_a, entity_b, record)
}

pub fn add_fixed_constraint_from_global_points(
    world: &mut World,
    entity_a: Entity,
    entity_b: Entity,
    global_anchor: Vec3,
) -> Result<ConstraintHandle<FixedConstraint>> {
    let (a, b) = (transform_of(world, entity_a)?, transform_of(world, entity_b)?);
    let record = FixedConstraint::from_global_points(&a, &b, global_anchor);
    add_constraint(world, entity_a, entity_b, record)
}

/// Limits are in radians. Pass `min > 0` and `max < 0` for a free hinge.
pub fn add_hinge_constraint_from_global_points(
    world: &mut World,
    entity_a: Entity,
    entity_b: Entity,
    global_anchor: Vec3,
    global_hinge_axis: Vec3,
    min_limit: f32,
    max_limit: f32,
) -> Result<ConstraintHandle<HingeConstraint>> {
    let (a, b) = (transform_of(world, entity_a)?, transform_of(world, entity_b)?);
    let record = HingeConstraint::from_global_points(
        &a,
        &b,
        global_anchor,
        global_hinge_axis.normalize_or_zero(),
        min_limit,
        max_limit,
    );
    add_constraint(world, entity_a, entity_b, record)
}

/// `swing_limit` is the cone half-angle and `twist_limit` the twist range, both in radians.
/// A negative value disables that limit.
pub fn add_cone_twist_constraint_from_global_points(
    world: &mut World,
    entity_a: Entity,
    entity_b: Entity,
    global_anchor: Vec3,
    global_axis: Vec3,
    swing_limit: f32,
    twist_limit: f32,
) -> Result<ConstraintHandle<ConeTwistConstraint>> {
    let (a, b) = (transform_of(world, entity_a)?, transform_of(world, entity_b)?);
    let record = ConeTwistConstraint::from_global_points(
        &a,
        &b,
        global_anchor,
        global_axis.normalize_or_zero(),
        swing_limit,
        twist_limit,
    );
    add_constraint(world, entity_a, entity_b, record)
}

pub fn add_slider_constraint_from_global_points(
    world: &mut World,
    entity_a: Entity,
    entity_b: Entity,
    global_anchor: Vec3,
    global_axis: Vec3,
    min_limit: f32,
    max_limit: f32,
) -> Result<ConstraintHandle<SliderConstraint>> {
    let (a, b) = (transform_of(world, entity_a)?, transform_of(world, entity_b)?);
    let record = SliderConstraint::from_global_points(
        &a,
        &b,
        global_anchor,
        global_axis.normalize_or_zero(),
        min_limit,
        max_limit,
    );
    add_constraint(world, entity_a, entity_b, record)
}

/// Mutable access to a joint's record, for tuning motors and limits.
pub fn constraint_mut<T: JointRecord>(
    world: &World,
    handle: ConstraintHandle<T>,
) -> Result<hecs::RefMut<'_, T>> {
    Ok(world.get::<&mut T>(handle.entity)?)
}

fn unlink(world: &mut World, body: Entity, joint: Entity) {
    if let Ok(mut edges) = world.get::<&mut ConstraintEdges>(body) {
        edges.remove(joint);
    }
}

fn despawn_joint(world: &mut World, joint: Entity) -> Result<()> {
    let link = *world.get::<&JointLink>(joint)?;
    world.despawn(joint)?;
    // The other side may already be gone.
    unlink(world, link.entity_a, joint);
    unlink(world, link.entity_b, joint);
    Ok(())
}

/// Remove the joint and its edge on both bodies.
pub fn delete_constraint<T: JointRecord>(world: &mut World, handle: ConstraintHandle<T>) -> Result<()> {
    despawn_joint(world, handle.entity)
}

/// Remove every joint attached to `entity`.
pub fn delete_all_constraints_from_entity(world: &mut World, entity: Entity) -> Result<()> {
    let joints: Vec<Entity> = match world.entity(entity)?.get::<&ConstraintEdges>() {
        Some(edges) => edges.iter().map(|(joint, _)| joint).collect(),
        None => return Ok(()),
    };
    for joint in joints {
        despawn_joint(world, joint)?;
    }
    Ok(())
}

/// Remove every joint in the world.
pub fn delete_all_constraints(world: &mut World) {
    let joints: Vec<Entity> = world
        .query::<&JointLink>()
        .iter()
        .map(|(joint, _)| joint)
        .collect();
    let count = joints.len();
    for joint in joints {
        // Collected from a live query above, so every joint still exists.
        let despawned = world.despawn(joint);
        debug_assert!(despawned.is_ok(), "joint {joint:?} vanished before despawn");
    }
    for (_, edges) in world.query_mut::<&mut ConstraintEdges>() {
        *edges = ConstraintEdges::default();
    }
    tracing::trace!(count, "deleted all constraints");
}

/// Joints attached to `entity`, with their family.
pub fn constraints_of(world: &World, entity: Entity) -> Result<Vec<(Entity, ConstraintKind)>> {
    let entity = world.entity(entity)?;
    Ok(entity
        .get::<&ConstraintEdges>()
        .map(|edges| edges.iter().collect())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;
    use crate::ecs::components::RigidBody;

    fn spawn_body(world: &mut World, position: Vec3) -> Entity {
        world.spawn((Transform::from_position(position), RigidBody::sphere(1.0, 0.5)))
    }

    #[test]
    fn test_add_links_both_bodies() {
        let mut world = World::new();
        let a = spawn_body(&mut world, Vec3::ZERO);
        let b = spawn_body(&mut world, Vec3::X * 2.0);

        let handle =
            add_distance_constraint_from_global_points(&mut world, a, b, Vec3::ZERO, Vec3::X * 2.0).unwrap();
        assert_eq!(world.get::<&DistanceConstraint>(handle.entity()).unwrap().global_length, 2.0);
        assert_eq!(constraints_of(&world, a).unwrap(), vec![(handle.entity(), ConstraintKind::Distance)]);
        assert_eq!(constraints_of(&world, b).unwrap(), vec![(handle.entity(), ConstraintKind::Distance)]);

        let link = *world.get::<&JointLink>(handle.entity()).unwrap();
        assert_eq!(link.other(a), b);
        assert_eq!(link.kind, ConstraintKind::Distance);
    }

    #[test]
    fn test_global_anchor_is_stored_in_body_space() {
        let mut world = World::new();
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let a = world.spawn((Transform::from_position_rotation(Vec3::X, rotation), RigidBody::default()));
        let ground = world.spawn((Transform::identity(),));

        let handle = add_ball_constraint_from_global_points(&mut world, a, ground, Vec3::new(1.0, 0.0, 1.0)).unwrap();
        let ball = *world.get::<&BallConstraint>(handle.entity()).unwrap();
        approx::assert_relative_eq!(ball.local_anchor_a, Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-5);
        assert_eq!(ball.local_anchor_b, Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_constraint_mut_tunes_motor() {
        let mut world = World::new();
        let a = spawn_body(&mut world, Vec3::ZERO);
        let b = spawn_body(&mut world, Vec3::Y);
        let handle =
            add_hinge_constraint_from_global_points(&mut world, a, b, Vec3::Y * 0.5, Vec3::Z, 1.0, -1.0).unwrap();

        constraint_mut(&world, handle).unwrap().max_motor_torque = 5.0;
        assert_eq!(world.get::<&HingeConstraint>(handle.entity()).unwrap().max_motor_torque, 5.0);
    }

    #[test]
    fn test_delete_removes_edges() {
        let mut world = World::new();
        let a = spawn_body(&mut world, Vec3::ZERO);
        let b = spawn_body(&mut world, Vec3::X);
        let c = spawn_body(&mut world, Vec3::X * 2.0);
        let ab = add_ball_constraint_from_global_points(&mut world, a, b, Vec3::X * 0.5).unwrap();
        let bc = add_fixed_constraint_from_global_points(&mut world, b, c, Vec3::X * 1.5).unwrap();

        delete_constraint(&mut world, ab).unwrap();
        assert!(!world.contains(ab.entity()));
        assert!(constraints_of(&world, a).unwrap().is_empty());
        assert_eq!(constraints_of(&world, b).unwrap(), vec![(bc.entity(), ConstraintKind::Fixed)]);

        // A stale handle is caught by the generation check.
        assert!(matches!(delete_constraint(&mut world, ab), Err(PhysicsError::NoSuchEntity)));
        assert!(matches!(constraint_mut(&world, ab), Err(PhysicsError::NoSuchEntity)));
    }

    #[test]
    fn test_delete_all_from_entity() {
        let mut world = World::new();
        let hub = spawn_body(&mut world, Vec3::ZERO);
        let spokes: Vec<_> = (1..4).map(|i| spawn_body(&mut world, Vec3::X * i as f32)).collect();
        for &spoke in &spokes {
            add_slider_constraint_from_global_points(&mut world, hub, spoke, Vec3::ZERO, Vec3::X, -1.0, 1.0).unwrap();
        }
        let other = add_ball_constraint_from_local_points(&mut world, spokes[0], spokes[1], Vec3::ZERO, Vec3::ZERO)
            .unwrap();

        delete_all_constraints_from_entity(&mut world, hub).unwrap();
        assert!(constraints_of(&world, hub).unwrap().is_empty());
        assert_eq!(constraints_of(&world, spokes[2]).unwrap(), vec![]);
        assert_eq!(constraints_of(&world, spokes[0]).unwrap(), vec![(other.entity(), ConstraintKind::Ball)]);
        assert_eq!(world.query::<&JointLink>().iter().count(), 1);

        delete_all_constraints(&mut world);
        assert_eq!(world.query::<&JointLink>().iter().count(), 0);
        assert!(constraints_of(&world, spokes[1]).unwrap().is_empty());
    }

    #[test]
    fn test_delete_all_despawns_joints_and_keeps_bodies() {
        let mut world = World::new();
        let a = spawn_body(&mut world, Vec3::ZERO);
        let b = spawn_body(&mut world, Vec3::X);
        let gone = spawn_body(&mut world, Vec3::Y);
        let ab = add_hinge_constraint_from_global_points(&mut world, a, b, Vec3::X * 0.5, Vec3::Z, -0.5, 0.5).unwrap();
        let orphan = add_distance_constraint_from_local_points(&mut world, a, gone, Vec3::ZERO, Vec3::ZERO, 1.0).unwrap();
        // The joint outlives its despawned endpoint until it is deleted.
        world.despawn(gone).unwrap();

        delete_all_constraints(&mut world);
        assert!(!world.contains(ab.entity()));
        assert!(!world.contains(orphan.entity()));
        assert!(world.contains(a) && world.contains(b));
        assert!(constraints_of(&world, a).unwrap().is_empty());
        assert!(matches!(delete_constraint(&mut world, ab), Err(PhysicsError::NoSuchEntity)));

        // Deleting from an empty world is a no-op.
        delete_all_constraints(&mut world);
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn test_missing_entity() {
        let mut world = World::new();
        let a = spawn_body(&mut world, Vec3::ZERO);
        let gone = spawn_body(&mut world, Vec3::X);
        world.despawn(gone).unwrap();

        let result = add_cone_twist_constraint_from_global_points(&mut world, a, gone, Vec3::ZERO, Vec3::Y, 0.5, 0.2);
        assert!(matches!(result, Err(PhysicsError::NoSuchEntity)));
        assert!(constraints_of(&world, a).unwrap().is_empty());
        assert!(matches!(constraints_of(&world, gone), Err(PhysicsError::NoSuchEntity)));
    }
}
