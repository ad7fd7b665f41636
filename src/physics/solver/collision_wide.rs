use wide::CmpLt;

use super::collision::{PENETRATION_BETA, PENETRATION_SLOP};
use super::{inv_dt_or_zero, slot_bodies, ConstraintSet, DT_THRESHOLD};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::contact::CollisionContact;
use crate::physics::scheduler::ConstraintSlot;
use crate::physics::wide::{
    gather_f32, inverse_or_zero, select, splat, BodyLanes, FloatW, SolverBodyW, Vec3W, SIMD_WIDTH,
};

#[derive(Debug, Clone, Copy)]
pub struct CollisionConstraintBatch {
    pub body_a: [BodyIndex; SIMD_WIDTH],
    pub body_b: [BodyIndex; SIMD_WIDTH],
    pub rel_global_anchor_a: Vec3W,
    pub rel_global_anchor_b: Vec3W,
    pub normal: Vec3W,
    pub tangent: Vec3W,
    pub friction: FloatW,
    pub effective_mass_in_normal_dir: FloatW,
    pub effective_mass_in_tangent_dir: FloatW,
    pub bias: FloatW,
    pub impulse_in_normal_dir: FloatW,
    pub impulse_in_tangent_dir: FloatW,
}

fn effective_mass_along_wide(a: &BodyLanes, b: &BodyLanes, r_a: Vec3W, r_b: Vec3W, d: Vec3W) -> FloatW {
    let ra_x_d = r_a.cross(d);
    let rb_x_d = r_b.cross(d);
    inverse_or_zero(
        a.inv_mass
            + ra_x_d.dot(a.inv_inertia.mul_vec3(ra_x_d))
            + b.inv_mass
            + rb_x_d.dot(b.inv_inertia.mul_vec3(rb_x_d)),
    )
}

pub fn initialize_collision_constraints_wide(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, CollisionContact>,
    slots: &[ConstraintSlot],
    dt: f32,
    out: &mut Vec<CollisionConstraintBatch>,
) {
    out.clear();
    out.reserve(slots.len());
    let zero = FloatW::ZERO;
    let slop = splat(-PENETRATION_SLOP);
    let beta = splat(PENETRATION_BETA);
    let inv_dt = splat(inv_dt_or_zero(dt));

    for slot in slots {
        let (body_a, body_b) = slot_bodies(set.pairs, slot);
        let contact = |i: usize| &set.constraints[slot.indices[i] as usize];

        let a = BodyLanes::gather(bodies, &body_a);
        let b = BodyLanes::gather(bodies, &body_b);
        let velocities_a = SolverBodyW::gather(bodies, &body_a);
        let velocities_b = SolverBodyW::gather(bodies, &body_b);

        let point = Vec3W::gather(|i| contact(i).point);
        let normal = Vec3W::gather(|i| contact(i).normal);
        let penetration_depth = gather_f32(|i| contact(i).penetration_depth);
        let friction = gather_f32(|i| contact(i).friction());
        let restitution = gather_f32(|i| contact(i).restitution());

        let rel_global_anchor_a = point - a.position;
        let rel_global_anchor_b = point - b.position;

        let rel_velocity =
            velocities_b.point_velocity(rel_global_anchor_b) - velocities_a.point_velocity(rel_global_anchor_a);
        let normal_velocity = normal.dot(rel_velocity);
        let tangent = (rel_velocity - normal * normal_velocity).noz();

        let bias = if dt > DT_THRESHOLD {
            let separation = -penetration_depth;
            let bounce = -(restitution * normal_velocity) - beta * (separation - slop) * inv_dt;
            select(separation.cmp_lt(slop) & normal_velocity.cmp_lt(zero), bounce, zero)
        } else {
            zero
        };

        out.push(CollisionConstraintBatch {
            body_a,
            body_b,
            rel_global_anchor_a,
            rel_global_anchor_b,
            normal,
            tangent,
            friction,
            effective_mass_in_normal_dir: effective_mass_along_wide(
                &a,
                &b,
                rel_global_anchor_a,
                rel_global_anchor_b,
                normal,
            ),
            effective_mass_in_tangent_dir: effective_mass_along_wide(
                &a,
                &b,
                rel_global_anchor_a,
                rel_global_anchor_b,
                tangent,
            ),
            bias,
            impulse_in_normal_dir: zero,
            impulse_in_tangent_dir: zero,
        });
    }
}

/// Contacts between two immovable bodies are not skipped here; their effective masses are zero.
pub fn solve_collision_constraints_wide(batches: &mut [CollisionConstraintBatch], bodies: &mut [RigidBodyState]) {
    let zero = FloatW::ZERO;
    for batch in batches.iter_mut() {
        let mut a = SolverBodyW::gather(bodies, &batch.body_a);
        let mut b = SolverBodyW::gather(bodies, &batch.body_b);

        // Friction.
        {
            let rel_velocity =
                b.point_velocity(batch.rel_global_anchor_b) - a.point_velocity(batch.rel_global_anchor_a);
            let vt = rel_velocity.dot(batch.tangent);
            let max_friction = batch.friction * batch.impulse_in_normal_dir;
            let old_impulse = batch.impulse_in_tangent_dir;
            batch.impulse_in_tangent_dir = (old_impulse - batch.effective_mass_in_tangent_dir * vt)
                .max(-max_friction)
                .min(max_friction);
            let p = batch.tangent * (batch.impulse_in_tangent_dir - old_impulse);
            a.apply_impulse(-p, batch.rel_global_anchor_a);
            b.apply_impulse(p, batch.rel_global_anchor_b);
        }

        // Normal.
        {
            let rel_velocity =
                b.point_velocity(batch.rel_global_anchor_b) - a.point_velocity(batch.rel_global_anchor_a);
            let vn = rel_velocity.dot(batch.normal);
            let old_impulse = batch.impulse_in_normal_dir;
            batch.impulse_in_normal_dir =
                (old_impulse - batch.effective_mass_in_normal_dir * (vn - batch.bias)).max(zero);
            let p = batch.normal * (batch.impulse_in_normal_dir - old_impulse);
            a.apply_impulse(-p, batch.rel_global_anchor_a);
            b.apply_impulse(p, batch.rel_global_anchor_b);
        }

        a.scatter(bodies, &batch.body_a);
        b.scatter(bodies, &batch.body_b);
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};
    use proptest::prelude::*;

    use super::*;
    use crate::physics::body::ConstraintBodyPair;
    use crate::physics::solver::test_util::*;
    use crate::physics::solver::ConstraintInput;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_matches_scalar(velocities in body_velocities()) {
            // Seven boxes on the ground, plus three stacked pairs touching each other.
            let mut bodies: Vec<_> = (0..7)
                .map(|i| {
                    let rotation = Quat::from_rotation_y(0.3 * i as f32);
                    tilted_body(Vec3::new(2.0 * i as f32, 0.5, 0.0), rotation, 1.0 + i as f32)
                })
                .collect();
            for k in 0..6 {
                bodies.push(tilted_body(Vec3::new(2.0 * k as f32, 3.0, 0.0), Quat::IDENTITY, 2.0));
            }
            let dummy = push_dummy(&mut bodies);
            set_velocities(&mut bodies, &velocities);

            let mut contacts = Vec::new();
            let mut pairs = Vec::new();
            for i in 0..7u16 {
                let x = 2.0 * i as f32;
                // Half of them list the world first, which flips the normal.
                let world_first = i % 2 == 1;
                let normal = if world_first { Vec3::Y } else { -Vec3::Y };
                contacts.push(CollisionContact::new(
                    Vec3::new(x + 0.1, 0.0, -0.1),
                    normal,
                    0.002 * i as f32,
                    0.1 * i as f32,
                    0.15 * i as f32,
                ));
                pairs.push(if world_first {
                    ConstraintBodyPair::new(dummy, i)
                } else {
                    ConstraintBodyPair::new(i, dummy)
                });
            }
            for k in 0..3u16 {
                let (i, j) = (7 + 2 * k, 8 + 2 * k);
                contacts.push(CollisionContact::new(
                    Vec3::new(4.0 * k as f32 + 1.0, 3.0, 0.0),
                    Vec3::X,
                    0.01,
                    0.6,
                    0.2,
                ));
                pairs.push(ConstraintBodyPair::new(i, j));
            }

            let input = ConstraintInput {
                contacts: ConstraintSet::new(&contacts, &pairs),
                dummy,
                ..Default::default()
            };
            assert_backends_agree(&bodies, &input, 1.0 / 60.0, 8);
        }
    }
}
