use wide::CmpGt;

use super::distance::DEGENERATE_DISTANCE;
use super::{bias_scale, slot_bodies, ConstraintSet, DISTANCE_CONSTRAINT_BETA};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::DistanceConstraint;
use crate::physics::scheduler::ConstraintSlot;
use crate::physics::wide::{
    gather_f32, inverse_or_zero, select, splat, BodyLanes, FloatW, SolverBodyW, Vec3W, SIMD_WIDTH,
};

#[derive(Debug, Clone, Copy)]
pub struct DistanceConstraintBatch {
    pub body_a: [BodyIndex; SIMD_WIDTH],
    pub body_b: [BodyIndex; SIMD_WIDTH],
    pub rel_global_anchor_a: Vec3W,
    pub rel_global_anchor_b: Vec3W,
    pub u: Vec3W,
    pub bias: FloatW,
    pub effective_mass: FloatW,
}

pub fn initialize_distance_constraints_wide(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, DistanceConstraint>,
    slots: &[ConstraintSlot],
    dt: f32,
    out: &mut Vec<DistanceConstraintBatch>,
) {
    out.clear();
    out.reserve(slots.len());
    let beta_dt = splat(bias_scale(DISTANCE_CONSTRAINT_BETA, dt));

    for slot in slots {
        let (body_a, body_b) = slot_bodies(set.pairs, slot);
        let input = |i: usize| &set.constraints[slot.indices[i] as usize];

        let global_a = BodyLanes::gather(bodies, &body_a);
        let global_b = BodyLanes::gather(bodies, &body_b);

        let rel_global_anchor_a = global_a.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_a));
        let rel_global_anchor_b = global_b.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_b));

        let delta = (global_b.position + rel_global_anchor_b) - (global_a.position + rel_global_anchor_a);
        let l = delta.length();
        let u = select(l.cmp_gt(splat(DEGENERATE_DISTANCE)), delta * (FloatW::ONE / l), Vec3W::ZERO);

        let cr_a_u = rel_global_anchor_a.cross(u);
        let cr_b_u = rel_global_anchor_b.cross(u);
        let inv_mass = global_a.inv_mass
            + cr_a_u.dot(global_a.inv_inertia.mul_vec3(cr_a_u))
            + global_b.inv_mass
            + cr_b_u.dot(global_b.inv_inertia.mul_vec3(cr_b_u));

        let global_length = gather_f32(|i| input(i).global_length);

        out.push(DistanceConstraintBatch {
            body_a,
            body_b,
            rel_global_anchor_a,
            rel_global_anchor_b,
            u,
            bias: (l - global_length) * beta_dt,
            effective_mass: inverse_or_zero(inv_mass),
        });
    }
}

pub fn solve_distance_constraints_wide(batches: &mut [DistanceConstraintBatch], bodies: &mut [RigidBodyState]) {
    for batch in batches.iter() {
        let mut a = SolverBodyW::gather(bodies, &batch.body_a);
        let mut b = SolverBodyW::gather(bodies, &batch.body_b);

        let anchor_velocity_a = a.point_velocity(batch.rel_global_anchor_a);
        let anchor_velocity_b = b.point_velocity(batch.rel_global_anchor_b);
        let cdot = batch.u.dot(anchor_velocity_b - anchor_velocity_a) + batch.bias;

        let lambda = -batch.effective_mass * cdot;
        let p = batch.u * lambda;
        a.apply_impulse(-p, batch.rel_global_anchor_a);
        b.apply_impulse(p, batch.rel_global_anchor_b);

        a.scatter(bodies, &batch.body_a);
        b.scatter(bodies, &batch.body_b);
    }
}
