use super::{bias_scale, slot_bodies, ConstraintSet, BALL_CONSTRAINT_BETA};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::BallConstraint;
use crate::physics::scheduler::ConstraintSlot;
use crate::physics::wide::{point_mobility, solve_mat3, splat, BodyLanes, Mat3W, SolverBodyW, Vec3W, SIMD_WIDTH};

#[derive(Debug, Clone, Copy)]
pub struct BallConstraintBatch {
    pub body_a: [BodyIndex; SIMD_WIDTH],
    pub body_b: [BodyIndex; SIMD_WIDTH],
    pub rel_global_anchor_a: Vec3W,
    pub rel_global_anchor_b: Vec3W,
    pub bias: Vec3W,
    pub inv_effective_mass: Mat3W,
}

/// Lane-wide twin of the scalar point effective mass.
pub(crate) fn point_inv_effective_mass_wide(a: &BodyLanes, b: &BodyLanes, r_a: Vec3W, r_b: Vec3W) -> Mat3W {
    (point_mobility(r_a, &a.inv_inertia) + point_mobility(r_b, &b.inv_inertia)).add_diagonal(a.inv_mass + b.inv_mass)
}

pub fn initialize_ball_constraints_wide(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, BallConstraint>,
    slots: &[ConstraintSlot],
    dt: f32,
    out: &mut Vec<BallConstraintBatch>,
) {
    out.clear();
    out.reserve(slots.len());
    let beta_dt = splat(bias_scale(BALL_CONSTRAINT_BETA, dt));

    for slot in slots {
        let (body_a, body_b) = slot_bodies(set.pairs, slot);
        let input = |i: usize| &set.constraints[slot.indices[i] as usize];

        let global_a = BodyLanes::gather(bodies, &body_a);
        let global_b = BodyLanes::gather(bodies, &body_b);

        let rel_global_anchor_a = global_a.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_a));
        let rel_global_anchor_b = global_b.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_b));
        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        out.push(BallConstraintBatch {
            body_a,
            body_b,
            rel_global_anchor_a,
            rel_global_anchor_b,
            bias: (global_anchor_b - global_anchor_a) * beta_dt,
            inv_effective_mass: point_inv_effective_mass_wide(
                &global_a,
                &global_b,
                rel_global_anchor_a,
                rel_global_anchor_b,
            ),
        });
    }
}

pub fn solve_ball_constraints_wide(batches: &mut [BallConstraintBatch], bodies: &mut [RigidBodyState]) {
    for batch in batches.iter() {
        let mut a = SolverBodyW::gather(bodies, &batch.body_a);
        let mut b = SolverBodyW::gather(bodies, &batch.body_b);

        let anchor_velocity_a = a.point_velocity(batch.rel_global_anchor_a);
        let anchor_velocity_b = b.point_velocity(batch.rel_global_anchor_b);
        let cdot = anchor_velocity_b - anchor_velocity_a + batch.bias;

        let p = solve_mat3(&batch.inv_effective_mass, -cdot);
        a.apply_impulse(-p, batch.rel_global_anchor_a);
        b.apply_impulse(p, batch.rel_global_anchor_b);

        a.scatter(bodies, &batch.body_a);
        b.scatter(bodies, &batch.body_b);
    }
}
