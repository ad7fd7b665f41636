use glam::Vec3;

use super::{inv_dt_or_zero, ConstraintSet, SolverBody, DT_THRESHOLD};
use crate::math::{inverse_or_zero, noz};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::contact::CollisionContact;

/// Penetration tolerated before positional correction kicks in.
pub const PENETRATION_SLOP: f32 = 0.001;
/// Fraction of the penetration beyond the slop removed per step.
pub const PENETRATION_BETA: f32 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct CollisionConstraintUpdate {
    pub body_a: BodyIndex,
    pub body_b: BodyIndex,
    pub rel_global_anchor_a: Vec3,
    pub rel_global_anchor_b: Vec3,
    pub normal: Vec3,
    /// Direction of the initial sliding velocity, zero when not sliding.
    pub tangent: Vec3,
    pub friction: f32,
    pub effective_mass_in_normal_dir: f32,
    pub effective_mass_in_tangent_dir: f32,
    /// Target separating velocity from restitution and penetration recovery.
    pub bias: f32,
    pub impulse_in_normal_dir: f32,
    pub impulse_in_tangent_dir: f32,
}

/// `1 / (m_A⁻¹ + m_B⁻¹ + (r_A × d)ᵀ I_A⁻¹ (r_A × d) + (r_B × d)ᵀ I_B⁻¹ (r_B × d))`.
pub(crate) fn effective_mass_along(a: &RigidBodyState, b: &RigidBodyState, r_a: Vec3, r_b: Vec3, d: Vec3) -> f32 {
    let ra_x_d = r_a.cross(d);
    let rb_x_d = r_b.cross(d);
    inverse_or_zero(
        a.inv_mass + ra_x_d.dot(a.inv_inertia * ra_x_d) + b.inv_mass + rb_x_d.dot(b.inv_inertia * rb_x_d),
    )
}

/// Separating velocity the normal impulse must reach. Only approaching, penetrating contacts get one.
pub(crate) fn contact_bias(contact: &CollisionContact, normal_velocity: f32, dt: f32) -> f32 {
    if dt <= DT_THRESHOLD {
        return 0.0;
    }
    let separation = -contact.penetration_depth;
    if separation < -PENETRATION_SLOP && normal_velocity < 0.0 {
        -contact.restitution() * normal_velocity
            - PENETRATION_BETA * (separation + PENETRATION_SLOP) * inv_dt_or_zero(dt)
    } else {
        0.0
    }
}

pub fn initialize_collision_constraints(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, CollisionContact>,
    dt: f32,
    out: &mut Vec<CollisionConstraintUpdate>,
) {
    out.clear();
    out.reserve(set.len());

    for i in 0..set.len() {
        let (contact, pair) = set.get(i);
        let a = &bodies[pair.a as usize];
        let b = &bodies[pair.b as usize];

        let rel_global_anchor_a = contact.point - a.position;
        let rel_global_anchor_b = contact.point - b.position;

        let rel_velocity = b.point_velocity(rel_global_anchor_b) - a.point_velocity(rel_global_anchor_a);
        let normal_velocity = contact.normal.dot(rel_velocity);
        let tangent = noz(rel_velocity - normal_velocity * contact.normal);

        out.push(CollisionConstraintUpdate {
            body_a: pair.a,
            body_b: pair.b,
            rel_global_anchor_a,
            rel_global_anchor_b,
            normal: contact.normal,
            tangent,
            friction: contact.friction(),
            effective_mass_in_normal_dir: effective_mass_along(
                a,
                b,
                rel_global_anchor_a,
                rel_global_anchor_b,
                contact.normal,
            ),
            effective_mass_in_tangent_dir: effective_mass_along(a, b, rel_global_anchor_a, rel_global_anchor_b, tangent),
            bias: contact_bias(contact, normal_velocity, dt),
            impulse_in_normal_dir: 0.0,
            impulse_in_tangent_dir: 0.0,
        });
    }
}

pub fn solve_collision_constraints(constraints: &mut [CollisionConstraintUpdate], bodies: &mut [RigidBodyState]) {
    for con in constraints.iter_mut() {
        let mut a = SolverBody::load(bodies, con.body_a);
        let mut b = SolverBody::load(bodies, con.body_b);
        if a.inv_mass == 0.0 && b.inv_mass == 0.0 {
            continue;
        }

        // Friction first, bounded by the normal impulse of the previous iteration.
        {
            let rel_velocity = b.point_velocity(con.rel_global_anchor_b) - a.point_velocity(con.rel_global_anchor_a);
            let vt = rel_velocity.dot(con.tangent);

            let max_friction = con.friction * con.impulse_in_normal_dir;
            debug_assert!(max_friction >= 0.0);
            let old_impulse = con.impulse_in_tangent_dir;
            con.impulse_in_tangent_dir =
                (old_impulse - con.effective_mass_in_tangent_dir * vt).clamp(-max_friction, max_friction);
            let p = con.tangent * (con.impulse_in_tangent_dir - old_impulse);

            a.apply_impulse(-p, con.rel_global_anchor_a);
            b.apply_impulse(p, con.rel_global_anchor_b);
        }

        {
            let rel_velocity = b.point_velocity(con.rel_global_anchor_b) - a.point_velocity(con.rel_global_anchor_a);
            let vn = rel_velocity.dot(con.normal);

            let old_impulse = con.impulse_in_normal_dir;
            con.impulse_in_normal_dir = (old_impulse - con.effective_mass_in_normal_dir * (vn - con.bias)).max(0.0);
            let p = con.normal * (con.impulse_in_normal_dir - old_impulse);

            a.apply_impulse(-p, con.rel_global_anchor_a);
            b.apply_impulse(p, con.rel_global_anchor_b);
        }

        a.store(bodies, con.body_a);
        b.store(bodies, con.body_b);
    }
}
