//! Sequential impulse (projected Gauss-Seidel) velocity solver.
//!
//! Each joint family has an initializer that turns parameter records plus
//! the current body table into solver-ready records, and a solve pass that
//! applies one impulse update per record. The SIMD variants (`*_wide`) run
//! the same math over batches produced by the
//! [scheduler](crate::physics::scheduler).
//!
//! One iteration solves, in order: distance, ball, fixed, hinge, cone-twist,
//! slider, then contacts. Accumulated impulses start at zero every step; no
//! warm starting.

pub mod ball;
pub mod ball_wide;
pub mod collision;
pub mod collision_wide;
pub mod cone_twist;
pub mod cone_twist_wide;
pub mod distance;
pub mod distance_wide;
pub mod fixed;
pub mod fixed_wide;
pub mod hinge;
pub mod hinge_wide;
pub mod slider;
pub mod slider_wide;

use glam::{Mat3, Vec3};

use super::body::{BodyIndex, ConstraintBodyPair, RigidBodyState};
use super::constraints::{
    BallConstraint, ConeTwistConstraint, DistanceConstraint, FixedConstraint, HingeConstraint,
    SliderConstraint,
};
use super::contact::CollisionContact;
use super::scheduler::{schedule_constraints, ConstraintSlot, ScheduleScratch};
use super::wide::SIMD_WIDTH;

/// Steps at or below this length get no positional bias.
pub const DT_THRESHOLD: f32 = 1e-5;

/// Baumgarte factor for distance joints.
pub const DISTANCE_CONSTRAINT_BETA: f32 = 0.1;
/// Baumgarte factor for the point lock of ball, fixed, hinge and cone-twist joints.
pub const BALL_CONSTRAINT_BETA: f32 = 0.1;
/// Baumgarte factor for slider translation and fixed/slider rotation drift.
pub const SLIDER_CONSTRAINT_BETA: f32 = 0.1;
pub const HINGE_ROTATION_CONSTRAINT_BETA: f32 = 0.3;
pub const HINGE_LIMIT_CONSTRAINT_BETA: f32 = 0.1;
/// Also used for the cone-twist swing limit.
pub const TWIST_LIMIT_CONSTRAINT_BETA: f32 = 0.1;
pub const SLIDER_LIMIT_CONSTRAINT_BETA: f32 = 0.1;

/// Bias velocity per unit of error: `beta / dt`, or zero for tiny steps.
#[inline]
pub(crate) fn bias_scale(beta: f32, dt: f32) -> f32 {
    if dt > DT_THRESHOLD {
        beta / dt
    } else {
        0.0
    }
}

/// `1 / dt`, or zero for tiny steps.
#[inline]
pub(crate) fn inv_dt_or_zero(dt: f32) -> f32 {
    bias_scale(1.0, dt)
}

/// Working copy of one body's velocities during a single constraint solve.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SolverBody {
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub inv_mass: f32,
    pub inv_inertia: Mat3,
}

impl SolverBody {
    #[inline]
    pub fn load(bodies: &[RigidBodyState], index: BodyIndex) -> Self {
        let body = &bodies[index as usize];
        Self {
            linear_velocity: body.linear_velocity,
            angular_velocity: body.angular_velocity,
            inv_mass: body.inv_mass,
            inv_inertia: body.inv_inertia,
        }
    }

    #[inline]
    pub fn store(&self, bodies: &mut [RigidBodyState], index: BodyIndex) {
        let body = &mut bodies[index as usize];
        body.linear_velocity = self.linear_velocity;
        body.angular_velocity = self.angular_velocity;
    }

    #[inline]
    pub fn point_velocity(&self, r: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// Apply a linear impulse at lever arm `r`.
    #[inline]
    pub fn apply_impulse(&mut self, impulse: Vec3, r: Vec3) {
        self.linear_velocity += self.inv_mass * impulse;
        self.angular_velocity += self.inv_inertia * r.cross(impulse);
    }

    #[inline]
    pub fn apply_angular_impulse(&mut self, impulse: Vec3) {
        self.angular_velocity += self.inv_inertia * impulse;
    }
}

/// Records of one family with their parallel body pairs.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintSet<'a, T> {
    pub constraints: &'a [T],
    pub pairs: &'a [ConstraintBodyPair],
}

impl<'a, T> ConstraintSet<'a, T> {
    pub fn new(constraints: &'a [T], pairs: &'a [ConstraintBodyPair]) -> Self {
        debug_assert_eq!(constraints.len(), pairs.len(), "one body pair per constraint");
        Self { constraints, pairs }
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Record and body pair of constraint `i`.
    #[inline]
    pub fn get(&self, i: usize) -> (&'a T, ConstraintBodyPair) {
        (&self.constraints[i], self.pairs[i])
    }
}

impl<T> Default for ConstraintSet<'_, T> {
    fn default() -> Self {
        Self {
            constraints: &[],
            pairs: &[],
        }
    }
}

/// Body indices of both sides of a batch, lane by lane.
pub(crate) fn slot_bodies(
    pairs: &[ConstraintBodyPair],
    slot: &ConstraintSlot,
) -> ([BodyIndex; SIMD_WIDTH], [BodyIndex; SIMD_WIDTH]) {
    let pair = |i: usize| pairs[slot.indices[i] as usize];
    (
        std::array::from_fn(|i| pair(i).a),
        std::array::from_fn(|i| pair(i).b),
    )
}

/// Everything the solver consumes for one step.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintInput<'a> {
    pub distance: ConstraintSet<'a, DistanceConstraint>,
    pub ball: ConstraintSet<'a, BallConstraint>,
    pub fixed: ConstraintSet<'a, FixedConstraint>,
    pub hinge: ConstraintSet<'a, HingeConstraint>,
    pub cone_twist: ConstraintSet<'a, ConeTwistConstraint>,
    pub slider: ConstraintSet<'a, SliderConstraint>,
    pub contacts: ConstraintSet<'a, CollisionContact>,
    /// Index of the immovable sentinel body.
    pub dummy: BodyIndex,
}

impl ConstraintInput<'_> {
    pub fn num_joints(&self) -> usize {
        self.distance.len()
            + self.ball.len()
            + self.fixed.len()
            + self.hinge.len()
            + self.cone_twist.len()
            + self.slider.len()
    }
}

/// A velocity solver for one step: initialize once, then iterate.
pub trait VelocitySolver {
    /// Build solver records from the body table. Discards the previous step's records.
    fn initialize(&mut self, bodies: &[RigidBodyState], input: &ConstraintInput<'_>, dt: f32);

    /// Run one sweep over every constraint, mutating body velocities in place.
    fn solve_one_iteration(&mut self, bodies: &mut [RigidBodyState]);
}

/// One record at a time, straight over the body table.
#[derive(Debug, Default)]
pub struct ScalarSolver {
    distance: Vec<distance::DistanceConstraintUpdate>,
    ball: Vec<ball::BallConstraintUpdate>,
    fixed: Vec<fixed::FixedConstraintUpdate>,
    hinge: Vec<hinge::HingeConstraintUpdate>,
    cone_twist: Vec<cone_twist::ConeTwistConstraintUpdate>,
    slider: Vec<slider::SliderConstraintUpdate>,
    collision: Vec<collision::CollisionConstraintUpdate>,
}

impl ScalarSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VelocitySolver for ScalarSolver {
    fn initialize(&mut self, bodies: &[RigidBodyState], input: &ConstraintInput<'_>, dt: f32) {
        let _span = tracing::debug_span!("initialize_constraints", backend = "scalar").entered();

        distance::initialize_distance_constraints(bodies, input.distance, dt, &mut self.distance);
        ball::initialize_ball_constraints(bodies, input.ball, dt, &mut self.ball);
        fixed::initialize_fixed_constraints(bodies, input.fixed, dt, &mut self.fixed);
        hinge::initialize_hinge_constraints(bodies, input.hinge, dt, &mut self.hinge);
        cone_twist::initialize_cone_twist_constraints(bodies, input.cone_twist, dt, &mut self.cone_twist);
        slider::initialize_slider_constraints(bodies, input.slider, dt, &mut self.slider);
        collision::initialize_collision_constraints(bodies, input.contacts, dt, &mut self.collision);
    }

    fn solve_one_iteration(&mut self, bodies: &mut [RigidBodyState]) {
        distance::solve_distance_constraints(&mut self.distance, bodies);
        ball::solve_ball_constraints(&mut self.ball, bodies);
        fixed::solve_fixed_constraints(&mut self.fixed, bodies);
        hinge::solve_hinge_constraints(&mut self.hinge, bodies);
        cone_twist::solve_cone_twist_constraints(&mut self.cone_twist, bodies);
        slider::solve_slider_constraints(&mut self.slider, bodies);
        collision::solve_collision_constraints(&mut self.collision, bodies);
    }
}

/// Batches of [`SIMD_WIDTH`](super::wide::SIMD_WIDTH) constraints over non-aliasing bodies.
#[derive(Debug, Default)]
pub struct SimdSolver {
    scratch: ScheduleScratch,
    slots: Vec<ConstraintSlot>,
    distance: Vec<distance_wide::DistanceConstraintBatch>,
    ball: Vec<ball_wide::BallConstraintBatch>,
    fixed: Vec<fixed_wide::FixedConstraintBatch>,
    hinge: Vec<hinge_wide::HingeConstraintBatch>,
    cone_twist: Vec<cone_twist_wide::ConeTwistConstraintBatch>,
    slider: Vec<slider_wide::SliderConstraintBatch>,
    collision: Vec<collision_wide::CollisionConstraintBatch>,
}

impl SimdSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of batches built by the last `initialize`.
    pub fn num_batches(&self) -> usize {
        self.distance.len()
            + self.ball.len()
            + self.fixed.len()
            + self.hinge.len()
            + self.cone_twist.len()
            + self.slider.len()
            + self.collision.len()
    }

    fn schedule<T>(&mut self, set: ConstraintSet<'_, T>, dummy: BodyIndex) {
        schedule_constraints(set.pairs, dummy, &mut self.scratch, &mut self.slots);
    }
}

impl VelocitySolver for SimdSolver {
    fn initialize(&mut self, bodies: &[RigidBodyState], input: &ConstraintInput<'_>, dt: f32) {
        let _span = tracing::debug_span!("initialize_constraints", backend = "simd").entered();
        let dummy = input.dummy;

        self.schedule(input.distance, dummy);
        distance_wide::initialize_distance_constraints_wide(bodies, input.distance, &self.slots, dt, &mut self.distance);

        self.schedule(input.ball, dummy);
        ball_wide::initialize_ball_constraints_wide(bodies, input.ball, &self.slots, dt, &mut self.ball);

        self.schedule(input.fixed, dummy);
        fixed_wide::initialize_fixed_constraints_wide(bodies, input.fixed, &self.slots, dt, &mut self.fixed);

        self.schedule(input.hinge, dummy);
        hinge_wide::initialize_hinge_constraints_wide(bodies, input.hinge, &self.slots, dt, &mut self.hinge);

        self.schedule(input.cone_twist, dummy);
        cone_twist_wide::initialize_cone_twist_constraints_wide(
            bodies,
            input.cone_twist,
            &self.slots,
            dt,
            &mut self.cone_twist,
        );

        self.schedule(input.slider, dummy);
        slider_wide::initialize_slider_constraints_wide(bodies, input.slider, &self.slots, dt, &mut self.slider);

        self.schedule(input.contacts, dummy);
        collision_wide::initialize_collision_constraints_wide(
            bodies,
            input.contacts,
            &self.slots,
            dt,
            &mut self.collision,
        );

        tracing::trace!(batches = self.num_batches(), "built SIMD constraint batches");
    }

    fn solve_one_iteration(&mut self, bodies: &mut [RigidBodyState]) {
        distance_wide::solve_distance_constraints_wide(&mut self.distance, bodies);
        ball_wide::solve_ball_constraints_wide(&mut self.ball, bodies);
        fixed_wide::solve_fixed_constraints_wide(&mut self.fixed, bodies);
        hinge_wide::solve_hinge_constraints_wide(&mut self.hinge, bodies);
        cone_twist_wide::solve_cone_twist_constraints_wide(&mut self.cone_twist, bodies);
        slider_wide::solve_slider_constraints_wide(&mut self.slider, bodies);
        collision_wide::solve_collision_constraints_wide(&mut self.collision, bodies);
    }
}

/// Which [`VelocitySolver`] a [`ConstraintSolver`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverBackend {
    Scalar,
    #[default]
    Simd,
}

/// Aggregates the scalar and SIMD solvers behind a runtime switch.
///
/// Both backends keep their record buffers between steps, so switching
/// backends does not throw away warmed-up capacity.
#[derive(Debug, Default)]
pub struct ConstraintSolver {
    backend: SolverBackend,
    /// Backend that ran the last `initialize`; iterations always go to it.
    initialized: SolverBackend,
    scalar: ScalarSolver,
    simd: SimdSolver,
}

impl ConstraintSolver {
    pub fn new(backend: SolverBackend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    pub fn backend(&self) -> SolverBackend {
        self.backend
    }

    /// Takes effect at the next `initialize`.
    pub fn set_backend(&mut self, backend: SolverBackend) {
        self.backend = backend;
    }

    fn active(&mut self) -> &mut dyn VelocitySolver {
        match self.initialized {
            SolverBackend::Scalar => &mut self.scalar,
            SolverBackend::Simd => &mut self.simd,
        }
    }

    /// Run `iterations` sweeps. No convergence check: the count is the only stop criterion.
    pub fn solve(&mut self, bodies: &mut [RigidBodyState], iterations: u32) {
        let _span = tracing::debug_span!("solve_constraints", iterations).entered();
        let solver = self.active();
        for _ in 0..iterations {
            solver.solve_one_iteration(bodies);
        }
    }
}

impl VelocitySolver for ConstraintSolver {
    fn initialize(&mut self, bodies: &[RigidBodyState], input: &ConstraintInput<'_>, dt: f32) {
        self.initialized = self.backend;
        self.active().initialize(bodies, input, dt);
    }

    fn solve_one_iteration(&mut self, bodies: &mut [RigidBodyState]) {
        self.active().solve_one_iteration(bodies);
    }
}

#[cfg(test)]
pub(crate) mod test_util;
