//! Per-step buffers, cleared and refilled every step.
//!
//! Everything the orchestrator gathers for one solve lives here: the body
//! table and, per joint family, the parameter records with their parallel
//! body-pair arrays. [`StepArena::reset`] clears the buffers but keeps their
//! capacity, so a scene of steady size stops allocating after the first few
//! steps.

use super::body::{BodyIndex, ConstraintBodyPair, RigidBodyState};
use super::constraints::{
    BallConstraint, ConeTwistConstraint, DistanceConstraint, FixedConstraint, HingeConstraint,
    SliderConstraint,
};
use super::contact::CollisionContact;
use super::solver::{ConstraintInput, ConstraintSet};

/// Records of one family with the body pair each one couples.
#[derive(Debug, Clone)]
pub struct FamilyBuffer<T> {
    records: Vec<T>,
    pairs: Vec<ConstraintBodyPair>,
}

impl<T> Default for FamilyBuffer<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            pairs: Vec::new(),
        }
    }
}

impl<T> FamilyBuffer<T> {
    #[inline]
    pub fn push(&mut self, record: T, pair: ConstraintBodyPair) {
        self.records.push(record);
        self.pairs.push(pair);
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.pairs.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn set(&self) -> ConstraintSet<'_, T> {
        ConstraintSet::new(&self.records, &self.pairs)
    }
}

#[derive(Debug, Default)]
pub struct StepArena {
    /// Dense body table. The dummy is the last entry once the step has appended it.
    pub bodies: Vec<RigidBodyState>,
    pub distance: FamilyBuffer<DistanceConstraint>,
    pub ball: FamilyBuffer<BallConstraint>,
    pub fixed: FamilyBuffer<FixedConstraint>,
    pub hinge: FamilyBuffer<HingeConstraint>,
    pub cone_twist: FamilyBuffer<ConeTwistConstraint>,
    pub slider: FamilyBuffer<SliderConstraint>,
    pub contacts: FamilyBuffer<CollisionContact>,
}

impl StepArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.bodies.clear();
        self.distance.clear();
        self.ball.clear();
        self.fixed.clear();
        self.hinge.clear();
        self.cone_twist.clear();
        self.slider.clear();
        self.contacts.clear();
    }

    /// Append the immovable sentinel and return its index.
    pub fn push_dummy(&mut self) -> BodyIndex {
        self.bodies.push(RigidBodyState::DUMMY);
        (self.bodies.len() - 1) as BodyIndex
    }

    /// Split borrow for the solve: constraint input plus the mutable body table.
    pub fn split(&mut self, dummy: BodyIndex) -> (ConstraintInput<'_>, &mut [RigidBodyState]) {
        debug_assert!((dummy as usize) < self.bodies.len());
        let input = ConstraintInput {
            distance: self.distance.set(),
            ball: self.ball.set(),
            fixed: self.fixed.set(),
            hinge: self.hinge.set(),
            cone_twist: self.cone_twist.set(),
            slider: self.slider.set(),
            contacts: self.contacts.set(),
            dummy,
        };
        (input, &mut self.bodies)
    }
}
