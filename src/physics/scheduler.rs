//! SIMD batch scheduler.
//!
//! Partitions the constraints of one family into batches of [`SIMD_WIDTH`]
//! such that no two lanes of a batch touch the same real body. Incoming
//! constraints are spread round-robin over a few buckets, each holding a set
//! of in-progress slots; a constraint goes into the first slot of its bucket
//! where neither of its bodies appears yet. Full slots are emitted
//! immediately and recycled. Whatever is left at the end is emitted with its
//! unused lanes padded by copies of the slot's first constraint.

use wide::{i32x4, CmpEq};

use super::body::{BodyIndex, ConstraintBodyPair};
use super::wide::SIMD_WIDTH;

const NUM_BUCKETS: usize = 4;

/// Marks an unused lane in an in-progress slot. Never a valid body index.
const INVALID_LANE: i32 = -1;

/// One batch: the constraint-table index solved by each lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintSlot {
    pub indices: [u32; SIMD_WIDTH],
}

#[derive(Debug, Clone, Copy)]
struct PendingSlot {
    body_a: [i32; SIMD_WIDTH],
    body_b: [i32; SIMD_WIDTH],
    indices: [u32; SIMD_WIDTH],
}

impl PendingSlot {
    const EMPTY: Self = Self {
        body_a: [INVALID_LANE; SIMD_WIDTH],
        body_b: [INVALID_LANE; SIMD_WIDTH],
        indices: [0; SIMD_WIDTH],
    };

    /// True if `a` or `b` already appears in any lane.
    #[inline]
    fn conflicts(&self, a: i32x4, b: i32x4) -> bool {
        let lanes_a = i32x4::from(self.body_a);
        let lanes_b = i32x4::from(self.body_b);
        let hit = a.cmp_eq(lanes_a) | a.cmp_eq(lanes_b) | b.cmp_eq(lanes_a) | b.cmp_eq(lanes_b);
        hit.move_mask() != 0
    }

    #[inline]
    fn first_free_lane(&self) -> usize {
        self.body_a
            .iter()
            .position(|&a| a == INVALID_LANE)
            .unwrap_or(SIMD_WIDTH)
    }

    fn padded(&self, used: usize) -> ConstraintSlot {
        let mut indices = self.indices;
        for lane in used..SIMD_WIDTH {
            indices[lane] = indices[0];
        }
        ConstraintSlot { indices }
    }
}

/// Bucket storage reused across steps.
#[derive(Debug, Default)]
pub struct ScheduleScratch {
    buckets: [Vec<PendingSlot>; NUM_BUCKETS],
}

impl ScheduleScratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

/// Schedule `pairs` into batches appended to `out`. Returns the number of batches.
///
/// `dummy` is the sentinel body index. For the conflict test it is replaced
/// by the constraint's other body, since the dummy's velocity never changes.
pub fn schedule_constraints(
    pairs: &[ConstraintBodyPair],
    dummy: BodyIndex,
    scratch: &mut ScheduleScratch,
    out: &mut Vec<ConstraintSlot>,
) -> usize {
    debug_assert!(u32::try_from(pairs.len()).is_ok(), "constraint family exceeds u32 indices");
    let _span = tracing::trace_span!("schedule_constraints", count = pairs.len()).entered();

    scratch.clear();
    out.clear();
    out.reserve(pairs.len().div_ceil(SIMD_WIDTH) + NUM_BUCKETS);

    for (i, pair) in pairs.iter().enumerate() {
        let bucket = &mut scratch.buckets[i % NUM_BUCKETS];

        let (mut a, mut b) = (pair.a, pair.b);
        if a == dummy {
            a = b;
        }
        if b == dummy {
            b = a;
        }
        let lanes_a = i32x4::splat(a as i32);
        let lanes_b = i32x4::splat(b as i32);

        let slot_index = match bucket.iter().position(|s| !s.conflicts(lanes_a, lanes_b)) {
            Some(j) => j,
            None => {
                bucket.push(PendingSlot::EMPTY);
                bucket.len() - 1
            }
        };

        let slot = &mut bucket[slot_index];
        let lane = slot.first_free_lane();
        debug_assert!(lane < SIMD_WIDTH, "non-conflicting slot must have a free lane");
        slot.body_a[lane] = pair.a as i32;
        slot.body_b[lane] = pair.b as i32;
        slot.indices[lane] = i as u32;

        if lane == SIMD_WIDTH - 1 {
            out.push(ConstraintSlot { indices: slot.indices });
            bucket.swap_remove(slot_index);
        }
    }

    for bucket in &scratch.buckets {
        for slot in bucket {
            out.push(slot.padded(slot.first_free_lane()));
        }
    }

    tracing::trace!(constraints = pairs.len(), batches = out.len(), "scheduled SIMD batches");
    out.len()
}
